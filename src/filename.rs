use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{CarteraError, Result};
use crate::models::FileMetadata;

// "Tenencias-10635_LOPEZ_JUAN ANTONIO-2025-01-15.xlsx"
fn primary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^Tenencias\s*-?\s*(\d+)[_-]([A-Za-z\s_]+?)-(\d{4}-\d{2}-\d{2})$").unwrap()
    })
}

// "10635_LOPEZ_JUAN ANTONIO_2025-01-15.xlsx"
fn secondary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)[_-]([A-Za-z\s_]+?)[_-](\d{4}-\d{2}-\d{2})$").unwrap()
    })
}

fn copy_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(\d+\)$").unwrap())
}

/// Extracts account id, holder name and statement date from a broker
/// export filename. Extension and duplicate-download suffixes like
/// " (1)" are ignored.
pub fn parse_filename(filename: &str) -> Result<FileMetadata> {
    let stem = match filename.rsplit_once('.') {
        Some((stem, ext)) if matches!(ext.to_ascii_lowercase().as_str(), "xlsx" | "xls" | "csv") => {
            stem
        }
        _ => filename,
    };
    let stem = copy_suffix_re().replace(stem.trim(), "");

    let caps = primary_re()
        .captures(&stem)
        .or_else(|| secondary_re().captures(&stem))
        .ok_or_else(|| {
            CarteraError::InvalidFilename(format!("unrecognized filename format: {filename}"))
        })?;

    let as_of_date = NaiveDate::parse_from_str(&caps[3], "%Y-%m-%d").map_err(|_| {
        CarteraError::InvalidFilename(format!("invalid date in filename: {filename}"))
    })?;

    Ok(FileMetadata {
        account_id: caps[1].to_string(),
        holder_name: caps[2].trim().to_string(),
        as_of_date,
    })
}

/// Canonical filename for a statement, inverse of [`parse_filename`].
pub fn format_filename(meta: &FileMetadata) -> String {
    format!(
        "Tenencias-{}_{}-{}.xlsx",
        meta.account_id,
        meta.holder_name,
        meta.as_of_date.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primary_format() {
        let meta = parse_filename("Tenencias-10635_LOPEZ_JUAN ANTONIO-2025-01-15.xlsx").unwrap();
        assert_eq!(meta.account_id, "10635");
        assert_eq!(meta.holder_name, "LOPEZ_JUAN ANTONIO");
        assert_eq!(meta.as_of_date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_case_insensitive_prefix() {
        let meta = parse_filename("tenencias-42_PEREZ ANA-2024-12-31.xlsx").unwrap();
        assert_eq!(meta.account_id, "42");
        assert_eq!(meta.holder_name, "PEREZ ANA");
    }

    #[test]
    fn test_parse_secondary_format() {
        let meta = parse_filename("10635_LOPEZ_JUAN ANTONIO_2025-01-15.xlsx").unwrap();
        assert_eq!(meta.account_id, "10635");
        assert_eq!(meta.holder_name, "LOPEZ_JUAN ANTONIO");
    }

    #[test]
    fn test_parse_strips_duplicate_download_suffix() {
        let meta = parse_filename("Tenencias-10635_LOPEZ_JUAN ANTONIO-2025-01-15 (1).xlsx").unwrap();
        assert_eq!(meta.as_of_date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_csv_extension() {
        let meta = parse_filename("Tenencias-7_GOMEZ-2025-03-01.csv").unwrap();
        assert_eq!(meta.account_id, "7");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_filename("holdings.xlsx").is_err());
        assert!(parse_filename("Tenencias-.xlsx").is_err());
        assert!(parse_filename("").is_err());
    }

    #[test]
    fn test_parse_rejects_impossible_date() {
        assert!(parse_filename("Tenencias-10635_LOPEZ-2025-13-40.xlsx").is_err());
    }

    #[test]
    fn test_format_round_trip() {
        let meta = FileMetadata {
            account_id: "10635".to_string(),
            holder_name: "LOPEZ_JUAN ANTONIO".to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        };
        let name = format_filename(&meta);
        assert_eq!(name, "Tenencias-10635_LOPEZ_JUAN ANTONIO-2025-01-15.xlsx");
        assert_eq!(parse_filename(&name).unwrap(), meta);
    }
}
