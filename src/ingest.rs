use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::classifier::Classifier;
use crate::error::{CarteraError, Result};
use crate::filename::parse_filename;
use crate::models::{FileMetadata, Holding, PortfolioSnapshot};
use crate::store::{HistoryStore, RetryPolicy, RetryingStore, SqliteStore};

// Header cells the broker exports use, checked in order. Spanish
// variants first since that is what the brokers actually emit.
const TICKER_CANDIDATES: &[&str] = &["especie", "ticker", "simbolo", "símbolo", "symbol", "activo"];
const AMOUNT_CANDIDATES: &[&str] = &[
    "importe",
    "valorizado",
    "valuacion",
    "valuación",
    "monto",
    "market value",
    "value",
    "total",
];
const QUANTITY_CANDIDATES: &[&str] = &["cantidad", "nominales", "quantity", "shares"];
const DESCRIPTION_CANDIDATES: &[&str] = &["descripcion", "descripción", "description", "detalle"];

/// Parses a localized numeric cell. Handles both Argentine
/// ("1.234,56") and US ("1,234.56") thousands/decimal conventions,
/// currency symbols and parenthesized negatives.
pub fn clean_numeric(raw: &str) -> Option<f64> {
    let mut s = raw.trim().to_string();
    if s.is_empty() || s == "-" {
        return None;
    }

    let negative = s.starts_with('(') && s.ends_with(')');
    if negative {
        s = s[1..s.len() - 1].to_string();
    }
    // Multi-character tokens first, or stripping "$" would leave "US"
    // behind in "U$S" and the parse below would fail
    for token in &["u$s", "U$S", "us$", "US$", "USD", "ARS", "$"] {
        s = s.replace(token, "");
    }
    let s = s.trim().replace(' ', "");
    if s.is_empty() {
        return None;
    }

    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');
    let normalized = match (last_comma, last_dot) {
        // "1.234,56" -> comma is the decimal separator
        (Some(c), Some(d)) if c > d => s.replace('.', "").replace(',', "."),
        // "1,234.56"
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(c), None) => {
            // A lone comma is decimal unless it groups exactly three digits
            if s.matches(',').count() > 1
                || (s.len() - c == 4 && s[..c].chars().all(|ch| ch.is_ascii_digit()))
            {
                s.replace(',', "")
            } else {
                s.replace(',', ".")
            }
        }
        (None, Some(d)) => {
            // "1.234" with three trailing digits is Argentine grouping
            if s.len() - d == 4 && s.matches('.').count() == 1 && s[..d].len() <= 3 {
                s.replace('.', "")
            } else if s.matches('.').count() > 1 {
                s.replace('.', "")
            } else {
                s
            }
        }
        (None, None) => s,
    };

    normalized.parse::<f64>().ok().map(|v| if negative { -v } else { v })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        _ => String::new(),
    }
}

fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => clean_numeric(s),
        _ => None,
    }
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    for candidate in candidates {
        if let Some(idx) = headers
            .iter()
            .position(|h| h.to_lowercase().contains(candidate))
        {
            return Some(idx);
        }
    }
    None
}

fn is_noise_row(first_cell: &str) -> bool {
    let lower = first_cell.to_lowercase();
    lower.starts_with("tipo de activo")
        || lower.starts_with("subtotal")
        || lower.starts_with("total")
        || lower.starts_with("comitente")
        || lower.starts_with("fecha")
        || lower.starts_with("moneda")
}

struct ParsedRows {
    holdings: Vec<Holding>,
    skipped: usize,
}

/// Extracts holdings from a sheet. Finds the header row anywhere in the
/// first 20 rows, then reads positionally; sectioned exports (IOL,
/// StoneX) interleave "Tipo de Activo:" banners and subtotal rows,
/// which are skipped.
fn parse_rows(rows: &[Vec<String>], numbers: &[Vec<Option<f64>>]) -> Result<ParsedRows> {
    let mut header = None;
    for (idx, row) in rows.iter().take(20).enumerate() {
        if let (Some(ticker), Some(amount)) = (
            find_column(row, TICKER_CANDIDATES),
            find_column(row, AMOUNT_CANDIDATES),
        ) {
            header = Some((idx, ticker, amount));
            break;
        }
    }
    let (header_idx, ticker_col, amount_col) = header.ok_or_else(|| {
        CarteraError::Sheet("no header row with ticker and amount columns found".to_string())
    })?;

    let headers = &rows[header_idx];
    let quantity_col = find_column(headers, QUANTITY_CANDIDATES);
    let description_col = find_column(headers, DESCRIPTION_CANDIDATES);

    let mut holdings = Vec::new();
    let mut skipped = 0;

    for (row, nums) in rows.iter().zip(numbers.iter()).skip(header_idx + 1) {
        let ticker = row.get(ticker_col).cloned().unwrap_or_default();
        if ticker.is_empty() || is_noise_row(&ticker) {
            continue;
        }

        let value = nums
            .get(amount_col)
            .copied()
            .flatten()
            .or_else(|| row.get(amount_col).and_then(|s| clean_numeric(s)));
        let Some(market_value) = value else {
            skipped += 1;
            log::debug!("skipping row for {ticker}: unparsable amount");
            continue;
        };
        if market_value < 0.0 {
            skipped += 1;
            log::warn!("skipping row for {ticker}: negative value {market_value}");
            continue;
        }

        let quantity = quantity_col
            .and_then(|c| nums.get(c).copied().flatten())
            .unwrap_or(0.0);
        let description = description_col
            .and_then(|c| row.get(c).cloned())
            .unwrap_or_default();

        holdings.push(Holding {
            ticker,
            description,
            quantity,
            market_value,
        });
    }

    Ok(ParsedRows { holdings, skipped })
}

fn parse_xlsx(path: &Path) -> Result<ParsedRows> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| CarteraError::Sheet(format!("cannot open {}: {e}", path.display())))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| CarteraError::Sheet(format!("{} has no sheets", path.display())))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| CarteraError::Sheet(format!("cannot read {sheet_name}: {e}")))?;

    let mut rows = Vec::new();
    let mut numbers = Vec::new();
    for row in range.rows() {
        rows.push(row.iter().map(cell_text).collect::<Vec<_>>());
        numbers.push(row.iter().map(cell_number).collect::<Vec<_>>());
    }
    parse_rows(&rows, &numbers)
}

fn parse_csv(path: &Path) -> Result<ParsedRows> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|s| s.trim().to_string()).collect());
    }
    let numbers: Vec<Vec<Option<f64>>> = rows
        .iter()
        .map(|row| row.iter().map(|s| clean_numeric(s)).collect())
        .collect();
    parse_rows(&rows, &numbers)
}

fn parse_file(path: &Path) -> Result<ParsedRows> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => parse_csv(path),
        _ => parse_xlsx(path),
    }
}

/// Classifies and aggregates holdings into a snapshot. Returns the
/// snapshot plus the holdings that landed in the unclassified bucket.
pub fn build_snapshot(
    meta: &FileMetadata,
    holdings: &[Holding],
    classifier: &Classifier,
) -> Result<(PortfolioSnapshot, Vec<Holding>)> {
    if holdings.is_empty() {
        return Err(CarteraError::EmptyPortfolio(format!(
            "no valid holdings for account {}",
            meta.account_id
        )));
    }

    let mut category_totals: BTreeMap<_, f64> = BTreeMap::new();
    let mut unclassified = Vec::new();
    for holding in holdings {
        let category = classifier.classify(&holding.ticker, &holding.description);
        if category == crate::models::Category::Unclassified {
            unclassified.push(holding.clone());
        }
        *category_totals.entry(category).or_default() += holding.market_value;
    }
    let total_value: f64 = category_totals.values().sum();
    if total_value <= 0.0 {
        return Err(CarteraError::EmptyPortfolio(format!(
            "account {} has zero total value",
            meta.account_id
        )));
    }

    Ok((
        PortfolioSnapshot {
            account_id: meta.account_id.clone(),
            holder_name: meta.holder_name.clone(),
            as_of_date: meta.as_of_date,
            category_totals,
            total_value,
        },
        unclassified,
    ))
}

#[derive(Debug)]
pub struct IngestResult {
    pub filename: String,
    pub account_id: String,
    pub as_of_date: chrono::NaiveDate,
    pub record_count: usize,
    pub skipped: usize,
    pub unclassified: usize,
    pub total_value: f64,
    pub pct_change: Option<f64>,
    pub duplicate_of: Option<String>,
    pub dry_run: bool,
}

/// Full ingest of one export file: filename metadata, row parsing,
/// classification, history append, review-queue and ingest-log rows.
/// With `dry_run` nothing is written.
pub fn ingest_file(
    conn: &Connection,
    classifier: &Classifier,
    policy: RetryPolicy,
    path: &Path,
    dry_run: bool,
) -> Result<IngestResult> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CarteraError::InvalidFilename(format!("{}", path.display())))?
        .to_string();
    let meta = parse_filename(&filename)?;
    let parsed = parse_file(path)?;
    let (snapshot, unclassified) = build_snapshot(&meta, &parsed.holdings, classifier)?;

    let checksum = hex::encode(Sha256::digest(fs::read(path)?));
    let duplicate_of: Option<String> = conn
        .query_row(
            "SELECT filename FROM ingests WHERE checksum = ?1 ORDER BY id LIMIT 1",
            [&checksum],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    if let Some(ref earlier) = duplicate_of {
        log::warn!("{filename} has the same content as previously ingested {earlier}");
    }

    if dry_run {
        return Ok(IngestResult {
            filename,
            account_id: meta.account_id,
            as_of_date: meta.as_of_date,
            record_count: parsed.holdings.len(),
            skipped: parsed.skipped,
            unclassified: unclassified.len(),
            total_value: snapshot.total_value,
            pct_change: None,
            duplicate_of,
            dry_run: true,
        });
    }

    let store = RetryingStore::new(SqliteStore::new(conn), policy);
    let pct_change = store.append_snapshot(&snapshot)?;

    let date = meta.as_of_date.format("%Y-%m-%d").to_string();
    for holding in &unclassified {
        conn.execute(
            "INSERT INTO review_queue (ticker, description, account_id, date, value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                holding.ticker,
                holding.description,
                meta.account_id,
                date,
                holding.market_value,
            ],
        )?;
    }
    conn.execute(
        "INSERT INTO ingests (filename, account_id, record_count, skipped_count, checksum)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            filename,
            meta.account_id,
            parsed.holdings.len(),
            parsed.skipped,
            checksum,
        ],
    )?;

    Ok(IngestResult {
        filename,
        account_id: meta.account_id,
        as_of_date: meta.as_of_date,
        record_count: parsed.holdings.len(),
        skipped: parsed.skipped,
        unclassified: unclassified.len(),
        total_value: snapshot.total_value,
        pct_change,
        duplicate_of,
        dry_run: false,
    })
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: Vec<IngestResult>,
    pub failed: Vec<(String, CarteraError)>,
}

/// Ingests every export in a directory. One bad file does not stop the
/// batch; failures are collected per file.
pub fn ingest_dir(
    conn: &Connection,
    classifier: &Classifier,
    policy: RetryPolicy,
    dir: &Path,
    dry_run: bool,
) -> Result<BatchResult> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_lowercase().as_str(), "xlsx" | "xls" | "csv"))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();

    let mut batch = BatchResult::default();
    for path in entries {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<non-utf8>")
            .to_string();
        match ingest_file(conn, classifier, policy, &path, dry_run) {
            Ok(result) => batch.succeeded.push(result),
            Err(err) => {
                log::error!("failed to ingest {name}: {err}");
                batch.failed.push((name, err));
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::NaiveDate;
    use std::io::Write;

    #[test]
    fn test_clean_numeric_argentine_format() {
        assert_eq!(clean_numeric("1.234,56"), Some(1234.56));
        assert_eq!(clean_numeric("$ 1.234.567,89"), Some(1234567.89));
        assert_eq!(clean_numeric("12,5"), Some(12.5));
        assert_eq!(clean_numeric("1.234"), Some(1234.0));
    }

    #[test]
    fn test_clean_numeric_us_format() {
        assert_eq!(clean_numeric("1,234.56"), Some(1234.56));
        assert_eq!(clean_numeric("1,234"), Some(1234.0));
        assert_eq!(clean_numeric("350000.0"), Some(350000.0));
    }

    #[test]
    fn test_clean_numeric_currency_and_negatives() {
        assert_eq!(clean_numeric("U$S 500,25"), Some(500.25));
        assert_eq!(clean_numeric("u$s 1.250,50"), Some(1250.5));
        assert_eq!(clean_numeric("US$ 1.000,00"), Some(1000.0));
        assert_eq!(clean_numeric("(1.000,00)"), Some(-1000.0));
        assert_eq!(clean_numeric(""), None);
        assert_eq!(clean_numeric("-"), None);
        assert_eq!(clean_numeric("n/a"), None);
    }

    fn rows_to_parsed(raw: &[&[&str]]) -> Result<ParsedRows> {
        let rows: Vec<Vec<String>> = raw
            .iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect();
        let numbers: Vec<Vec<Option<f64>>> = rows
            .iter()
            .map(|row| row.iter().map(|s| clean_numeric(s)).collect())
            .collect();
        parse_rows(&rows, &numbers)
    }

    #[test]
    fn test_parse_rows_sectioned_export() {
        // IOL/StoneX shape: metadata preamble, section banners, subtotals
        let parsed = rows_to_parsed(&[
            &["Comitente: 10635", "", ""],
            &["Fecha: 15/01/2025", "", ""],
            &["Especie", "Cantidad", "Importe"],
            &["Tipo de Activo: Acciones", "", ""],
            &["SPY", "100", "350.000,00"],
            &["YPFD", "500", "200.000,00"],
            &["Subtotal Acciones", "", "550.000,00"],
            &["Tipo de Activo: Moneda", "", ""],
            &["USD", "", "330.000,00"],
            &["Total", "", "880.000,00"],
        ])
        .unwrap();

        assert_eq!(parsed.holdings.len(), 3);
        assert_eq!(parsed.skipped, 0);
        let total: f64 = parsed.holdings.iter().map(|h| h.market_value).sum();
        assert!((total - 880_000.0).abs() < 0.01);
        assert!(parsed.holdings.iter().all(|h| !h.ticker.starts_with("Tipo")));
    }

    #[test]
    fn test_parse_rows_no_header_is_error() {
        let result = rows_to_parsed(&[&["hello", "world"], &["1", "2"]]);
        assert!(matches!(result, Err(CarteraError::Sheet(_))));
    }

    #[test]
    fn test_cell_conversions() {
        assert_eq!(cell_text(&Data::String(" SPY ".to_string())), "SPY");
        assert_eq!(cell_text(&Data::Float(350000.0)), "350000");
        assert_eq!(cell_number(&Data::Float(350000.0)), Some(350000.0));
        assert_eq!(cell_number(&Data::Int(42)), Some(42.0));
        assert_eq!(
            cell_number(&Data::String("1.234,56".to_string())),
            Some(1234.56)
        );
        assert_eq!(cell_number(&Data::Empty), None);
    }

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = crate::db::get_connection(&dir.path().join("test.db")).unwrap();
        crate::db::init_db(&conn).unwrap();
        (dir, conn)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: std::time::Duration::from_millis(1),
        }
    }

    fn write_csv(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_build_snapshot_aggregates_by_category() {
        let meta = FileMetadata {
            account_id: "34491".to_string(),
            holder_name: "LOPEZ_JUAN ANTONIO".to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
        };
        let holdings = vec![
            Holding {
                ticker: "SPY".into(),
                description: String::new(),
                quantity: 100.0,
                market_value: 350_000.0,
            },
            Holding {
                ticker: "YPFD".into(),
                description: String::new(),
                quantity: 500.0,
                market_value: 200_000.0,
            },
            Holding {
                ticker: "USD".into(),
                description: "Dolares".into(),
                quantity: 0.0,
                market_value: 330_000.0,
            },
        ];
        let (snap, unclassified) =
            build_snapshot(&meta, &holdings, &Classifier::new()).unwrap();
        assert!(unclassified.is_empty());
        assert_eq!(snap.total_value, 880_000.0);
        assert_eq!(snap.category_totals[&Category::UsEquity], 350_000.0);
        assert_eq!(snap.category_totals[&Category::DomesticEquity], 200_000.0);
        assert_eq!(snap.category_totals[&Category::CashEquivalent], 330_000.0);
        let sum: f64 = snap.category_totals.values().sum();
        assert!((sum - snap.total_value).abs() < 0.01);
    }

    #[test]
    fn test_build_snapshot_empty_is_error() {
        let meta = FileMetadata {
            account_id: "1".to_string(),
            holder_name: String::new(),
            as_of_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        };
        assert!(matches!(
            build_snapshot(&meta, &[], &Classifier::new()),
            Err(CarteraError::EmptyPortfolio(_))
        ));
    }

    #[test]
    fn test_ingest_csv_end_to_end() {
        let (dir, conn) = test_db();
        let path = write_csv(
            dir.path(),
            "Tenencias-10635_LOPEZ_JUAN ANTONIO-2025-01-15.csv",
            "Especie,Cantidad,Descripcion,Importe\n\
             SPY,100,SPDR S&P 500,350.000,\n\
             YPFD,500,YPF S.A.,200.000\n\
             USD,,Dolar billete,\"330.000,00\"\n\
             MYSTERY,1,Unknown thing,\"1.000,00\"\n",
        );
        let result =
            ingest_file(&conn, &Classifier::new(), fast_policy(), &path, false).unwrap();
        assert_eq!(result.account_id, "10635");
        assert_eq!(result.record_count, 4);
        assert_eq!(result.unclassified, 1);

        let queued: i64 = conn
            .query_row("SELECT count(*) FROM review_queue WHERE resolved = 0", [], |r| r.get(0))
            .unwrap();
        assert_eq!(queued, 1);
        let logged: i64 = conn
            .query_row("SELECT count(*) FROM ingests", [], |r| r.get(0))
            .unwrap();
        assert_eq!(logged, 1);
    }

    #[test]
    fn test_ingest_dry_run_writes_nothing() {
        let (dir, conn) = test_db();
        let path = write_csv(
            dir.path(),
            "Tenencias-10635_LOPEZ-2025-01-15.csv",
            "Especie,Importe\nSPY,\"1.000,00\"\n",
        );
        let result =
            ingest_file(&conn, &Classifier::new(), fast_policy(), &path, true).unwrap();
        assert!(result.dry_run);
        let rows: i64 = conn
            .query_row("SELECT count(*) FROM snapshots", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_ingest_skips_negative_rows() {
        let (dir, conn) = test_db();
        let path = write_csv(
            dir.path(),
            "Tenencias-7_GOMEZ-2025-01-15.csv",
            "Especie,Importe\nSPY,\"1.000,00\"\nGLD,\"(500,00)\"\n",
        );
        let result =
            ingest_file(&conn, &Classifier::new(), fast_policy(), &path, false).unwrap();
        assert_eq!(result.record_count, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.total_value, 1000.0);
    }

    #[test]
    fn test_ingest_dir_collects_failures() {
        let (dir, conn) = test_db();
        write_csv(
            dir.path(),
            "Tenencias-1_PEREZ-2025-01-15.csv",
            "Especie,Importe\nSPY,\"1.000,00\"\n",
        );
        write_csv(dir.path(), "not-a-statement.csv", "whatever\n");

        let batch = ingest_dir(&conn, &Classifier::new(), fast_policy(), dir.path(), false)
            .unwrap();
        assert_eq!(batch.succeeded.len(), 1);
        assert_eq!(batch.failed.len(), 1);
        assert!(matches!(
            batch.failed[0].1,
            CarteraError::InvalidFilename(_)
        ));
    }

    #[test]
    fn test_duplicate_checksum_is_flagged_not_skipped() {
        let (dir, conn) = test_db();
        let body = "Especie,Importe\nSPY,\"1.000,00\"\n";
        let p1 = write_csv(dir.path(), "Tenencias-1_PEREZ-2025-01-15.csv", body);
        let p2 = write_csv(dir.path(), "Tenencias-1_PEREZ-2025-01-15 (1).csv", body);

        let first = ingest_file(&conn, &Classifier::new(), fast_policy(), &p1, false).unwrap();
        assert!(first.duplicate_of.is_none());
        let second = ingest_file(&conn, &Classifier::new(), fast_policy(), &p2, false).unwrap();
        assert_eq!(
            second.duplicate_of.as_deref(),
            Some("Tenencias-1_PEREZ-2025-01-15.csv")
        );
    }
}
