use std::collections::HashMap;

use regex::Regex;
use rusqlite::Connection;

use crate::error::Result;
use crate::models::Category;

// Built-in ticker table. CEDEARs and local symbols trade on BYMA but are
// bucketed by what they track, not where they trade.
const BUILTIN_MAPPINGS: &[(&str, Category)] = &[
    // US equity / tech
    ("SPY", Category::UsEquity),
    ("VOO", Category::UsEquity),
    ("QQQ", Category::UsEquity),
    ("IVV", Category::UsEquity),
    ("DIA", Category::UsEquity),
    ("AAPL", Category::UsEquity),
    ("MSFT", Category::UsEquity),
    ("GOOGL", Category::UsEquity),
    ("AMZN", Category::UsEquity),
    ("NVDA", Category::UsEquity),
    ("META", Category::UsEquity),
    ("TSLA", Category::UsEquity),
    ("BRK.B", Category::UsEquity),
    ("KO", Category::UsEquity),
    ("JNJ", Category::UsEquity),
    ("PG", Category::UsEquity),
    ("V", Category::UsEquity),
    ("JPM", Category::UsEquity),
    ("XLE", Category::UsEquity),
    ("XLF", Category::UsEquity),
    // Argentine equity (MERV)
    ("YPFD", Category::DomesticEquity),
    ("YPF", Category::DomesticEquity),
    ("GGAL", Category::DomesticEquity),
    ("BMA", Category::DomesticEquity),
    ("PAMP", Category::DomesticEquity),
    ("CEPU", Category::DomesticEquity),
    ("TXAR", Category::DomesticEquity),
    ("ALUA", Category::DomesticEquity),
    ("LOMA", Category::DomesticEquity),
    ("TGSU2", Category::DomesticEquity),
    ("TRAN", Category::DomesticEquity),
    ("EDN", Category::DomesticEquity),
    ("COME", Category::DomesticEquity),
    ("MIRG", Category::DomesticEquity),
    ("BYMA", Category::DomesticEquity),
    ("SUPV", Category::DomesticEquity),
    ("VIST", Category::DomesticEquity),
    // Sovereign and corporate debt
    ("AL30", Category::FixedIncome),
    ("AL29", Category::FixedIncome),
    ("AL35", Category::FixedIncome),
    ("AL41", Category::FixedIncome),
    ("GD30", Category::FixedIncome),
    ("GD29", Category::FixedIncome),
    ("GD35", Category::FixedIncome),
    ("GD38", Category::FixedIncome),
    ("GD41", Category::FixedIncome),
    ("GD46", Category::FixedIncome),
    ("AE38", Category::FixedIncome),
    ("BA37D", Category::FixedIncome),
    ("BPOC7", Category::FixedIncome),
    ("TX26", Category::FixedIncome),
    ("TX28", Category::FixedIncome),
    ("BND", Category::FixedIncome),
    ("AGG", Category::FixedIncome),
    ("TLT", Category::FixedIncome),
    // Gold
    ("GLD", Category::Gold),
    ("IAU", Category::Gold),
    ("GOLD", Category::Gold),
    ("NEM", Category::Gold),
    ("AEM", Category::Gold),
    ("GDX", Category::Gold),
    ("AUY", Category::Gold),
    ("KGC", Category::Gold),
    ("HMY", Category::Gold),
    // Silver
    ("SLV", Category::Silver),
    ("PSLV", Category::Silver),
    ("SIL", Category::Silver),
    ("PAAS", Category::Silver),
    ("AG", Category::Silver),
    ("HL", Category::Silver),
    // Crypto proxies
    ("IBIT", Category::BitcoinProxy),
    ("GBTC", Category::BitcoinProxy),
    ("FBTC", Category::BitcoinProxy),
    ("BITO", Category::BitcoinProxy),
    ("MSTR", Category::BitcoinProxy),
    ("ETHA", Category::EtherProxy),
    ("ETHE", Category::EtherProxy),
    ("FETH", Category::EtherProxy),
    // Brazil
    ("EWZ", Category::BrazilEquity),
    ("PBR", Category::BrazilEquity),
    ("VALE3", Category::BrazilEquity),
    ("ITUB", Category::BrazilEquity),
    ("BBD", Category::BrazilEquity),
    // Commodities / miners
    ("VALE", Category::Commodities),
    ("BHP", Category::Commodities),
    ("RIO", Category::Commodities),
    ("FCX", Category::Commodities),
    ("SCCO", Category::Commodities),
    ("URA", Category::Commodities),
    ("CCJ", Category::Commodities),
    ("UUUU", Category::Commodities),
    ("X", Category::Commodities),
    // Cash and money market
    ("PESOS", Category::CashEquivalent),
    ("ARS", Category::CashEquivalent),
    ("USD", Category::CashEquivalent),
    ("USD.C", Category::CashEquivalent),
    ("USDC", Category::CashEquivalent),
    ("DOLAR", Category::CashEquivalent),
];

// Ordered: first matching pattern wins.
const HEURISTICS: &[(&str, Category)] = &[
    // Sovereign bond series (AL30D, GD35C, AE38...)
    (r"^(AL|GD|AE|AY)\d{2}[DC]?$", Category::FixedIncome),
    (r"BONO.*GLOBAL|GLOBAL.*BONO", Category::FixedIncome),
    (r"BONAR", Category::FixedIncome),
    // Treasury letter series (S31E5, T17O5...)
    (r"^[ST]\d{2}[A-Z]\d$", Category::FixedIncome),
    (r"^TZ[A-Z]{2}\d$", Category::FixedIncome),
    (r"LETRA|LECAP|LEFI|BONCAP", Category::FixedIncome),
    (r"CHEQUE|PAGARE|ECHEQ", Category::FixedIncome),
    // Caución-style placeholder symbols
    (r"^\*[A-Z]{3}\d+", Category::FixedIncome),
    (r"FCI|MONEY\s*MARKET|CAUCION|MM$", Category::CashEquivalent),
    (r"CUENTA|SALDO|DISPONIBLE|EFECTIVO", Category::CashEquivalent),
    // Anything else on the local board defaults to domestic equity
    (r"\.BA$", Category::DomesticEquity),
];

/// Uppercases, trims and drops characters a ticker symbol never carries.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '*')
        .collect()
}

pub struct Classifier {
    table: HashMap<String, Category>,
    patterns: Vec<(Regex, Category)>,
}

impl Classifier {
    /// Classifier with the built-in table only.
    pub fn new() -> Self {
        let table = BUILTIN_MAPPINGS
            .iter()
            .map(|(t, c)| (t.to_string(), *c))
            .collect();
        let patterns = HEURISTICS
            .iter()
            .map(|(p, c)| (Regex::new(p).unwrap(), *c))
            .collect();
        Classifier { table, patterns }
    }

    /// Built-in table overlaid with user mappings from the database.
    /// User rows win over built-ins for the same ticker.
    pub fn with_custom_mappings(conn: &Connection) -> Result<Self> {
        let mut classifier = Self::new();
        let mut stmt = conn.prepare("SELECT ticker, category FROM ticker_mappings")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (ticker, category) = row?;
            if let Ok(cat) = category.parse::<Category>() {
                classifier.table.insert(normalize_ticker(&ticker), cat);
            } else {
                log::warn!("ignoring mapping for {ticker}: unknown category {category}");
            }
        }
        Ok(classifier)
    }

    /// Table lookup first (exact, then with settlement/board suffix
    /// stripped), then the heuristic patterns against ticker and
    /// description. Misses land in [`Category::Unclassified`].
    pub fn classify(&self, ticker: &str, description: &str) -> Category {
        let normalized = normalize_ticker(ticker);
        if normalized.is_empty() {
            return Category::Unclassified;
        }

        if let Some(cat) = self.table.get(&normalized) {
            return *cat;
        }
        if let Some(stripped) = strip_suffix(&normalized) {
            if let Some(cat) = self.table.get(&stripped) {
                return *cat;
            }
        }

        let haystack = format!("{normalized} {}", description.trim().to_uppercase());
        for (re, cat) in &self.patterns {
            if re.is_match(&normalized) || re.is_match(&haystack) {
                return *cat;
            }
        }
        Category::Unclassified
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

// "YPFD.BA" -> "YPFD", "AL30D" -> "AL30". One strip per lookup.
fn strip_suffix(ticker: &str) -> Option<String> {
    if let Some(stripped) = ticker.strip_suffix(".BA") {
        return Some(stripped.to_string());
    }
    if ticker.len() > 1 && (ticker.ends_with('D') || ticker.ends_with('C')) {
        return Some(ticker[..ticker.len() - 1].to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker("  spy "), "SPY");
        assert_eq!(normalize_ticker("usd.c"), "USD.C");
        assert_eq!(normalize_ticker("AL30 (7000)"), "AL307000");
        assert_eq!(normalize_ticker("brk-b"), "BRKB");
    }

    #[test]
    fn test_table_lookups() {
        let c = Classifier::new();
        assert_eq!(c.classify("SPY", ""), Category::UsEquity);
        assert_eq!(c.classify("YPFD", ""), Category::DomesticEquity);
        assert_eq!(c.classify("GLD", ""), Category::Gold);
        assert_eq!(c.classify("SLV", ""), Category::Silver);
        assert_eq!(c.classify("IBIT", ""), Category::BitcoinProxy);
        assert_eq!(c.classify("ETHA", ""), Category::EtherProxy);
        assert_eq!(c.classify("EWZ", ""), Category::BrazilEquity);
        assert_eq!(c.classify("CCJ", ""), Category::Commodities);
        assert_eq!(c.classify("USD", ""), Category::CashEquivalent);
    }

    #[test]
    fn test_suffix_stripping() {
        let c = Classifier::new();
        assert_eq!(c.classify("YPFD.BA", ""), Category::DomesticEquity);
        assert_eq!(c.classify("AL30D", ""), Category::FixedIncome);
        assert_eq!(c.classify("GD35C", ""), Category::FixedIncome);
    }

    #[test]
    fn test_heuristics() {
        let c = Classifier::new();
        // Treasury letter not in the table
        assert_eq!(c.classify("S31E5", "LECAP VTO 31/01/2025"), Category::FixedIncome);
        assert_eq!(c.classify("AY24", ""), Category::FixedIncome);
        assert_eq!(
            c.classify("COCORMA", "FCI COCOS AHORRO MONEY MARKET"),
            Category::CashEquivalent
        );
        assert_eq!(c.classify("SALDO", "SALDO EN CUENTA"), Category::CashEquivalent);
    }

    #[test]
    fn test_unknown_is_unclassified() {
        let c = Classifier::new();
        assert_eq!(c.classify("ZZZZ", "mystery instrument"), Category::Unclassified);
        assert_eq!(c.classify("", ""), Category::Unclassified);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = Classifier::new();
        let first = c.classify("AL30", "BONAR 2030");
        for _ in 0..10 {
            assert_eq!(c.classify("AL30", "BONAR 2030"), first);
        }
    }

    #[test]
    fn test_custom_mapping_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let conn = crate::db::get_connection(&dir.path().join("t.db")).unwrap();
        crate::db::init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO ticker_mappings (ticker, category) VALUES ('SPY', 'GOLD'), ('ZZZZ', 'COMMODITIES')",
            [],
        )
        .unwrap();
        let c = Classifier::with_custom_mappings(&conn).unwrap();
        assert_eq!(c.classify("SPY", ""), Category::Gold);
        assert_eq!(c.classify("ZZZZ", ""), Category::Commodities);
    }
}
