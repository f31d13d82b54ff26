use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    account_id TEXT PRIMARY KEY,
    holder_name TEXT NOT NULL,
    profile TEXT NOT NULL DEFAULT 'moderate',
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY,
    profile TEXT NOT NULL,
    category TEXT NOT NULL,
    target_pct REAL NOT NULL,
    UNIQUE (profile, category)
);

CREATE TABLE IF NOT EXISTS allocation_overrides (
    id INTEGER PRIMARY KEY,
    account_id TEXT NOT NULL,
    category TEXT NOT NULL,
    target_pct REAL NOT NULL,
    UNIQUE (account_id, category),
    FOREIGN KEY (account_id) REFERENCES accounts(account_id)
);

CREATE TABLE IF NOT EXISTS ticker_mappings (
    id INTEGER PRIMARY KEY,
    ticker TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    note TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS holdings_history (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    account_id TEXT NOT NULL,
    holder_name TEXT NOT NULL,
    category TEXT NOT NULL,
    value REAL NOT NULL,
    pct REAL NOT NULL,
    total_value REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    account_id TEXT NOT NULL,
    holder_name TEXT NOT NULL,
    total_value REAL NOT NULL,
    pct_change REAL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS review_queue (
    id INTEGER PRIMARY KEY,
    ticker TEXT NOT NULL,
    description TEXT,
    account_id TEXT,
    date TEXT,
    value REAL,
    resolved INTEGER DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS ingests (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    account_id TEXT,
    record_count INTEGER,
    skipped_count INTEGER,
    checksum TEXT,
    ingest_date TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_history_account_date
    ON holdings_history(account_id, date);
CREATE INDEX IF NOT EXISTS idx_snapshots_account_date
    ON snapshots(account_id, date);
";

// (profile, category, target_pct) — seeded once on an empty database.
const DEFAULT_PROFILES: &[(&str, &str, f64)] = &[
    ("conservative", "CASH_EQUIVALENT", 40.0),
    ("conservative", "FIXED_INCOME", 35.0),
    ("conservative", "GOLD", 15.0),
    ("conservative", "US_EQUITY", 10.0),
    ("moderate", "US_EQUITY", 25.0),
    ("moderate", "FIXED_INCOME", 25.0),
    ("moderate", "DOMESTIC_EQUITY", 20.0),
    ("moderate", "GOLD", 15.0),
    ("moderate", "CASH_EQUIVALENT", 15.0),
    ("aggressive", "US_EQUITY", 35.0),
    ("aggressive", "DOMESTIC_EQUITY", 25.0),
    ("aggressive", "BITCOIN_PROXY", 15.0),
    ("aggressive", "GOLD", 10.0),
    ("aggressive", "FIXED_INCOME", 10.0),
    ("aggressive", "CASH_EQUIVALENT", 5.0),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM profiles", [], |row| row.get(0))?;
    if count == 0 {
        for (profile, category, pct) in DEFAULT_PROFILES {
            conn.execute(
                "INSERT INTO profiles (profile, category, target_pct) VALUES (?1, ?2, ?3)",
                rusqlite::params![profile, category, pct],
            )?;
        }
    }
    Ok(())
}
