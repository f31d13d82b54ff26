use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::error::{CarteraError, Result};
use crate::models::{DetailRow, PortfolioSnapshot, SummaryRow};

/// Append-only history of portfolio snapshots. Re-appending the same
/// (account, date) replaces the earlier rows.
pub trait HistoryStore {
    fn append_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<Option<f64>>;
    fn read_detail(
        &self,
        account_id: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DetailRow>>;
    fn read_summary(&self, account_id: Option<&str>) -> Result<Vec<SummaryRow>>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteStore { conn }
    }
}

// SQLITE_BUSY / SQLITE_LOCKED are transient under WAL; surface them as
// a retryable store error instead of a generic database failure.
fn map_db_err(err: rusqlite::Error) -> CarteraError {
    if let rusqlite::Error::SqliteFailure(ref code, _) = err {
        if matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return CarteraError::StoreUnavailable(err.to_string());
        }
    }
    CarteraError::Db(err)
}

impl HistoryStore for SqliteStore<'_> {
    /// Writes one detail row per category plus a summary row, replacing
    /// any prior rows for the same account and date. Returns the percent
    /// change against the most recent earlier snapshot, if one exists.
    fn append_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<Option<f64>> {
        let date = snapshot.as_of_date.format("%Y-%m-%d").to_string();

        let tx = |conn: &Connection| -> std::result::Result<Option<f64>, rusqlite::Error> {
            conn.execute(
                "DELETE FROM holdings_history WHERE account_id = ?1 AND date = ?2",
                rusqlite::params![snapshot.account_id, date],
            )?;
            conn.execute(
                "DELETE FROM snapshots WHERE account_id = ?1 AND date = ?2",
                rusqlite::params![snapshot.account_id, date],
            )?;

            for (category, value) in &snapshot.category_totals {
                let pct = if snapshot.total_value > 0.0 {
                    value / snapshot.total_value * 100.0
                } else {
                    0.0
                };
                conn.execute(
                    "INSERT INTO holdings_history
                        (date, account_id, holder_name, category, value, pct, total_value)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        date,
                        snapshot.account_id,
                        snapshot.holder_name,
                        category.to_string(),
                        value,
                        pct,
                        snapshot.total_value,
                    ],
                )?;
            }

            let prior: Option<f64> = conn
                .query_row(
                    "SELECT total_value FROM snapshots
                     WHERE account_id = ?1 AND date < ?2
                     ORDER BY date DESC LIMIT 1",
                    rusqlite::params![snapshot.account_id, date],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            let pct_change = prior.and_then(|p| {
                if p > 0.0 {
                    Some((snapshot.total_value - p) / p * 100.0)
                } else {
                    None
                }
            });

            conn.execute(
                "INSERT INTO snapshots (date, account_id, holder_name, total_value, pct_change)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    date,
                    snapshot.account_id,
                    snapshot.holder_name,
                    snapshot.total_value,
                    pct_change,
                ],
            )?;
            Ok(pct_change)
        };

        self.conn.execute("BEGIN IMMEDIATE", []).map_err(map_db_err)?;
        match tx(self.conn) {
            Ok(pct_change) => {
                self.conn.execute("COMMIT", []).map_err(map_db_err)?;
                Ok(pct_change)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", []);
                Err(map_db_err(e))
            }
        }
    }

    fn read_detail(
        &self,
        account_id: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DetailRow>> {
        let mut sql = String::from(
            "SELECT date, account_id, holder_name, category, value, pct, total_value
             FROM holdings_history WHERE 1=1",
        );
        let mut params: Vec<String> = Vec::new();
        if let Some(account) = account_id {
            params.push(account.to_string());
            sql.push_str(&format!(" AND account_id = ?{}", params.len()));
        }
        if let Some(from) = from {
            params.push(from.format("%Y-%m-%d").to_string());
            sql.push_str(&format!(" AND date >= ?{}", params.len()));
        }
        if let Some(to) = to {
            params.push(to.format("%Y-%m-%d").to_string());
            sql.push_str(&format!(" AND date <= ?{}", params.len()));
        }
        sql.push_str(" ORDER BY date, account_id, value DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(DetailRow {
                date: parse_date_col(row.get::<_, String>(0)?, 0)?,
                account_id: row.get(1)?,
                holder_name: row.get(2)?,
                category: parse_category_col(row.get::<_, String>(3)?, 3)?,
                value: row.get(4)?,
                pct: row.get(5)?,
                total_value: row.get(6)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_db_err)
    }

    fn read_summary(&self, account_id: Option<&str>) -> Result<Vec<SummaryRow>> {
        let (sql, params): (&str, Vec<String>) = match account_id {
            Some(account) => (
                "SELECT date, account_id, holder_name, total_value, pct_change
                 FROM snapshots WHERE account_id = ?1 ORDER BY date",
                vec![account.to_string()],
            ),
            None => (
                "SELECT date, account_id, holder_name, total_value, pct_change
                 FROM snapshots ORDER BY date, account_id",
                Vec::new(),
            ),
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(SummaryRow {
                date: parse_date_col(row.get::<_, String>(0)?, 0)?,
                account_id: row.get(1)?,
                holder_name: row.get(2)?,
                total_value: row.get(3)?,
                pct_change: row.get(4)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_db_err)
    }
}

fn parse_date_col(raw: String, idx: usize) -> std::result::Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_category_col(
    raw: String,
    idx: usize,
) -> std::result::Result<crate::models::Category, rusqlite::Error> {
    raw.parse().map_err(|e: strum::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &crate::settings::Settings) -> Self {
        RetryPolicy {
            attempts: settings.store_retries.max(1),
            ..Self::default()
        }
    }
}

/// Store wrapper that applies the retry policy to every operation,
/// reads included.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: HistoryStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        RetryingStore { inner, policy }
    }
}

impl<S: HistoryStore> HistoryStore for RetryingStore<S> {
    fn append_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<Option<f64>> {
        with_retry(self.policy, "append_snapshot", || {
            self.inner.append_snapshot(snapshot)
        })
    }

    fn read_detail(
        &self,
        account_id: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DetailRow>> {
        with_retry(self.policy, "read_detail", || {
            self.inner.read_detail(account_id, from, to)
        })
    }

    fn read_summary(&self, account_id: Option<&str>) -> Result<Vec<SummaryRow>> {
        with_retry(self.policy, "read_summary", || {
            self.inner.read_summary(account_id)
        })
    }
}

/// Runs `op` up to `policy.attempts` times, backing off exponentially
/// between tries. Only [`CarteraError::StoreUnavailable`] is retried;
/// every other error is returned immediately.
pub fn with_retry<T, F>(policy: RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Err(CarteraError::StoreUnavailable(msg)) if attempt + 1 < policy.attempts => {
                let delay = policy.base_delay * 2u32.pow(attempt);
                log::warn!(
                    "{op_name}: store unavailable ({msg}), retrying in {:?} (attempt {}/{})",
                    delay,
                    attempt + 1,
                    policy.attempts
                );
                thread::sleep(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}
