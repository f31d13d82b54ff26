use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::error::{CarteraError, Result};
use crate::models::{
    Category, DeviationRow, DeviationStatus, PortfolioSnapshot, RebalanceAction, Suggestion,
};

/// Profile targets for an account with any per-account overrides
/// applied on top. Returns the profile name and the merged map.
pub fn resolve_target(
    conn: &Connection,
    account_id: &str,
) -> Result<(String, BTreeMap<Category, f64>)> {
    let profile: String = conn
        .query_row(
            "SELECT profile FROM accounts WHERE account_id = ?1",
            [account_id],
            |row| row.get(0),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(CarteraError::UnknownAccount(
                account_id.to_string(),
            )),
            other => Err(CarteraError::Db(other)),
        })?;

    let mut targets = load_profile(conn, &profile)?;

    let mut stmt = conn.prepare(
        "SELECT category, target_pct FROM allocation_overrides WHERE account_id = ?1",
    )?;
    let rows = stmt.query_map([account_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;
    for row in rows {
        let (category, pct) = row?;
        let category = category
            .parse::<Category>()
            .map_err(|_| CarteraError::UnknownCategory(category))?;
        targets.insert(category, pct);
    }

    Ok((profile, targets))
}

pub fn load_profile(conn: &Connection, profile: &str) -> Result<BTreeMap<Category, f64>> {
    let mut stmt =
        conn.prepare("SELECT category, target_pct FROM profiles WHERE profile = ?1")?;
    let rows = stmt.query_map([profile], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;
    let mut targets = BTreeMap::new();
    for row in rows {
        let (category, pct) = row?;
        let category = category
            .parse::<Category>()
            .map_err(|_| CarteraError::UnknownCategory(category))?;
        targets.insert(category, pct);
    }
    if targets.is_empty() {
        return Err(CarteraError::ProfileNotFound(profile.to_string()));
    }
    Ok(targets)
}

/// Compares actual allocation against targets over the union of
/// categories, sorted by absolute deviation descending. A deviation
/// whose magnitude equals the tolerance is still within it.
pub fn compare(
    snapshot: &PortfolioSnapshot,
    targets: &BTreeMap<Category, f64>,
    tolerance_pct: f64,
) -> Vec<DeviationRow> {
    let actual = snapshot.allocation_pct();

    let mut categories: Vec<Category> = targets.keys().chain(actual.keys()).copied().collect();
    categories.sort();
    categories.dedup();

    let mut rows: Vec<DeviationRow> = categories
        .into_iter()
        .map(|category| {
            let target_pct = targets.get(&category).copied().unwrap_or(0.0);
            let actual_pct = actual.get(&category).copied().unwrap_or(0.0);
            let deviation = actual_pct - target_pct;
            let status = if deviation.abs() <= tolerance_pct {
                DeviationStatus::WithinTolerance
            } else if deviation > 0.0 {
                DeviationStatus::Over
            } else {
                DeviationStatus::Under
            };
            DeviationRow {
                category,
                target_pct,
                actual_pct,
                deviation,
                status,
                suggested_adjustment: deviation / 100.0 * snapshot.total_value,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.deviation
            .abs()
            .partial_cmp(&a.deviation.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows
}

/// Concrete rebalancing moves for the out-of-tolerance rows.
pub fn suggestions(rows: &[DeviationRow]) -> Vec<Suggestion> {
    rows.iter()
        .filter(|row| row.status != DeviationStatus::WithinTolerance)
        .map(|row| Suggestion {
            action: if row.deviation > 0.0 {
                RebalanceAction::Reduce
            } else {
                RebalanceAction::Increase
            },
            category: row.category,
            amount: row.suggested_adjustment.abs(),
            deviation_pct: row.deviation,
        })
        .collect()
}

/// Resolves the account's targets and compares the snapshot to them.
pub fn analyze(
    conn: &Connection,
    snapshot: &PortfolioSnapshot,
    tolerance_pct: f64,
) -> Result<(String, Vec<DeviationRow>)> {
    let (profile, targets) = resolve_target(conn, &snapshot.account_id)?;
    Ok((profile, compare(snapshot, &targets, tolerance_pct)))
}
