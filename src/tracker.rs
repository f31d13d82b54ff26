use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Category, DetailRow, PortfolioSnapshot, SummaryRow};
use crate::store::HistoryStore;

/// Most recent stored snapshot for an account, rebuilt from its
/// detail rows. None when the account has no history.
pub fn latest_snapshot(
    store: &dyn HistoryStore,
    account_id: &str,
) -> Result<Option<PortfolioSnapshot>> {
    let summary = store.read_summary(Some(account_id))?;
    let Some(last) = summary.last() else {
        return Ok(None);
    };

    let detail = store.read_detail(Some(account_id), Some(last.date), Some(last.date))?;
    let category_totals: BTreeMap<Category, f64> = detail
        .iter()
        .map(|row| (row.category, row.value))
        .collect();

    Ok(Some(PortfolioSnapshot {
        account_id: last.account_id.clone(),
        holder_name: last.holder_name.clone(),
        as_of_date: last.date,
        category_totals,
        total_value: last.total_value,
    }))
}

/// Snapshot history for an account, newest first, optionally limited.
pub fn history(
    store: &dyn HistoryStore,
    account_id: &str,
    limit: Option<usize>,
) -> Result<Vec<SummaryRow>> {
    let mut rows = store.read_summary(Some(account_id))?;
    rows.reverse();
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    Ok(rows)
}

/// Latest snapshot per account across the whole store, largest first.
pub fn all_accounts_summary(store: &dyn HistoryStore) -> Result<Vec<SummaryRow>> {
    let rows = store.read_summary(None)?;
    let mut latest: BTreeMap<String, SummaryRow> = BTreeMap::new();
    for row in rows {
        // read_summary is date-ordered, so later rows win
        latest.insert(row.account_id.clone(), row);
    }
    let mut result: Vec<SummaryRow> = latest.into_values().collect();
    result.sort_by(|a, b| {
        b.total_value
            .partial_cmp(&a.total_value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(result)
}

#[derive(Debug)]
pub struct CategoryChange {
    pub category: Category,
    pub start_value: f64,
    pub end_value: f64,
    pub abs_change: f64,
    pub pct_change: Option<f64>,
}

#[derive(Debug)]
pub struct PeriodReturns {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_total: f64,
    pub end_total: f64,
    pub abs_change: f64,
    pub pct_change: Option<f64>,
    pub by_category: Vec<CategoryChange>,
}

/// Change between the first and last snapshots inside a date range,
/// overall and per category. None when fewer than two snapshots fall
/// inside the range.
pub fn returns(
    store: &dyn HistoryStore,
    account_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Option<PeriodReturns>> {
    let summary: Vec<SummaryRow> = store
        .read_summary(Some(account_id))?
        .into_iter()
        .filter(|row| from.map_or(true, |f| row.date >= f) && to.map_or(true, |t| row.date <= t))
        .collect();
    if summary.len() < 2 {
        return Ok(None);
    }
    let start = summary.first().unwrap();
    let end = summary.last().unwrap();

    let totals_at = |date: NaiveDate| -> Result<BTreeMap<Category, f64>> {
        Ok(store
            .read_detail(Some(account_id), Some(date), Some(date))?
            .iter()
            .map(|row| (row.category, row.value))
            .collect())
    };
    let start_totals = totals_at(start.date)?;
    let end_totals = totals_at(end.date)?;

    let mut categories: Vec<Category> = start_totals
        .keys()
        .chain(end_totals.keys())
        .copied()
        .collect();
    categories.sort();
    categories.dedup();

    let by_category = categories
        .into_iter()
        .map(|category| {
            let start_value = start_totals.get(&category).copied().unwrap_or(0.0);
            let end_value = end_totals.get(&category).copied().unwrap_or(0.0);
            CategoryChange {
                category,
                start_value,
                end_value,
                abs_change: end_value - start_value,
                pct_change: (start_value > 0.0)
                    .then(|| (end_value - start_value) / start_value * 100.0),
            }
        })
        .collect();

    Ok(Some(PeriodReturns {
        start_date: start.date,
        end_date: end.date,
        start_total: start.total_value,
        end_total: end.total_value,
        abs_change: end.total_value - start.total_value,
        pct_change: (start.total_value > 0.0)
            .then(|| (end.total_value - start.total_value) / start.total_value * 100.0),
        by_category,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use rusqlite::Connection;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = crate::db::get_connection(&dir.path().join("test.db")).unwrap();
        crate::db::init_db(&conn).unwrap();
        (dir, conn)
    }

    fn seed(store: &SqliteStore, account: &str, date: &str, totals: &[(Category, f64)]) {
        let category_totals: BTreeMap<Category, f64> = totals.iter().copied().collect();
        let total_value = category_totals.values().sum();
        store
            .append_snapshot(&PortfolioSnapshot {
                account_id: account.to_string(),
                holder_name: "LOPEZ".to_string(),
                as_of_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                category_totals,
                total_value,
            })
            .unwrap();
    }

    #[test]
    fn test_latest_snapshot_rebuilds_categories() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        seed(&store, "1", "2025-01-15", &[(Category::Gold, 100.0)]);
        seed(
            &store,
            "1",
            "2025-02-15",
            &[(Category::Gold, 150.0), (Category::UsEquity, 50.0)],
        );

        let snap = latest_snapshot(&store, "1").unwrap().unwrap();
        assert_eq!(snap.as_of_date, NaiveDate::from_ymd_opt(2025, 2, 15).unwrap());
        assert_eq!(snap.total_value, 200.0);
        assert_eq!(snap.category_totals[&Category::Gold], 150.0);
    }

    #[test]
    fn test_latest_snapshot_none_without_history() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        assert!(latest_snapshot(&store, "1").unwrap().is_none());
    }

    #[test]
    fn test_history_newest_first_with_limit() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        for date in &["2025-01-15", "2025-02-15", "2025-03-15"] {
            seed(&store, "1", date, &[(Category::Gold, 100.0)]);
        }
        let rows = history(&store, "1", Some(2)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
    }

    #[test]
    fn test_all_accounts_summary_latest_per_account() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        seed(&store, "1", "2025-01-15", &[(Category::Gold, 100.0)]);
        seed(&store, "1", "2025-02-15", &[(Category::Gold, 300.0)]);
        seed(&store, "2", "2025-02-15", &[(Category::Gold, 500.0)]);

        let rows = all_accounts_summary(&store).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].account_id, "2");
        assert_eq!(rows[1].total_value, 300.0);
    }

    #[test]
    fn test_returns_overall_and_per_category() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        seed(
            &store,
            "1",
            "2025-01-15",
            &[(Category::Gold, 1000.0), (Category::UsEquity, 1000.0)],
        );
        seed(
            &store,
            "1",
            "2025-03-15",
            &[(Category::Gold, 1200.0), (Category::UsEquity, 900.0)],
        );

        let ret = returns(&store, "1", None, None).unwrap().unwrap();
        assert!((ret.pct_change.unwrap() - 5.0).abs() < 0.001);
        let gold = ret
            .by_category
            .iter()
            .find(|c| c.category == Category::Gold)
            .unwrap();
        assert!((gold.pct_change.unwrap() - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_returns_needs_two_snapshots() {
        let (_dir, conn) = test_db();
        let store = SqliteStore::new(&conn);
        seed(&store, "1", "2025-01-15", &[(Category::Gold, 1000.0)]);
        assert!(returns(&store, "1", None, None).unwrap().is_none());
    }
}
