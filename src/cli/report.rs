use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::allocation::{analyze, suggestions};
use crate::db::get_connection;
use crate::error::{CarteraError, Result};
use crate::fmt::{money, pct, signed_pts};
use crate::models::DeviationStatus;
use crate::settings::{get_data_dir, load_settings, Settings};
use crate::store::{RetryPolicy, RetryingStore, SqliteStore};
use crate::tracker;

// Reads go through the same bounded retry as ingest writes.
fn open_store<'a>(
    conn: &'a rusqlite::Connection,
    settings: &Settings,
) -> RetryingStore<SqliteStore<'a>> {
    RetryingStore::new(SqliteStore::new(conn), RetryPolicy::from_settings(settings))
}

pub fn compare(account_id: &str, tolerance: Option<f64>) -> Result<()> {
    let settings = load_settings();
    let tolerance = tolerance.unwrap_or(settings.tolerance_pct);
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let store = open_store(&conn, &settings);

    let snapshot = tracker::latest_snapshot(&store, account_id)?.ok_or_else(|| {
        CarteraError::EmptyPortfolio(format!("no snapshots for account {account_id}"))
    })?;
    let (profile, rows) = analyze(&conn, &snapshot, tolerance)?;
    let target_sum: f64 = rows.iter().map(|r| r.target_pct).sum();

    println!(
        "Account {account_id} ({}) as of {} — total {}",
        snapshot.holder_name,
        snapshot.as_of_date,
        money(snapshot.total_value),
    );
    println!("Profile: {profile}, tolerance: {tolerance} pts\n");

    let mut table = Table::new();
    table.set_header(vec!["Category", "Target", "Actual", "Deviation", "Status"]);
    for row in &rows {
        let status = match row.status {
            DeviationStatus::WithinTolerance => row.status.to_string().green(),
            DeviationStatus::Over => row.status.to_string().red(),
            DeviationStatus::Under => row.status.to_string().yellow(),
        };
        table.add_row(vec![
            Cell::new(row.category.display_name()),
            Cell::new(pct(row.target_pct)),
            Cell::new(pct(row.actual_pct)),
            Cell::new(signed_pts(row.deviation)),
            Cell::new(status),
        ]);
    }
    println!("{table}");
    if (target_sum - 100.0).abs() > 0.01 {
        println!("{}", format!("Note: targets sum to {}", pct(target_sum)).yellow());
    }

    let moves = suggestions(&rows);
    if moves.is_empty() {
        println!("\n{}", "All categories within tolerance.".green());
    } else {
        println!("\nSuggested moves:");
        for suggestion in moves {
            println!(
                "  {} {} by {} ({} pts off target)",
                suggestion.action,
                suggestion.category.display_name(),
                money(suggestion.amount),
                signed_pts(suggestion.deviation_pct),
            );
        }
    }
    Ok(())
}

pub fn history(account_id: &str, limit: Option<usize>) -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let store = open_store(&conn, &load_settings());
    let rows = tracker::history(&store, account_id, limit)?;
    if rows.is_empty() {
        println!("No history for account {account_id}");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Date", "Total", "Change"]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(row.date),
            Cell::new(money(row.total_value)),
            Cell::new(row.pct_change.map(|c| format!("{c:+.1}%")).unwrap_or_default()),
        ]);
    }
    println!("History for account {account_id} ({})\n{table}", rows[0].holder_name);
    Ok(())
}

pub fn summary() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let store = open_store(&conn, &load_settings());
    let rows = tracker::all_accounts_summary(&store)?;
    if rows.is_empty() {
        println!("No snapshots stored yet. Run `cartera ingest` first.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Account", "Holder", "As of", "Total", "Change"]);
    let mut grand_total = 0.0;
    for row in &rows {
        grand_total += row.total_value;
        table.add_row(vec![
            Cell::new(&row.account_id),
            Cell::new(&row.holder_name),
            Cell::new(row.date),
            Cell::new(money(row.total_value)),
            Cell::new(row.pct_change.map(|c| format!("{c:+.1}%")).unwrap_or_default()),
        ]);
    }
    println!("Latest snapshots\n{table}");
    println!("Combined total: {}", money(grand_total).bold());
    Ok(())
}

pub fn unclassified() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let mut stmt = conn.prepare(
        "SELECT ticker, MAX(description), SUM(value), count(*)
         FROM review_queue WHERE resolved = 0
         GROUP BY ticker ORDER BY SUM(value) DESC",
    )?;
    let rows: Vec<(String, Option<String>, Option<f64>, i64)> = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        println!("No unclassified tickers.");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Ticker", "Description", "Value", "Seen"]);
    for (ticker, description, value, seen) in rows {
        table.add_row(vec![
            Cell::new(ticker),
            Cell::new(description.unwrap_or_default()),
            Cell::new(money(value.unwrap_or(0.0))),
            Cell::new(seen),
        ]);
    }
    println!("Unclassified tickers\n{table}");
    println!("Run `cartera review` or `cartera mappings add` to classify them.");
    Ok(())
}

pub fn returns(account_id: &str, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let parse = |raw: &str| {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| CarteraError::Other(format!("invalid date: {raw} (expected YYYY-MM-DD)")))
    };
    let from = from.map(parse).transpose()?;
    let to = to.map(parse).transpose()?;

    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let store = open_store(&conn, &load_settings());
    let Some(period) = tracker::returns(&store, account_id, from, to)? else {
        println!("Need at least two snapshots in the period to compute returns.");
        return Ok(());
    };

    println!(
        "Account {account_id}: {} -> {}",
        period.start_date, period.end_date
    );
    println!(
        "Total: {} -> {} ({}{})",
        money(period.start_total),
        money(period.end_total),
        money(period.abs_change),
        period
            .pct_change
            .map(|c| format!(", {c:+.1}%"))
            .unwrap_or_default(),
    );

    let mut table = Table::new();
    table.set_header(vec!["Category", "Start", "End", "Change", "%"]);
    for change in &period.by_category {
        table.add_row(vec![
            Cell::new(change.category.display_name()),
            Cell::new(money(change.start_value)),
            Cell::new(money(change.end_value)),
            Cell::new(money(change.abs_change)),
            Cell::new(
                change
                    .pct_change
                    .map(|c| format!("{c:+.1}%"))
                    .unwrap_or_default(),
            ),
        ]);
    }
    println!("{table}");
    Ok(())
}
