use comfy_table::{Cell, Table};

use crate::cli::profiles::parse_category;
use crate::db::get_connection;
use crate::error::{CarteraError, Result};
use crate::fmt::pct;
use crate::settings::get_data_dir;

fn ensure_account(conn: &rusqlite::Connection, account_id: &str) -> Result<()> {
    let exists: i64 = conn.query_row(
        "SELECT count(*) FROM accounts WHERE account_id = ?1",
        [account_id],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(CarteraError::UnknownAccount(account_id.to_string()));
    }
    Ok(())
}

pub fn set(account_id: &str, category: &str, target_pct: f64) -> Result<()> {
    let category = parse_category(category)?;
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    ensure_account(&conn, account_id)?;
    conn.execute(
        "INSERT INTO allocation_overrides (account_id, category, target_pct)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (account_id, category) DO UPDATE SET target_pct = excluded.target_pct",
        rusqlite::params![account_id, category.to_string(), target_pct],
    )?;
    println!("Set {category} target for account {account_id} to {}", pct(target_pct));
    Ok(())
}

pub fn list(account_id: &str) -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    ensure_account(&conn, account_id)?;
    let mut stmt = conn.prepare(
        "SELECT category, target_pct FROM allocation_overrides
         WHERE account_id = ?1 ORDER BY category",
    )?;
    let rows: Vec<(String, f64)> = stmt
        .query_map([account_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        println!("No overrides for account {account_id}");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Category", "Target"]);
    for (category, target) in rows {
        table.add_row(vec![Cell::new(category), Cell::new(pct(target))]);
    }
    println!("Overrides for account {account_id}\n{table}");
    Ok(())
}

pub fn clear(account_id: &str, category: Option<&str>) -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    ensure_account(&conn, account_id)?;
    let removed = match category {
        Some(raw) => {
            let category = parse_category(raw)?;
            conn.execute(
                "DELETE FROM allocation_overrides WHERE account_id = ?1 AND category = ?2",
                rusqlite::params![account_id, category.to_string()],
            )?
        }
        None => conn.execute(
            "DELETE FROM allocation_overrides WHERE account_id = ?1",
            [account_id],
        )?,
    };
    println!("Removed {removed} override(s) for account {account_id}");
    Ok(())
}
