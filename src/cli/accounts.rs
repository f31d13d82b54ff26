use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::{CarteraError, Result};
use crate::settings::get_data_dir;

const KNOWN_PROFILES: &[&str] = &["conservative", "moderate", "aggressive"];

pub fn add(account_id: &str, holder_name: &str, profile: &str) -> Result<()> {
    if !KNOWN_PROFILES.contains(&profile) {
        return Err(CarteraError::ProfileNotFound(profile.to_string()));
    }
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    conn.execute(
        "INSERT INTO accounts (account_id, holder_name, profile) VALUES (?1, ?2, ?3)",
        rusqlite::params![account_id, holder_name, profile],
    )?;
    println!("Added account {account_id} ({holder_name}, profile: {profile})");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let mut stmt =
        conn.prepare("SELECT account_id, holder_name, profile FROM accounts ORDER BY account_id")?;
    let rows: Vec<(String, String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut table = Table::new();
    table.set_header(vec!["Account", "Holder", "Profile"]);
    for (account_id, holder_name, profile) in rows {
        table.add_row(vec![
            Cell::new(account_id),
            Cell::new(holder_name),
            Cell::new(profile),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}
