use comfy_table::{Cell, Table};

use crate::classifier::normalize_ticker;
use crate::cli::profiles::parse_category;
use crate::db::get_connection;
use crate::error::{CarteraError, Result};
use crate::settings::get_data_dir;

pub fn add(ticker: &str, category: &str, note: Option<&str>) -> Result<()> {
    let normalized = normalize_ticker(ticker);
    if normalized.is_empty() {
        return Err(CarteraError::Other(format!("not a usable ticker: {ticker:?}")));
    }
    let category = parse_category(category)?;
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    conn.execute(
        "INSERT INTO ticker_mappings (ticker, category, note) VALUES (?1, ?2, ?3)
         ON CONFLICT (ticker) DO UPDATE SET category = excluded.category, note = excluded.note",
        rusqlite::params![normalized, category.to_string(), note],
    )?;
    println!("Mapped {normalized} -> {category}");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let mut stmt =
        conn.prepare("SELECT ticker, category, note FROM ticker_mappings ORDER BY ticker")?;
    let rows: Vec<(String, String, Option<String>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        println!("No custom mappings");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Ticker", "Category", "Note"]);
    for (ticker, category, note) in rows {
        table.add_row(vec![
            Cell::new(ticker),
            Cell::new(category),
            Cell::new(note.unwrap_or_default()),
        ]);
    }
    println!("Custom mappings\n{table}");
    Ok(())
}
