use std::str::FromStr;

use comfy_table::{Cell, Table};

use crate::allocation::load_profile;
use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::pct;
use crate::models::Category;
use crate::settings::get_data_dir;

pub fn list() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let mut stmt = conn.prepare(
        "SELECT profile, count(*), SUM(target_pct) FROM profiles GROUP BY profile ORDER BY profile",
    )?;
    let rows: Vec<(String, i64, f64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut table = Table::new();
    table.set_header(vec!["Profile", "Categories", "Target sum"]);
    for (profile, count, sum) in rows {
        table.add_row(vec![
            Cell::new(profile),
            Cell::new(count),
            Cell::new(pct(sum)),
        ]);
    }
    println!("Profiles\n{table}");
    Ok(())
}

pub fn show(name: &str) -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let targets = load_profile(&conn, name)?;

    let mut table = Table::new();
    table.set_header(vec!["Category", "Target"]);
    for (category, target) in &targets {
        table.add_row(vec![
            Cell::new(format!("{category} ({})", category.display_name())),
            Cell::new(pct(*target)),
        ]);
    }
    println!("Profile: {name}\n{table}");

    let sum: f64 = targets.values().sum();
    if (sum - 100.0).abs() > 0.01 {
        println!("Warning: targets sum to {}", pct(sum));
    }
    Ok(())
}

// Shared by the overrides and mappings handlers.
pub(crate) fn parse_category(raw: &str) -> Result<Category> {
    Category::from_str(&raw.trim().to_uppercase())
        .map_err(|_| crate::error::CarteraError::UnknownCategory(raw.to_string()))
}
