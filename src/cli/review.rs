use dialoguer::{theme::ColorfulTheme, Select};
use strum::IntoEnumIterator;

use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::money;
use crate::models::Category;
use crate::settings::get_data_dir;

struct QueuedTicker {
    ticker: String,
    description: String,
    total_value: f64,
    occurrences: i64,
}

pub fn run() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;

    let mut stmt = conn.prepare(
        "SELECT ticker, MAX(description), SUM(value), count(*)
         FROM review_queue WHERE resolved = 0
         GROUP BY ticker ORDER BY SUM(value) DESC",
    )?;
    let queued: Vec<QueuedTicker> = stmt
        .query_map([], |row| {
            Ok(QueuedTicker {
                ticker: row.get(0)?,
                description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                total_value: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                occurrences: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    drop(stmt);

    if queued.is_empty() {
        println!("Review queue is empty.");
        return Ok(());
    }
    println!("{} ticker(s) awaiting classification.\n", queued.len());

    let categories: Vec<Category> = Category::iter()
        .filter(|c| *c != Category::Unclassified)
        .collect();
    let mut labels: Vec<String> = categories
        .iter()
        .map(|c| format!("{c} ({})", c.display_name()))
        .collect();
    labels.push("Skip".to_string());
    labels.push("Quit".to_string());
    let skip_idx = labels.len() - 2;
    let quit_idx = labels.len() - 1;

    for item in &queued {
        let prompt = format!(
            "{} — {} ({}, seen {} time(s))",
            item.ticker,
            if item.description.is_empty() {
                "no description"
            } else {
                item.description.as_str()
            },
            money(item.total_value),
            item.occurrences,
        );
        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(&labels)
            .default(0)
            .interact()
            .map_err(|e| crate::error::CarteraError::Other(e.to_string()))?;

        if choice == quit_idx {
            break;
        }
        if choice == skip_idx {
            continue;
        }

        let category = categories[choice];
        conn.execute(
            "INSERT INTO ticker_mappings (ticker, category, note) VALUES (?1, ?2, 'from review')
             ON CONFLICT (ticker) DO UPDATE SET category = excluded.category",
            rusqlite::params![item.ticker, category.to_string()],
        )?;
        conn.execute(
            "UPDATE review_queue SET resolved = 1 WHERE ticker = ?1",
            [&item.ticker],
        )?;
        println!("Mapped {} -> {category}. Re-ingest to update history.\n", item.ticker);
    }
    Ok(())
}
