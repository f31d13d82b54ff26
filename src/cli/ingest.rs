use std::path::Path;

use colored::Colorize;

use crate::classifier::Classifier;
use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::money;
use crate::ingest::{ingest_dir, ingest_file, IngestResult};
use crate::settings::{get_data_dir, load_settings};
use crate::store::RetryPolicy;

pub fn run(path: &str, dry_run: bool) -> Result<()> {
    let settings = load_settings();
    let conn = get_connection(&get_data_dir().join("cartera.db"))?;
    let classifier = Classifier::with_custom_mappings(&conn)?;
    let policy = RetryPolicy::from_settings(&settings);

    let path = Path::new(path);
    if path.is_dir() {
        let batch = ingest_dir(&conn, &classifier, policy, path, dry_run)?;
        for result in &batch.succeeded {
            print_result(result);
        }
        for (name, err) in &batch.failed {
            println!("{} {name}: {err}", "FAILED".red());
        }
        println!(
            "\n{} ingested, {} failed",
            batch.succeeded.len(),
            batch.failed.len()
        );
    } else {
        let result = ingest_file(&conn, &classifier, policy, path, dry_run)?;
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &IngestResult) {
    let tag = if result.dry_run {
        "DRY RUN".yellow()
    } else {
        "OK".green()
    };
    print!(
        "{tag} {} — account {} as of {}: {} holdings, total {}",
        result.filename,
        result.account_id,
        result.as_of_date,
        result.record_count,
        money(result.total_value),
    );
    if let Some(change) = result.pct_change {
        print!(" ({change:+.1}% vs prior)");
    }
    println!();
    if result.skipped > 0 {
        println!("  {} rows skipped", result.skipped);
    }
    if result.unclassified > 0 {
        println!(
            "  {} unclassified holdings queued for review",
            result.unclassified.to_string().yellow()
        );
    }
    if let Some(ref earlier) = result.duplicate_of {
        println!("  {} same content as {earlier}", "note:".yellow());
    }
}
