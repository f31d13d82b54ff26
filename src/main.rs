mod allocation;
mod classifier;
mod cli;
mod db;
mod error;
mod filename;
mod fmt;
mod ingest;
mod models;
mod settings;
mod store;
mod tracker;

use clap::Parser;

use cli::{
    AccountsCommands, Cli, Commands, MappingsCommands, OverridesCommands, ProfilesCommands,
    ReportCommands,
};

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                account_id,
                holder_name,
                profile,
            } => cli::accounts::add(&account_id, &holder_name, &profile),
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::Ingest { path, dry_run } => cli::ingest::run(&path, dry_run),
        Commands::Profiles { command } => match command {
            ProfilesCommands::List => cli::profiles::list(),
            ProfilesCommands::Show { name } => cli::profiles::show(&name),
        },
        Commands::Overrides { command } => match command {
            OverridesCommands::Set {
                account_id,
                category,
                target_pct,
            } => cli::overrides::set(&account_id, &category, target_pct),
            OverridesCommands::List { account_id } => cli::overrides::list(&account_id),
            OverridesCommands::Clear {
                account_id,
                category,
            } => cli::overrides::clear(&account_id, category.as_deref()),
        },
        Commands::Mappings { command } => match command {
            MappingsCommands::Add {
                ticker,
                category,
                note,
            } => cli::mappings::add(&ticker, &category, note.as_deref()),
            MappingsCommands::List => cli::mappings::list(),
        },
        Commands::Review => cli::review::run(),
        Commands::Report { command } => match command {
            ReportCommands::Compare {
                account_id,
                tolerance,
            } => cli::report::compare(&account_id, tolerance),
            ReportCommands::History { account_id, limit } => {
                cli::report::history(&account_id, limit)
            }
            ReportCommands::Summary => cli::report::summary(),
            ReportCommands::Unclassified => cli::report::unclassified(),
            ReportCommands::Returns {
                account_id,
                from_date,
                to_date,
            } => cli::report::returns(&account_id, from_date.as_deref(), to_date.as_deref()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
