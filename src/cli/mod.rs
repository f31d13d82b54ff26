pub mod accounts;
pub mod ingest;
pub mod init;
pub mod mappings;
pub mod overrides;
pub mod profiles;
pub mod report;
pub mod review;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cartera",
    about = "Broker portfolio ingestion and allocation tracking CLI."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up cartera: choose a data directory and initialize the database.
    Init {
        /// Path for cartera data (default: ~/Documents/cartera)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage broker accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Ingest a broker export file, or every export in a directory.
    Ingest {
        /// Path to an XLSX/CSV export, or a directory of them
        path: String,
        /// Parse and classify without writing anything
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Manage allocation profiles.
    Profiles {
        #[command(subcommand)]
        command: ProfilesCommands,
    },
    /// Manage per-account target overrides.
    Overrides {
        #[command(subcommand)]
        command: OverridesCommands,
    },
    /// Manage custom ticker mappings.
    Mappings {
        #[command(subcommand)]
        command: MappingsCommands,
    },
    /// Interactively classify tickers waiting in the review queue.
    Review,
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Register a broker account.
    Add {
        /// Broker account number (comitente)
        account_id: String,
        /// Account holder name as it appears in export filenames
        holder_name: String,
        /// Allocation profile: conservative, moderate, aggressive
        #[arg(long, default_value = "moderate")]
        profile: String,
    },
    /// List registered accounts.
    List,
}

#[derive(Subcommand)]
pub enum ProfilesCommands {
    /// List profiles and their target sums.
    List,
    /// Show one profile's category targets.
    Show {
        /// Profile name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum OverridesCommands {
    /// Set a per-account target for one category.
    Set {
        /// Account number
        account_id: String,
        /// Category key, e.g. US_EQUITY
        category: String,
        /// Target percentage
        target_pct: f64,
    },
    /// List overrides for an account.
    List {
        /// Account number
        account_id: String,
    },
    /// Remove overrides for an account.
    Clear {
        /// Account number
        account_id: String,
        /// Only remove this category's override
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum MappingsCommands {
    /// Map a ticker to a category, overriding the built-in table.
    Add {
        /// Ticker symbol
        ticker: String,
        /// Category key, e.g. FIXED_INCOME
        category: String,
        /// Free-form note
        #[arg(long)]
        note: Option<String>,
    },
    /// List custom mappings.
    List,
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Compare an account's latest snapshot against its targets.
    Compare {
        /// Account number
        account_id: String,
        /// Tolerance in percentage points (default from settings)
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Snapshot history for an account, newest first.
    History {
        /// Account number
        account_id: String,
        /// Show at most this many snapshots
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Latest snapshot per account.
    Summary,
    /// Tickers that landed in the unclassified bucket.
    Unclassified,
    /// Value change over a period, overall and per category.
    Returns {
        /// Account number
        account_id: String,
        /// Start date: YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// End date: YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
    },
}
