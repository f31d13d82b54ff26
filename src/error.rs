use thiserror::Error;

#[derive(Error, Debug)]
pub enum CarteraError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Sheet(String),

    #[error("Filename does not match any known broker export pattern: {0}")]
    InvalidFilename(String),

    #[error("No valid holdings in {0}")]
    EmptyPortfolio(String),

    #[error("No allocation profile named: {0}")]
    ProfileNotFound(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("History store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CarteraError>;
