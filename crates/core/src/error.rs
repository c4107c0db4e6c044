// Central Error Type for the Harness

use thiserror::Error;

/// Harness-level error type
///
/// Probe failures never show up here: they are converted into an
/// [`Outcome`](crate::domain::Outcome). Only structural problems (broken
/// catalog, invalid configuration, unreadable report) abort a run.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] crate::domain::CatalogError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid report: {0}")]
    InvalidReport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using HarnessError
pub type Result<T> = std::result::Result<T, HarnessError>;

impl From<regex::Error> for HarnessError {
    fn from(err: regex::Error) -> Self {
        HarnessError::Config(err.to_string())
    }
}
