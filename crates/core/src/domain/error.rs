// Domain Error Types

use thiserror::Error;

/// Structural violations of the probe catalog
///
/// These indicate a broken upstream collaborator, not a probe-level failure,
/// and abort the run.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid catalog shape: {0}")]
    InvalidShape(String),

    #[error("Probe '{name}' in version '{version}' has no source")]
    MissingSource { version: String, name: String },

    #[error("Duplicate probe '{name}' in version '{version}'")]
    DuplicateProbe { version: String, name: String },

    #[error("Duplicate version '{0}'")]
    DuplicateVersion(String),
}
