// Domain Layer - Probes, outcomes and reports

pub mod catalog;
pub mod error;
pub mod outcome;
pub mod report;

// Re-exports
pub use catalog::{Catalog, Probe, ProbeName, VersionId, VersionSuite};
pub use error::CatalogError;
pub use outcome::{Outcome, Protocol};
pub use report::{diff_reports, normalize_reserved, FinalReport, VersionReport};
