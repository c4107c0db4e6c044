// Report Domain Model
//
// Document shape (compat-table results):
// {
//   "_version": "UNKNOWN",
//   "_engine": "node",
//   "<version>": { "_successful": 1, "_count": 2, "_percent": 0.5, "<probe>": true | false | "message" }
// }
// Keys starting with `_` are reserved; the version-diff tooling normalizes them away.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::catalog::{ProbeName, VersionId};
use super::outcome::Outcome;
use crate::error::{HarnessError, Result};

/// Prefix of reserved (non-result) keys
pub const RESERVED_PREFIX: char = '_';

const KEY_VERSION: &str = "_version";
const KEY_ENGINE: &str = "_engine";
const KEY_SUCCESSFUL: &str = "_successful";
const KEY_COUNT: &str = "_count";
const KEY_PERCENT: &str = "_percent";

/// Sealed statistics and per-probe outcomes of one version
#[derive(Debug, Clone, PartialEq)]
pub struct VersionReport {
    successful_count: u32,
    total_count: u32,
    percent: f64,
    results: Vec<(ProbeName, Outcome)>,
}

impl VersionReport {
    /// Seal a version from its outcomes (catalog order)
    ///
    /// `percent` is `successful / total`, and 0 for a version without probes.
    pub fn from_results(results: Vec<(ProbeName, Outcome)>) -> Self {
        let total_count = results.len() as u32;
        let successful_count = results.iter().filter(|(_, o)| o.is_pass()).count() as u32;
        let percent = if total_count == 0 {
            0.0
        } else {
            f64::from(successful_count) / f64::from(total_count)
        };

        Self {
            successful_count,
            total_count,
            percent,
            results,
        }
    }

    pub fn successful_count(&self) -> u32 {
        self.successful_count
    }

    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn results(&self) -> &[(ProbeName, Outcome)] {
        &self.results
    }

    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.results
            .iter()
            .find(|(probe, _)| probe == name)
            .map(|(_, outcome)| outcome)
    }

    /// Structural equality of the results, ignoring the reserved statistics
    pub fn same_results(&self, other: &VersionReport) -> bool {
        self.results == other.results
    }
}

impl Serialize for VersionReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.results.len()))?;
        map.serialize_entry(KEY_SUCCESSFUL, &self.successful_count)?;
        map.serialize_entry(KEY_COUNT, &self.total_count)?;
        map.serialize_entry(KEY_PERCENT, &self.percent)?;
        for (name, outcome) in &self.results {
            map.serialize_entry(name, outcome)?;
        }
        map.end()
    }
}

/// The aggregated compatibility matrix of one run
#[derive(Debug, Clone, PartialEq)]
pub struct FinalReport {
    pub engine_name: String,
    pub reported_version: String,
    /// Versions in the order they were drained by the sequencer
    pub versions: Vec<(VersionId, VersionReport)>,
}

impl FinalReport {
    pub fn version(&self, version: &str) -> Option<&VersionReport> {
        self.versions
            .iter()
            .find(|(id, _)| id == version)
            .map(|(_, report)| report)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a report document back (e.g. a previous run to diff against)
    ///
    /// Recomputes the statistics from the results instead of trusting the
    /// reserved fields.
    ///
    /// # Errors
    /// - HarnessError::Serialization if the text is not JSON
    /// - HarnessError::InvalidReport if the document does not have the report shape
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)?;
        let Value::Object(entries) = document else {
            return Err(HarnessError::InvalidReport(
                "top level must be an object".to_string(),
            ));
        };

        let mut report = FinalReport {
            engine_name: String::new(),
            reported_version: String::new(),
            versions: Vec::new(),
        };

        for (key, value) in entries {
            if key == KEY_ENGINE {
                report.engine_name = expect_string(&key, value)?;
            } else if key == KEY_VERSION {
                report.reported_version = expect_string(&key, value)?;
            } else if !key.starts_with(RESERVED_PREFIX) {
                let results = parse_results(&key, value)?;
                report.versions.push((key, VersionReport::from_results(results)));
            }
        }

        Ok(report)
    }
}

impl Serialize for FinalReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.versions.len()))?;
        map.serialize_entry(KEY_VERSION, &self.reported_version)?;
        map.serialize_entry(KEY_ENGINE, &self.engine_name)?;
        for (version, report) in &self.versions {
            map.serialize_entry(version, report)?;
        }
        map.end()
    }
}

fn parse_results(version: &str, value: Value) -> Result<Vec<(ProbeName, Outcome)>> {
    let Value::Object(fields) = value else {
        return Err(HarnessError::InvalidReport(format!(
            "version '{}' must be an object",
            version
        )));
    };

    let mut results = Vec::with_capacity(fields.len());
    for (name, outcome) in fields {
        if name.starts_with(RESERVED_PREFIX) {
            continue;
        }
        let outcome: Outcome = serde_json::from_value(outcome).map_err(|e| {
            HarnessError::InvalidReport(format!(
                "probe '{}' in version '{}': {}",
                name, version, e
            ))
        })?;
        results.push((name, outcome));
    }
    Ok(results)
}

fn expect_string(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(HarnessError::InvalidReport(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

/// Replace every reserved (`_`-prefixed) value with 0, recursively
///
/// Two reports that only differ in statistics or metadata normalize to the
/// same document.
pub fn normalize_reserved(value: &Value) -> Value {
    match value {
        Value::Object(entries) => {
            let normalized: Map<String, Value> = entries
                .iter()
                .map(|(key, value)| {
                    let value = if key.starts_with(RESERVED_PREFIX) {
                        Value::from(0)
                    } else {
                        normalize_reserved(value)
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_reserved).collect()),
        other => other.clone(),
    }
}

/// Versions whose results differ between two reports
///
/// A version present in only one report counts as differing. Order follows
/// `left`, then versions only found in `right`.
pub fn diff_reports(left: &FinalReport, right: &FinalReport) -> Vec<VersionId> {
    let mut differing: Vec<VersionId> = left
        .versions
        .iter()
        .filter(|(version, report)| {
            right
                .version(version)
                .map_or(true, |other| !report.same_results(other))
        })
        .map(|(version, _)| version.clone())
        .collect();

    differing.extend(
        right
            .versions
            .iter()
            .filter(|(version, _)| left.version(version).is_none())
            .map(|(version, _)| version.clone()),
    );

    differing
}
