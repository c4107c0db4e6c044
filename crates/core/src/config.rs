// Harness Configuration

use crate::application::constants::*;
use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of one harness run
///
/// Every field has a default, so a partial TOML table or a handful of
/// environment variables is enough to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Wall-clock deadline of an async probe
    pub async_deadline_ms: u64,
    /// Fallback polling interval of the flush gate
    pub flush_poll_interval_ms: u64,
    /// Max runtime of a sync probe
    pub sync_max_runtime_ms: u64,
    /// Name of the injected success callback (also the async marker)
    pub pass_callback: String,
    /// Name of the injected failure callback
    pub fail_callback: String,
    /// Regular expressions matched against probe names
    pub denylist: Vec<String>,
    /// Value of `_version` in the final report
    pub reported_version: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            async_deadline_ms: DEFAULT_ASYNC_DEADLINE_MS,
            flush_poll_interval_ms: DEFAULT_FLUSH_POLL_INTERVAL_MS,
            sync_max_runtime_ms: DEFAULT_SYNC_MAX_RUNTIME_MS,
            pass_callback: DEFAULT_PASS_CALLBACK.to_string(),
            fail_callback: DEFAULT_FAIL_CALLBACK.to_string(),
            denylist: DEFAULT_DENYLIST.iter().map(|p| p.to_string()).collect(),
            reported_version: DEFAULT_REPORTED_VERSION.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Check durations, callback identifiers and denylist patterns
    ///
    /// # Errors
    /// - HarnessError::Config on a zero duration, an invalid identifier,
    ///   identical callback names or a pattern that does not compile
    pub fn validate(&self) -> Result<()> {
        if self.async_deadline_ms == 0 {
            return Err(HarnessError::Config(
                "async_deadline_ms must be greater than 0".to_string(),
            ));
        }
        if self.flush_poll_interval_ms == 0 {
            return Err(HarnessError::Config(
                "flush_poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.sync_max_runtime_ms == 0 {
            return Err(HarnessError::Config(
                "sync_max_runtime_ms must be greater than 0".to_string(),
            ));
        }

        validate_identifier("pass_callback", &self.pass_callback)?;
        validate_identifier("fail_callback", &self.fail_callback)?;
        if self.pass_callback == self.fail_callback {
            return Err(HarnessError::Config(format!(
                "pass_callback and fail_callback must differ (both are '{}')",
                self.pass_callback
            )));
        }

        for pattern in &self.denylist {
            regex::Regex::new(pattern).map_err(|e| {
                HarnessError::Config(format!("Invalid denylist pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }

    pub fn async_deadline(&self) -> Duration {
        Duration::from_millis(self.async_deadline_ms)
    }

    pub fn flush_poll_interval(&self) -> Duration {
        Duration::from_millis(self.flush_poll_interval_ms)
    }

    pub fn sync_max_runtime(&self) -> Duration {
        Duration::from_millis(self.sync_max_runtime_ms)
    }
}

/// Callback names end up as function parameters in the probe scope
fn validate_identifier(field: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(HarnessError::Config(format!(
            "{} must be a valid identifier, got '{}'",
            field, name
        )))
    }
}
