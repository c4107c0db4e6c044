// Layered configuration: defaults < optional file < COMPAT_TABLE__* env vars < flags

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use compat_table_core::HarnessConfig;
use compat_table_infra_system::EngineConfig;

const ENV_PREFIX: &str = "COMPAT_TABLE";

/// Everything the binary needs to run a catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub harness: HarnessConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load from `path` (TOML, JSON, ...; format inferred from the extension)
    /// and the environment, e.g. `COMPAT_TABLE__HARNESS__ASYNC_DEADLINE_MS=2000`
    /// or `COMPAT_TABLE__ENGINE__ARGS=--harmony,--no-warnings`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("harness.denylist")
                .with_list_parse_key("engine.args")
                .with_list_parse_key("engine.version_args")
                .with_list_parse_key("engine.env_allowlist"),
        );

        builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}

/// Expand `~` in a user supplied path
pub fn expand_path(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}
