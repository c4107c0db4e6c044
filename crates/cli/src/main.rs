//! Compat Table CLI - runs a flat probe catalog against a JavaScript shell
//! and writes the compatibility matrix as JSON

mod settings;
mod summary;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use compat_table_core::application::constants::DEFAULT_REPORTED_VERSION;
use compat_table_core::domain::{diff_reports, Catalog, FinalReport};
use compat_table_core::port::EvalContext;
use compat_table_core::{application::CompatHarness, VERSION};
use compat_table_infra_system::{SubprocessEngine, COMPAT_PRELUDE};

use settings::{expand_path, AppConfig};

#[derive(Parser)]
#[command(name = "compat-table")]
#[command(about = "JavaScript engine compatibility harness", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a probe catalog and emit the report
    Run(RunArgs),

    /// List versions whose results differ between two reports
    Diff {
        /// Baseline report
        left: String,

        /// Report to compare
        right: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Flat catalog JSON: { "<version>": { "<probe name>": "<source>" } }
    #[arg(short, long)]
    catalog: String,

    /// Configuration file (TOML, JSON, YAML)
    #[arg(long, env = "COMPAT_TABLE_CONFIG")]
    config: Option<String>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// JavaScript shell executable (overrides engine.command)
    #[arg(long)]
    engine_command: Option<String>,

    /// Engine name written to `_engine` (overrides engine.name)
    #[arg(long)]
    engine_name: Option<String>,

    /// Value written to `_version`; queried from the shell when unset
    #[arg(long)]
    reported_version: Option<String>,

    /// Print a per-version summary table to stderr
    #[arg(long)]
    summary: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(command) = &self.engine_command {
            config.engine.command = command.clone();
        }
        if let Some(name) = &self.engine_name {
            config.engine.name = name.clone();
        }
        if let Some(version) = &self.reported_version {
            config.harness.reported_version = version.clone();
        }
    }
}

fn init_logging() -> Result<()> {
    let log_format =
        std::env::var("COMPAT_TABLE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("compat_table=info"))
        .context("Failed to create env filter")?;

    // stdout carries the report only
    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}

async fn run(args: RunArgs) -> Result<()> {
    let config_path = args.config.as_deref().map(expand_path).map(PathBuf::from);
    let mut config = AppConfig::load(config_path.as_deref())?;
    args.apply(&mut config);

    let catalog_path = expand_path(&args.catalog);
    let text = tokio::fs::read_to_string(&catalog_path)
        .await
        .with_context(|| format!("Failed to read catalog {}", catalog_path))?;
    let catalog = Catalog::from_json_str(&text)
        .with_context(|| format!("Invalid catalog {}", catalog_path))?;

    let engine = SubprocessEngine::new(config.engine.clone());
    if config.harness.reported_version == DEFAULT_REPORTED_VERSION {
        match engine.version().await {
            Some(version) => config.harness.reported_version = version,
            None => warn!(command = %config.engine.command, "Engine version unknown"),
        }
    }

    let context = Arc::new(EvalContext::with_prelude(COMPAT_PRELUDE));
    let harness = CompatHarness::new(Arc::new(engine), context, config.harness)?;
    let report = harness.run(&catalog).await?;

    let json = report.to_json_pretty()?;
    match &args.output {
        Some(output) => {
            let output = expand_path(output);
            tokio::fs::write(&output, format!("{}\n", json))
                .await
                .with_context(|| format!("Failed to write report {}", output))?;
            info!(path = %output, "Report written");
        }
        None => println!("{}", json),
    }

    if args.summary {
        eprintln!("{}", summary::render(&report));
    }
    Ok(())
}

async fn load_report(path: &str) -> Result<FinalReport> {
    let path = expand_path(path);
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read report {}", path))?;
    FinalReport::from_json_str(&text).with_context(|| format!("Invalid report {}", path))
}

/// Returns whether the reports agree
async fn diff(left: &str, right: &str) -> Result<bool> {
    let left = load_report(left).await?;
    let right = load_report(right).await?;

    let differing = diff_reports(&left, &right);
    if differing.is_empty() {
        println!("{}", "No differences".green());
        return Ok(true);
    }

    println!("{}", format!("{} version(s) differ:", differing.len()).red().bold());
    for version in &differing {
        println!("  {}", version);
    }
    Ok(false)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;
    info!("Compat Table v{}", VERSION);

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Diff { left, right } => {
            if !diff(&left, &right).await? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
