// Compat Harness - wires classifier, executors, sequencer and flush gate for one run

use std::sync::Arc;
use tracing::info;

use super::async_executor::AsyncExecutor;
use super::classifier::ProbeClassifier;
use super::flush_gate::{FlushGate, OutstandingProbes, ReportAggregator};
use super::probe_runner::ProbeRunner;
use super::sequencer::VersionSequencer;
use super::sync_executor::SyncExecutor;
use crate::config::HarnessConfig;
use crate::domain::{Catalog, FinalReport};
use crate::error::Result;
use crate::port::{EvalContext, ScriptEngine};

/// Runs a catalog against one engine and produces the compatibility matrix
///
/// # Example
/// ```text
/// let harness = CompatHarness::new(engine, Arc::new(EvalContext::new()), HarnessConfig::default())?;
/// let report = harness.run(&catalog).await?;
/// println!("{}", report.to_json_pretty()?);
/// ```
pub struct CompatHarness {
    engine: Arc<dyn ScriptEngine>,
    context: Arc<EvalContext>,
    config: HarnessConfig,
    classifier: ProbeClassifier,
}

impl CompatHarness {
    /// # Errors
    /// - HarnessError::Config if the configuration does not validate
    pub fn new(
        engine: Arc<dyn ScriptEngine>,
        context: Arc<EvalContext>,
        config: HarnessConfig,
    ) -> Result<Self> {
        config.validate()?;
        let classifier = ProbeClassifier::new(&config)?;

        Ok(Self {
            engine,
            context,
            config,
            classifier,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every probe of `catalog`; resolves once the flush gate opens
    ///
    /// Probe failures never abort the run. Each run gets its own outstanding
    /// counter and report; the evaluation context is shared.
    ///
    /// # Errors
    /// - HarnessError::Internal if a probe outcome was lost
    pub async fn run(&self, catalog: &Catalog) -> Result<FinalReport> {
        info!(
            engine = %self.engine.name(),
            versions = catalog.version_count(),
            probes = catalog.probe_count(),
            "Compat run starting"
        );

        let outstanding = OutstandingProbes::new();
        let gate = FlushGate::new(outstanding.clone(), self.config.flush_poll_interval());
        let runner = ProbeRunner::new(
            self.classifier.clone(),
            SyncExecutor::new(
                Arc::clone(&self.engine),
                Arc::clone(&self.context),
                self.config.sync_max_runtime(),
            ),
            AsyncExecutor::new(
                Arc::clone(&self.engine),
                Arc::clone(&self.context),
                outstanding,
                self.config.async_deadline(),
                self.config.pass_callback.clone(),
                self.config.fail_callback.clone(),
            ),
        );

        let mut aggregator = ReportAggregator::new(
            self.engine.name(),
            self.config.reported_version.clone(),
        );
        let mut sequencer = VersionSequencer::new(catalog);
        sequencer.run(&runner, &mut aggregator, &gate).await?;

        Ok(aggregator.flush(&gate).await)
    }
}
