// Version Sequencer
//
// Start --pop--> Running(v) --all probes of v reported--> Start --queue empty--> Drained
//
// Versions run strictly one after another (probes share one global environment),
// probes of one version run concurrently.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::flush_gate::{FlushGate, ReportAggregator};
use super::probe_runner::ProbeRunner;
use crate::domain::{Catalog, Outcome, ProbeName, VersionId, VersionReport, VersionSuite};
use crate::error::{HarnessError, Result};

/// Sequencer state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerState {
    Start,
    Running(VersionId),
    Drained,
}

impl std::fmt::Display for SequencerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequencerState::Start => write!(f, "START"),
            SequencerState::Running(version) => write!(f, "RUNNING({})", version),
            SequencerState::Drained => write!(f, "DRAINED"),
        }
    }
}

/// Drives versions through the probe runner, one at a time
pub struct VersionSequencer<'a> {
    /// Popped from the back: versions run in reverse declaration order
    queue: Vec<&'a VersionSuite>,
    state: SequencerState,
}

impl<'a> VersionSequencer<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            queue: catalog.suites().iter().collect(),
            state: SequencerState::Start,
        }
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    /// Versions not popped yet, in the order they will run
    pub fn pending(&self) -> Vec<&str> {
        self.queue
            .iter()
            .rev()
            .map(|suite| suite.version.as_str())
            .collect()
    }

    /// Run every version, sealing each into `aggregator`, then signal `gate`
    ///
    /// # Errors
    /// - HarnessError::Internal if a probe's completion was lost (every
    ///   completion callback dropped without reporting)
    pub async fn run(
        &mut self,
        runner: &ProbeRunner,
        aggregator: &mut ReportAggregator,
        gate: &FlushGate,
    ) -> Result<()> {
        loop {
            let Some(suite) = self.queue.pop() else {
                self.state = SequencerState::Drained;
                info!("All versions processed");
                gate.mark_drained();
                return Ok(());
            };

            self.state = SequencerState::Running(suite.version.clone());
            info!(version = %suite.version, probes = suite.len(), "Version started");

            let report = Self::run_version(suite, runner).await?;
            aggregator.seal(suite.version.clone(), report);
            self.state = SequencerState::Start;
        }
    }

    async fn run_version(suite: &VersionSuite, runner: &ProbeRunner) -> Result<VersionReport> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(ProbeName, Outcome)>();
        let mut tally = VersionTally::new(suite);

        // Launch in catalog order; completion order is unconstrained
        for probe in &suite.probes {
            let tx = tx.clone();
            let name = probe.name.clone();
            runner
                .run(
                    probe,
                    Box::new(move |outcome| {
                        let _ = tx.send((name, outcome));
                    }),
                )
                .await;
        }
        drop(tx);

        while !tally.is_complete() {
            let Some((name, outcome)) = rx.recv().await else {
                return Err(HarnessError::Internal(format!(
                    "version '{}' lost {} probe outcome(s)",
                    suite.version,
                    tally.remaining()
                )));
            };
            tally.record(&suite.version, name, outcome);
        }

        Ok(tally.seal())
    }
}

/// Outcomes of the version being run, slotted in catalog order
struct VersionTally {
    slots: Vec<(ProbeName, Option<Outcome>)>,
    index: HashMap<ProbeName, usize>,
    completed: usize,
    successful: usize,
}

impl VersionTally {
    fn new(suite: &VersionSuite) -> Self {
        let slots: Vec<(ProbeName, Option<Outcome>)> = suite
            .probes
            .iter()
            .map(|probe| (probe.name.clone(), None))
            .collect();
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();

        Self {
            slots,
            index,
            completed: 0,
            successful: 0,
        }
    }

    /// Record an outcome; a second outcome for the same probe is ignored
    fn record(&mut self, version: &str, name: ProbeName, outcome: Outcome) {
        let Some(&slot) = self.index.get(&name) else {
            warn!(version = %version, probe = %name, "Outcome for unknown probe ignored");
            return;
        };
        if self.slots[slot].1.is_some() {
            warn!(version = %version, probe = %name, "Duplicate outcome ignored");
            return;
        }

        debug!(version = %version, probe = %name, outcome = %outcome, "Probe completed");
        if outcome.is_pass() {
            self.successful += 1;
        }
        self.slots[slot].1 = Some(outcome);
        self.completed += 1;
    }

    fn is_complete(&self) -> bool {
        self.completed == self.slots.len()
    }

    fn remaining(&self) -> usize {
        self.slots.len() - self.completed
    }

    fn seal(self) -> VersionReport {
        let successful = self.successful;
        let report = VersionReport::from_results(
            self.slots
                .into_iter()
                .map(|(name, outcome)| (name, outcome.unwrap_or(Outcome::Fail)))
                .collect(),
        );
        debug_assert_eq!(report.successful_count() as usize, successful);
        report
    }
}
