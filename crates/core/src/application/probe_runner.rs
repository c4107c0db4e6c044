// Probe Runner - per-probe facade over the two executors

use tracing::debug;

use super::async_executor::AsyncExecutor;
use super::classifier::ProbeClassifier;
use super::sync_executor::SyncExecutor;
use crate::domain::{Outcome, Probe, Protocol};

/// Completion callback of one probe, invoked exactly once
pub type OnDone = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Dispatches a probe to the executor its protocol requires
pub struct ProbeRunner {
    classifier: ProbeClassifier,
    sync_executor: SyncExecutor,
    async_executor: AsyncExecutor,
}

impl ProbeRunner {
    pub fn new(
        classifier: ProbeClassifier,
        sync_executor: SyncExecutor,
        async_executor: AsyncExecutor,
    ) -> Self {
        Self {
            classifier,
            sync_executor,
            async_executor,
        }
    }

    /// Run one probe
    ///
    /// Denylisted and `Sync` probes invoke `on_done` before this returns;
    /// `Async` probes invoke it at some later time. Callers must not rely on
    /// either.
    pub async fn run(&self, probe: &Probe, on_done: OnDone) {
        if self.classifier.bypass(&probe.name).is_some() {
            on_done(Outcome::Fail);
            return;
        }

        let protocol = self.classifier.classify(&probe.source);
        debug!(
            version = %probe.version,
            probe = %probe.name,
            protocol = %protocol,
            "Launching probe"
        );

        match protocol {
            Protocol::Sync => {
                let outcome = self.sync_executor.run(&probe.source).await;
                on_done(outcome);
            }
            Protocol::Async => self.async_executor.run(&probe.source, on_done),
        }
    }
}
