// Report Aggregator / Flush Gate
//
// The final report is emitted exactly once, and only when
// (a) the sequencer has drained every version, and
// (b) no async probe is outstanding anywhere in the run.
// The gate subscribes to both conditions and polls as a fallback.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::{FinalReport, VersionId, VersionReport};

/// Run-wide counter of async probes that have not resolved yet
///
/// Spans all versions, not just the one being sequenced.
#[derive(Debug, Clone)]
pub struct OutstandingProbes {
    tx: Arc<watch::Sender<usize>>,
}

impl OutstandingProbes {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Count one more outstanding probe until the guard is released
    pub fn acquire(&self) -> OutstandingGuard {
        self.tx.send_modify(|count| *count += 1);
        OutstandingGuard {
            probes: self.clone(),
            released: false,
        }
    }

    pub fn count(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }

    fn release(&self) {
        self.tx.send_modify(|count| {
            if *count == 0 {
                warn!("Outstanding async probe counter released below zero");
            }
            *count = count.saturating_sub(1);
        });
    }
}

impl Default for OutstandingProbes {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one unit of the outstanding counter
///
/// Released exactly once: explicitly, or on drop if the owning task dies.
#[derive(Debug)]
pub struct OutstandingGuard {
    probes: OutstandingProbes,
    released: bool,
}

impl OutstandingGuard {
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.probes.release();
        }
    }
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Opens once versions are drained and the outstanding counter is zero
#[derive(Debug)]
pub struct FlushGate {
    outstanding: OutstandingProbes,
    drained: watch::Sender<bool>,
    poll_interval: Duration,
}

impl FlushGate {
    pub fn new(outstanding: OutstandingProbes, poll_interval: Duration) -> Self {
        let (drained, _rx) = watch::channel(false);
        Self {
            outstanding,
            drained,
            poll_interval,
        }
    }

    /// Sequencer reached `Drained`; does not emit anything by itself
    pub fn mark_drained(&self) {
        self.drained.send_replace(true);
    }

    pub fn is_drained(&self) -> bool {
        *self.drained.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.is_drained() && self.outstanding.count() == 0
    }

    /// Wait until the gate opens
    ///
    /// Wakes on every counter or drain change; the poll interval only bounds
    /// the latency if a notification is missed.
    pub async fn wait_open(&self) {
        let mut counter_rx = self.outstanding.subscribe();
        let mut drained_rx = self.drained.subscribe();

        loop {
            if self.is_open() {
                return;
            }

            tokio::select! {
                _ = counter_rx.changed() => {},
                _ = drained_rx.changed() => {},
                _ = sleep(self.poll_interval) => {
                    debug!(
                        drained = self.is_drained(),
                        outstanding = self.outstanding.count(),
                        "Flush gate still closed"
                    );
                }
            }
        }
    }
}

/// Accumulates sealed version reports until the flush gate opens
#[derive(Debug)]
pub struct ReportAggregator {
    engine_name: String,
    reported_version: String,
    versions: Vec<(VersionId, VersionReport)>,
}

impl ReportAggregator {
    pub fn new(engine_name: impl Into<String>, reported_version: impl Into<String>) -> Self {
        Self {
            engine_name: engine_name.into(),
            reported_version: reported_version.into(),
            versions: Vec::new(),
        }
    }

    /// Append a sealed version (drain order is report order)
    pub fn seal(&mut self, version: VersionId, report: VersionReport) {
        info!(
            version = %version,
            successful = report.successful_count(),
            total = report.total_count(),
            percent = report.percent(),
            "Version sealed"
        );
        self.versions.push((version, report));
    }

    pub fn sealed_versions(&self) -> usize {
        self.versions.len()
    }

    /// Wait for the gate and emit the final report; consumes the aggregator
    /// so the report can only be emitted once
    pub async fn flush(self, gate: &FlushGate) -> FinalReport {
        gate.wait_open().await;

        info!(
            engine = %self.engine_name,
            versions = self.versions.len(),
            "Flush gate open, emitting final report"
        );
        FinalReport {
            engine_name: self.engine_name,
            reported_version: self.reported_version,
            versions: self.versions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Outcome;
    use tokio_test::{assert_pending, assert_ready};

    #[test]
    fn test_guard_releases_exactly_once() {
        let probes = OutstandingProbes::new();
        let a = probes.acquire();
        let b = probes.acquire();
        assert_eq!(probes.count(), 2);

        a.release();
        assert_eq!(probes.count(), 1);

        drop(b);
        assert_eq!(probes.count(), 0);
    }

    #[test]
    fn test_gate_requires_both_conditions() {
        let probes = OutstandingProbes::new();
        let gate = FlushGate::new(probes.clone(), Duration::from_millis(100));
        assert!(!gate.is_open());

        let guard = probes.acquire();
        gate.mark_drained();
        assert!(gate.is_drained());
        assert!(!gate.is_open());

        guard.release();
        assert!(gate.is_open());
    }

    #[tokio::test]
    async fn test_wait_open_blocks_while_async_outstanding() {
        let probes = OutstandingProbes::new();
        let gate = FlushGate::new(probes.clone(), Duration::from_millis(100));
        let guard = probes.acquire();
        gate.mark_drained();

        let mut wait = tokio_test::task::spawn(gate.wait_open());
        assert_pending!(wait.poll());

        guard.release();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn test_wait_open_blocks_until_drained() {
        let gate = FlushGate::new(OutstandingProbes::new(), Duration::from_millis(100));

        let mut wait = tokio_test::task::spawn(gate.wait_open());
        assert_pending!(wait.poll());

        gate.mark_drained();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_emits_after_late_release() {
        let probes = OutstandingProbes::new();
        let gate = Arc::new(FlushGate::new(probes.clone(), Duration::from_millis(100)));
        let mut aggregator = ReportAggregator::new("scripted", "UNKNOWN");
        aggregator.seal(
            "v1".to_string(),
            VersionReport::from_results(vec![("a".to_string(), Outcome::Pass)]),
        );
        assert_eq!(aggregator.sealed_versions(), 1);

        let guard = probes.acquire();
        gate.mark_drained();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            guard.release();
        });

        let started = tokio::time::Instant::now();
        let report = aggregator.flush(&gate).await;
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(report.engine_name, "scripted");
        assert_eq!(report.versions.len(), 1);
    }
}
