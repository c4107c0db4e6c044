// Application Layer - Probe execution harness

pub mod async_executor;
pub mod classifier;
pub mod constants;
pub mod flush_gate;
pub mod harness;
pub mod latch;
mod panic_guard;
pub mod probe_runner;
pub mod sequencer;
pub mod sync_executor;

// Re-exports
pub use async_executor::AsyncExecutor;
pub use classifier::ProbeClassifier;
pub use flush_gate::{FlushGate, OutstandingGuard, OutstandingProbes, ReportAggregator};
pub use harness::CompatHarness;
pub use latch::ResultLatch;
pub use probe_runner::{OnDone, ProbeRunner};
pub use sequencer::{SequencerState, VersionSequencer};
pub use sync_executor::SyncExecutor;
