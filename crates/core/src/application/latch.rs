// Result Latch - one-shot, first writer wins

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

use crate::domain::Outcome;

/// Commits exactly one outcome for a probe
///
/// Success callback, failure callback, deadline and setup error all race to
/// resolve the same latch; every resolution after the first is a no-op.
#[derive(Debug)]
pub struct ResultLatch {
    resolved: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl ResultLatch {
    /// Create a latch and the receiver of its single outcome
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let latch = Arc::new(Self {
            resolved: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        });
        (latch, rx)
    }

    /// Commit `outcome` if nothing was committed yet
    ///
    /// Returns false when the latch was already resolved.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = tx {
            // Receiver gone means nobody waits for this probe anymore
            let _ = tx.send(outcome);
        }
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_writer_wins() {
        let (latch, rx) = ResultLatch::new();

        assert!(!latch.is_resolved());
        assert!(latch.resolve(Outcome::Pass));
        assert!(!latch.resolve(Outcome::Fail));
        assert!(!latch.resolve(Outcome::ErrorMessage("late".into())));
        assert!(latch.is_resolved());

        assert_eq!(rx.await.unwrap(), Outcome::Pass);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_commits_once() {
        let (latch, rx) = ResultLatch::new();

        let mut handles = Vec::new();
        for i in 0..16 {
            let latch = Arc::clone(&latch);
            handles.push(tokio::spawn(async move {
                let outcome = if i % 2 == 0 { Outcome::Pass } else { Outcome::Fail };
                latch.resolve(outcome)
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert!(rx.await.is_ok());
    }

    #[test]
    fn test_resolve_after_receiver_dropped() {
        let (latch, rx) = ResultLatch::new();
        drop(rx);
        assert!(latch.resolve(Outcome::Fail));
    }
}
