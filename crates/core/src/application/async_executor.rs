// Asynchronous Executor
// Probes that report through injected pass/fail callbacks, bounded by a deadline

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::flush_gate::OutstandingProbes;
use super::latch::ResultLatch;
use super::panic_guard::join_error_message;
use super::probe_runner::OnDone;
use crate::domain::Outcome;
use crate::port::{AsyncCallbacks, CompletionSignal, EvalContext, ScriptEngine, ScriptError};

/// Runs `Async` probes
///
/// Resolution paths, first one wins through the probe's [`ResultLatch`]:
/// 1. success callback -> `Pass`
/// 2. failure callback or deadline -> `Fail`
/// 3. setup throws -> `ErrorMessage`
///
/// The outstanding counter is incremented before evaluation and decremented
/// exactly once, before `on_done` is invoked.
pub struct AsyncExecutor {
    engine: Arc<dyn ScriptEngine>,
    context: Arc<EvalContext>,
    outstanding: OutstandingProbes,
    deadline: Duration,
    pass_callback: String,
    fail_callback: String,
}

impl AsyncExecutor {
    pub fn new(
        engine: Arc<dyn ScriptEngine>,
        context: Arc<EvalContext>,
        outstanding: OutstandingProbes,
        deadline: Duration,
        pass_callback: impl Into<String>,
        fail_callback: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            context,
            outstanding,
            deadline,
            pass_callback: pass_callback.into(),
            fail_callback: fail_callback.into(),
        }
    }

    /// Start the probe; `on_done` fires exactly once at an unspecified later time
    pub fn run(&self, source: &str, on_done: OnDone) {
        let guard = self.outstanding.acquire();
        let (latch, outcome_rx) = ResultLatch::new();
        let callbacks = self.callbacks(&latch);

        // Deadline travels with the probe source, so it is signaled through
        // the same failure callback whoever triggers it
        let mut script = source.to_owned();
        if let Some(deadline_script) = self
            .engine
            .deadline_script(&self.fail_callback, self.deadline)
        {
            script.push('\n');
            script.push_str(&deadline_script);
        }

        // Harness-side timer for engines that never fire their own deadline
        let deadline = self.deadline;
        let deadline_latch = Arc::clone(&latch);
        let deadline_signal = callbacks.failed.clone();
        let timer = tokio::spawn(async move {
            sleep(deadline).await;
            if !deadline_latch.is_resolved() {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Async probe deadline elapsed without a signal"
                );
            }
            deadline_signal.fire();
        });

        let engine = Arc::clone(&self.engine);
        let context = Arc::clone(&self.context);
        tokio::spawn(async move {
            let mut setup =
                tokio::spawn(async move { engine.eval_async(&context, &script, callbacks).await });
            let mut outcome_rx = outcome_rx;

            // Setup may never return; the latch settles the probe regardless
            let resolved_early = tokio::select! {
                joined = &mut setup => {
                    Self::record_setup(&latch, joined);
                    None
                }
                outcome = &mut outcome_rx => Some(outcome.unwrap_or(Outcome::Fail)),
            };

            let outcome = match resolved_early {
                Some(outcome) => {
                    setup.abort();
                    outcome
                }
                // The deadline timer always resolves the latch eventually
                None => outcome_rx.await.unwrap_or(Outcome::Fail),
            };
            timer.abort();

            guard.release();
            on_done(outcome);
        });
    }

    fn record_setup(
        latch: &ResultLatch,
        joined: Result<Result<(), ScriptError>, JoinError>,
    ) {
        match joined {
            Ok(Ok(())) => debug!("Async probe setup completed"),
            Ok(Err(thrown)) => {
                debug!(error = %thrown, "Async probe setup threw");
                latch.resolve(Outcome::from_thrown(thrown.message));
            }
            Err(join_err) => {
                latch.resolve(Outcome::ErrorMessage(join_error_message(join_err)));
            }
        }
    }

    fn callbacks(&self, latch: &Arc<ResultLatch>) -> AsyncCallbacks {
        let pass_latch = Arc::clone(latch);
        let fail_latch = Arc::clone(latch);

        AsyncCallbacks {
            pass_name: self.pass_callback.clone(),
            fail_name: self.fail_callback.clone(),
            passed: CompletionSignal::new(move || {
                if !pass_latch.resolve(Outcome::Pass) {
                    debug!("Duplicate async signal ignored");
                }
            }),
            failed: CompletionSignal::new(move || {
                if !fail_latch.resolve(Outcome::Fail) {
                    debug!("Duplicate async signal ignored");
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mocks::ScriptedEngine;
    use crate::port::ScriptValue;
    use async_trait::async_trait;
    use tokio::sync::oneshot;
    use tokio::time::Instant;

    const DEADLINE: Duration = Duration::from_millis(5000);

    /// Engine whose setup never returns and never signals
    struct StuckSetupEngine;

    #[async_trait]
    impl ScriptEngine for StuckSetupEngine {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn eval_sync(
            &self,
            _ctx: &EvalContext,
            _source: &str,
        ) -> Result<ScriptValue, ScriptError> {
            std::future::pending().await
        }

        async fn eval_async(
            &self,
            _ctx: &EvalContext,
            _source: &str,
            _callbacks: AsyncCallbacks,
        ) -> Result<(), ScriptError> {
            std::future::pending().await
        }
    }

    fn executor(engine: Arc<dyn ScriptEngine>, outstanding: OutstandingProbes) -> AsyncExecutor {
        AsyncExecutor::new(
            engine,
            Arc::new(EvalContext::new()),
            outstanding,
            DEADLINE,
            "asyncTestPassed",
            "asyncTestFailed",
        )
    }

    async fn run_probe(executor: &AsyncExecutor, source: &str) -> Outcome {
        let (tx, rx) = oneshot::channel();
        executor.run(
            source,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        rx.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success() {
        let outstanding = OutstandingProbes::new();
        let executor = executor(Arc::new(ScriptedEngine::new()), outstanding.clone());

        let started = Instant::now();
        assert_eq!(run_probe(&executor, "asyncTestPassed()").await, Outcome::Pass);
        assert!(started.elapsed() < DEADLINE);
        assert_eq!(outstanding.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_failure() {
        let executor = executor(Arc::new(ScriptedEngine::new()), OutstandingProbes::new());
        assert_eq!(
            run_probe(&executor, "// asyncTestPassed is never reached\nasyncTestFailed()").await,
            Outcome::Fail
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_success_before_deadline() {
        let executor = executor(Arc::new(ScriptedEngine::new()), OutstandingProbes::new());
        assert_eq!(
            run_probe(&executor, "setTimeout(asyncTestPassed, 1200)").await,
            Outcome::Pass
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_probe_times_out() {
        let outstanding = OutstandingProbes::new();
        let executor = executor(Arc::new(ScriptedEngine::without_timers()), outstanding.clone());

        let started = Instant::now();
        let outcome = run_probe(&executor, "// asyncTestPassed never called").await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, Outcome::Fail);
        assert!(elapsed >= DEADLINE);
        assert!(elapsed < DEADLINE + Duration::from_millis(10));
        assert_eq!(outstanding.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_script_appended_to_source() {
        let engine = Arc::new(ScriptedEngine::new());
        let executor = executor(engine.clone() as Arc<dyn ScriptEngine>, OutstandingProbes::new());

        let outcome = run_probe(&executor, "// asyncTestPassed never called").await;

        assert_eq!(outcome, Outcome::Fail);
        let evaluations = engine.evaluations();
        assert_eq!(evaluations.len(), 1);
        assert!(evaluations[0]
            .source
            .ends_with("\nsetTimeout(asyncTestFailed, 5000)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_throw_reports_message() {
        let outstanding = OutstandingProbes::new();
        let executor = executor(Arc::new(ScriptedEngine::new()), outstanding.clone());

        let outcome = run_probe(
            &executor,
            "// uses asyncTestPassed\nthrow new Error('setup failed')",
        )
        .await;

        assert_eq!(outcome, Outcome::ErrorMessage("setup failed".to_string()));
        assert_eq!(outstanding.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_signal_wins() {
        let executor = executor(Arc::new(ScriptedEngine::new()), OutstandingProbes::new());

        let outcome = run_probe(
            &executor,
            "asyncTestPassed(); asyncTestPassed(); asyncTestFailed()",
        )
        .await;
        assert_eq!(outcome, Outcome::Pass);

        // Signal after setup threw: the success already committed
        let outcome = run_probe(&executor, "asyncTestPassed(); throw new Error('late')").await;
        assert_eq!(outcome, Outcome::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_during_setup_is_reported() {
        let outstanding = OutstandingProbes::new();
        let executor = executor(Arc::new(ScriptedEngine::new()), outstanding.clone());

        let outcome = run_probe(&executor, "// asyncTestPassed\npanic('boom')").await;

        assert_eq!(outcome, Outcome::ErrorMessage("Engine panicked: boom".to_string()));
        assert_eq!(outstanding.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_held_until_resolution() {
        let outstanding = OutstandingProbes::new();
        let executor = executor(Arc::new(ScriptedEngine::new()), outstanding.clone());

        let (tx, rx) = oneshot::channel();
        let observer = outstanding.clone();
        executor.run(
            "setTimeout(asyncTestPassed, 100)",
            Box::new(move |outcome| {
                // Decrement happens before on_done
                let _ = tx.send((outcome, observer.count()));
            }),
        );
        assert_eq!(outstanding.count(), 1);

        let (outcome, count_at_done) = rx.await.unwrap();
        assert_eq!(outcome, Outcome::Pass);
        assert_eq!(count_at_done, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_settles_probe_with_stuck_setup() {
        let outstanding = OutstandingProbes::new();
        let executor = executor(Arc::new(StuckSetupEngine), outstanding.clone());

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            DEADLINE * 2,
            run_probe(&executor, "// asyncTestPassed never called"),
        )
        .await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, Ok(Outcome::Fail));
        assert!(elapsed >= DEADLINE);
        assert!(elapsed < DEADLINE + Duration::from_millis(10));
        assert_eq!(outstanding.count(), 0);
    }
}
