// Synchronous Executor
// Evaluates a probe as an isolated function body; the outcome is known when `run` returns

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::constants::MAX_RUNTIME_EXCEEDED_MESSAGE;
use super::panic_guard::join_error_message;
use crate::domain::Outcome;
use crate::port::{EvalContext, ScriptEngine};

/// Runs `Sync` probes
pub struct SyncExecutor {
    engine: Arc<dyn ScriptEngine>,
    context: Arc<EvalContext>,
    max_runtime: Duration,
}

impl SyncExecutor {
    pub fn new(
        engine: Arc<dyn ScriptEngine>,
        context: Arc<EvalContext>,
        max_runtime: Duration,
    ) -> Self {
        Self {
            engine,
            context,
            max_runtime,
        }
    }

    /// Evaluate `source` and classify the result
    ///
    /// - truthy return value -> `Pass`, falsy -> `Fail`
    /// - thrown value -> `ErrorMessage` (placeholder when it has no message)
    /// - engine panic or max runtime exceeded -> `ErrorMessage`
    pub async fn run(&self, source: &str) -> Outcome {
        let engine = Arc::clone(&self.engine);
        let context = Arc::clone(&self.context);
        let source = source.to_owned();

        // Own task: an engine panic must not unwind into the sequencer
        let mut handle =
            tokio::spawn(async move { engine.eval_sync(&context, &source).await });

        match timeout(self.max_runtime, &mut handle).await {
            Ok(Ok(Ok(value))) => {
                debug!(value = ?value, "Sync probe returned");
                Outcome::from_truthiness(value.is_truthy())
            }
            Ok(Ok(Err(thrown))) => {
                debug!(error = %thrown, "Sync probe threw");
                Outcome::from_thrown(thrown.message)
            }
            Ok(Err(join_err)) => Outcome::ErrorMessage(join_error_message(join_err)),
            Err(_) => {
                handle.abort();
                warn!(
                    max_runtime_ms = self.max_runtime.as_millis() as u64,
                    "Sync probe exceeded max runtime"
                );
                Outcome::ErrorMessage(MAX_RUNTIME_EXCEEDED_MESSAGE.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::constants::NO_MESSAGE_PLACEHOLDER;
    use crate::port::mocks::ScriptedEngine;
    use crate::port::{AsyncCallbacks, ScriptError, ScriptValue};
    use async_trait::async_trait;

    fn executor() -> SyncExecutor {
        SyncExecutor::new(
            Arc::new(ScriptedEngine::new()),
            Arc::new(EvalContext::new()),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_truthy_and_falsy_returns() {
        let executor = executor();
        assert_eq!(executor.run("return true").await, Outcome::Pass);
        assert_eq!(executor.run("return 1").await, Outcome::Pass);
        assert_eq!(executor.run("return 'yes'").await, Outcome::Pass);
        assert_eq!(executor.run("return false").await, Outcome::Fail);
        assert_eq!(executor.run("return 0").await, Outcome::Fail);
        assert_eq!(executor.run("return ''").await, Outcome::Fail);
        assert_eq!(executor.run("").await, Outcome::Fail);
    }

    #[tokio::test]
    async fn test_thrown_errors() {
        let executor = executor();
        assert_eq!(
            executor.run("throw new Error('x')").await,
            Outcome::ErrorMessage("x".to_string())
        );
        assert_eq!(
            executor.run("throw new TypeError(\"not a function\")").await,
            Outcome::ErrorMessage("not a function".to_string())
        );
        assert_eq!(
            executor.run("throw undefined").await,
            Outcome::ErrorMessage(NO_MESSAGE_PLACEHOLDER.to_string())
        );
    }

    #[tokio::test]
    async fn test_callbacks_unbound_in_sync_scope() {
        let outcome = executor().run("asyncTestFailed()").await;
        assert_eq!(
            outcome,
            Outcome::ErrorMessage("asyncTestFailed is not defined".to_string())
        );
    }

    #[tokio::test]
    async fn test_engine_panic_is_isolated() {
        let outcome = executor().run("panic('interpreter bug')").await;
        assert_eq!(
            outcome,
            Outcome::ErrorMessage("Engine panicked: interpreter bug".to_string())
        );
    }

    struct HangingEngine;

    #[async_trait]
    impl ScriptEngine for HangingEngine {
        fn name(&self) -> &str {
            "hanging"
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

    #[tokio::test(start_paused = true)]
    async fn test_max_runtime_exceeded() {
        let executor = SyncExecutor::new(
            Arc::new(HangingEngine),
            Arc::new(EvalContext::new()),
            Duration::from_millis(60_000),
        );

        let started = tokio::time::Instant::now();
        let outcome = executor.run("while (true) {}").await;

        assert_eq!(
            outcome,
            Outcome::ErrorMessage(MAX_RUNTIME_EXCEEDED_MESSAGE.to_string())
        );
        assert!(started.elapsed() >= Duration::from_millis(60_000));
    }
}
