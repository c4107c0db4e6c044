// Subprocess script engine
// reason: async-trait, tokio for async process management
//
// Each evaluation spawns a fresh JavaScript shell (node, rhino, d8, ...) running
// a generated driver script; results come back as marker lines on stdout.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use compat_table_core::application::constants::MAX_RUNTIME_EXCEEDED_MESSAGE;
use compat_table_core::port::{AsyncCallbacks, EvalContext, ScriptEngine, ScriptError, ScriptValue};

use crate::driver::{self, DriverEvent};

const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// How to launch the JavaScript shell
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine name written to `_engine`
    pub name: String,
    /// Executable, resolved through the filtered PATH
    pub command: String,
    /// Arguments placed before the eval flag
    pub args: Vec<String>,
    /// Flag that makes the shell evaluate its next argument (`-e` for node and rhino)
    pub eval_flag: String,
    /// Expression printing one line to stdout (`console.log`, `print`)
    pub print_function: String,
    /// Arguments printing the shell version; empty disables the query
    pub version_args: Vec<String>,
    /// Environment variables passed through to the shell
    pub env_allowlist: Vec<String>,
    /// Hard bound on a single shell process
    pub process_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "node".to_string(),
            command: "node".to_string(),
            args: Vec::new(),
            eval_flag: "-e".to_string(),
            print_function: "console.log".to_string(),
            version_args: vec!["--version".to_string()],
            env_allowlist: vec!["PATH".to_string(), "HOME".to_string()],
            process_timeout_ms: 60_000,
        }
    }
}

/// Script engine backed by an external JavaScript shell
///
/// Probes do not share state across evaluations: every probe runs in its own
/// process, so only the context prelude is common to all of them.
pub struct SubprocessEngine {
    config: EngineConfig,
}

impl SubprocessEngine {
    /// # Example
    /// ```ignore
    /// let engine = SubprocessEngine::new(EngineConfig {
    ///     name: "rhino".to_string(),
    ///     command: "rhino".to_string(),
    ///     print_function: "print".to_string(),
    ///     version_args: vec![],
    ///     ..Default::default()
    /// });
    /// ```
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shell version as printed by `version_args`, if the shell reports one
    pub async fn version(&self) -> Option<String> {
        if self.config.version_args.is_empty() {
            return None;
        }

        let output = Command::new(&self.config.command)
            .args(&self.config.version_args)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(VERSION_QUERY_TIMEOUT, output).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                warn!(command = %self.config.command, status = %output.status, "Version query failed");
                return None;
            }
            Ok(Err(e)) => {
                warn!(command = %self.config.command, error = %e, "Version query failed");
                return None;
            }
            Err(_) => {
                warn!(command = %self.config.command, "Version query timed out");
                return None;
            }
        };

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!version.is_empty()).then_some(version)
    }

    fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.config.process_timeout_ms)
    }

    /// Filter environment variables to allowlist only
    fn filter_env(&self, env: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
        env.filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    fn spawn(&self, script: &str) -> Result<Child, ScriptError> {
        Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(&self.config.eval_flag)
            .arg(script)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ScriptError::new(format!("Failed to spawn {}: {}", self.config.command, e))
            })
    }

    /// Read events until the async driver finished setup
    ///
    /// Returns whether a signal was already delivered, or `None` when the
    /// shell exited before reporting.
    async fn read_setup(
        lines: &mut Lines<BufReader<ChildStdout>>,
        callbacks: &AsyncCallbacks,
    ) -> Result<Option<bool>, ScriptError> {
        let mut signaled = false;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| ScriptError::new(format!("Engine IO error: {}", e)))?;
            let Some(line) = line else {
                return Ok(None);
            };

            match driver::parse_event(&line) {
                Some(DriverEvent::Ready) => return Ok(Some(signaled)),
                Some(DriverEvent::Threw(message)) => return Err(ScriptError { message }),
                Some(DriverEvent::Passed) => {
                    signaled = true;
                    callbacks.passed.fire();
                }
                Some(DriverEvent::Failed) => {
                    signaled = true;
                    callbacks.failed.fire();
                }
                _ => {}
            }
        }
    }
}

/// Error for a shell that exited without printing a result line
fn silent_exit(status: ExitStatus, stderr: &[u8]) -> ScriptError {
    let stderr = String::from_utf8_lossy(stderr);
    match stderr.lines().map(str::trim).find(|line| !line.is_empty()) {
        Some(line) => ScriptError::new(line),
        None => ScriptError::new(format!(
            "Engine exited with {} without reporting a result",
            status
        )),
    }
}

/// Read stderr to the end so a chatty probe never blocks on a full pipe
fn drain_stderr(stderr: Option<ChildStderr>) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Some(mut stderr) = stderr {
            if let Err(e) = stderr.read_to_end(&mut buffer).await {
                debug!(error = %e, "Engine stderr read failed");
            }
        }
        buffer
    })
}

#[async_trait]
impl ScriptEngine for SubprocessEngine {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn eval_sync(&self, ctx: &EvalContext, source: &str) -> Result<ScriptValue, ScriptError> {
        let script = driver::sync_script(ctx.prelude(), source, &self.config.print_function);
        let started = Instant::now();
        let child = self.spawn(&script)?;

        let output = match timeout(self.process_timeout(), child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ScriptError::new(format!("Engine IO error: {}", e))),
            Err(_) => {
                warn!(
                    command = %self.config.command,
                    timeout_ms = self.config.process_timeout_ms,
                    "Engine process killed"
                );
                return Err(ScriptError::new(MAX_RUNTIME_EXCEEDED_MESSAGE));
            }
        };

        debug!(
            command = %self.config.command,
            duration_ms = started.elapsed().as_millis() as u64,
            exit_code = ?output.status.code(),
            "Sync evaluation completed"
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        for event in stdout.lines().filter_map(driver::parse_event) {
            match event {
                DriverEvent::Returned(value) => return Ok(ScriptValue::Bool(value)),
                DriverEvent::Threw(message) => return Err(ScriptError { message }),
                _ => {}
            }
        }
        Err(silent_exit(output.status, &output.stderr))
    }

    async fn eval_async(
        &self,
        ctx: &EvalContext,
        source: &str,
        callbacks: AsyncCallbacks,
    ) -> Result<(), ScriptError> {
        let script = driver::async_script(
            ctx.prelude(),
            source,
            &self.config.print_function,
            &callbacks.pass_name,
            &callbacks.fail_name,
        );
        let mut child = self.spawn(&script)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScriptError::new("Engine stdout unavailable"))?;
        let stderr = drain_stderr(child.stderr.take());
        let mut lines = BufReader::new(stdout).lines();
        let lifetime = self.process_timeout();

        let signaled = match timeout(lifetime, Self::read_setup(&mut lines, &callbacks)).await {
            Ok(Ok(Some(signaled))) => signaled,
            Ok(Ok(None)) => {
                let status = child
                    .wait()
                    .await
                    .map_err(|e| ScriptError::new(format!("Engine IO error: {}", e)))?;
                let stderr = stderr.await.unwrap_or_default();
                return Err(silent_exit(status, &stderr));
            }
            Ok(Err(thrown)) => return Err(thrown),
            Err(_) => return Err(ScriptError::new(MAX_RUNTIME_EXCEEDED_MESSAGE)),
        };

        if signaled {
            // The driver forwards only the first signal; the shell can go
            return Ok(());
        }

        let command = self.config.command.clone();
        tokio::spawn(async move {
            // Child is killed when this task drops it
            let _child = child;
            let listen = async {
                while let Ok(Some(line)) = lines.next_line().await {
                    match driver::parse_event(&line) {
                        Some(DriverEvent::Passed) => return callbacks.passed.fire(),
                        Some(DriverEvent::Failed) => return callbacks.failed.fire(),
                        _ => {}
                    }
                }
                debug!(command = %command, "Engine exited without an async signal");
            };
            if timeout(lifetime, listen).await.is_err() {
                warn!(command = %command, "Engine process killed while awaiting a signal");
            }
        });

        info!(command = %self.config.command, "Async probe setup reported ready");
        Ok(())
    }

    fn deadline_script(&self, fail_callback: &str, deadline: Duration) -> Option<String> {
        Some(driver::deadline_script(fail_callback, deadline.as_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compat_table_core::port::CompletionSignal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_test::assert_ok;

    /// Node-backed engine, or `None` when node is not installed
    async fn node() -> Option<SubprocessEngine> {
        let engine = SubprocessEngine::new(EngineConfig::default());
        match engine.version().await {
            Some(_) => Some(engine),
            None => {
                eprintln!("node not available, skipping");
                None
            }
        }
    }

    fn counting_callbacks() -> (AsyncCallbacks, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let passed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let (p, f) = (Arc::clone(&passed), Arc::clone(&failed));
        let callbacks = AsyncCallbacks {
            pass_name: "asyncTestPassed".to_string(),
            fail_name: "asyncTestFailed".to_string(),
            passed: CompletionSignal::new(move || {
                p.fetch_add(1, Ordering::SeqCst);
            }),
            failed: CompletionSignal::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        };
        (callbacks, passed, failed)
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.command, "node");
        assert_eq!(config.eval_flag, "-e");
        assert_eq!(config.print_function, "console.log");
        assert_eq!(config.process_timeout_ms, 60_000);
    }

    #[test]
    fn test_filter_env() {
        let engine = SubprocessEngine::new(EngineConfig::default());
        let env = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("HOME".to_string(), "/home/user".to_string()),
            ("SECRET_KEY".to_string(), "secret123".to_string()),
        ];

        let filtered = engine.filter_env(env.into_iter());

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.get("PATH"), Some(&"/usr/bin".to_string()));
        assert!(!filtered.contains_key("SECRET_KEY"));
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"name": "rhino", "command": "rhino", "print_function": "print"}"#)
                .unwrap();
        assert_eq!(config.name, "rhino");
        assert_eq!(config.eval_flag, "-e");
        assert_eq!(config.env_allowlist, vec!["PATH", "HOME"]);
    }

    #[test]
    fn test_deadline_script() {
        let engine = SubprocessEngine::new(EngineConfig::default());
        let script = engine
            .deadline_script("asyncTestFailed", Duration::from_millis(5000))
            .unwrap();
        assert!(script.contains("setTimeout(asyncTestFailed, 5000)"));
    }

    #[test]
    fn test_silent_exit_prefers_stderr() {
        let status = ExitStatus::default();

        let err = silent_exit(status, b"\n  SyntaxError: Unexpected token\n  at foo\n");
        assert_eq!(err.message.as_deref(), Some("SyntaxError: Unexpected token"));

        let err = silent_exit(status, b"");
        assert!(err.message.unwrap().contains("without reporting a result"));
    }

    #[tokio::test]
    async fn test_missing_command_is_script_error() {
        let engine = SubprocessEngine::new(EngineConfig {
            command: "compat-table-no-such-shell".to_string(),
            ..Default::default()
        });

        let err = engine
            .eval_sync(&EvalContext::new(), "return true")
            .await
            .unwrap_err();
        assert!(err.message.unwrap().contains("Failed to spawn"));
        assert_eq!(engine.version().await, None);
    }

    #[tokio::test]
    async fn test_node_sync_results() {
        let Some(engine) = node().await else { return };
        let ctx = EvalContext::with_prelude(crate::COMPAT_PRELUDE);

        let value = assert_ok!(engine.eval_sync(&ctx, "return [1, 2].includes(2);").await);
        assert!(value.is_truthy());

        let value = assert_ok!(engine.eval_sync(&ctx, "return 0;").await);
        assert!(!value.is_truthy());

        let err = engine
            .eval_sync(&ctx, "throw new TypeError('nope');")
            .await
            .unwrap_err();
        assert_eq!(err.message.as_deref(), Some("nope"));

        let err = engine.eval_sync(&ctx, "throw 42;").await.unwrap_err();
        assert_eq!(err.message, None);
    }

    #[tokio::test]
    async fn test_node_async_signal() {
        let Some(engine) = node().await else { return };
        let ctx = EvalContext::with_prelude(crate::COMPAT_PRELUDE);
        let (callbacks, passed, failed) = counting_callbacks();

        assert_ok!(
            engine
                .eval_async(
                    &ctx,
                    "setTimeout(function () { asyncTestPassed(); asyncTestFailed(); }, 20);",
                    callbacks,
                )
                .await
        );

        let started = Instant::now();
        while passed.load(Ordering::SeqCst) == 0 && started.elapsed() < Duration::from_secs(10) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(passed.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_node_async_setup_throw() {
        let Some(engine) = node().await else { return };
        let (callbacks, passed, _failed) = counting_callbacks();

        let err = engine
            .eval_async(&EvalContext::new(), "asyncTestPassed; null.x;", callbacks)
            .await
            .unwrap_err();
        assert!(err.message.is_some());
        assert_eq!(passed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_node_async_survives_stderr_flood() {
        let Some(engine) = node().await else { return };
        let (callbacks, passed, _failed) = counting_callbacks();

        // Well past a pipe buffer, written synchronously before setup returns
        assert_ok!(
            engine
                .eval_async(
                    &EvalContext::new(),
                    "process.stderr.write('x'.repeat(1 << 20)); asyncTestPassed();",
                    callbacks,
                )
                .await
        );
        assert_eq!(passed.load(Ordering::SeqCst), 1);
    }
}
