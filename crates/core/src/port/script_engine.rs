// Script Engine Port
// Abstraction over whatever evaluates probe source (in-process interpreter or external shell)

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Value returned by a synchronous probe
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object,
}

impl ScriptValue {
    /// JavaScript truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => false,
            ScriptValue::Bool(b) => *b,
            ScriptValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ScriptValue::String(s) => !s.is_empty(),
            ScriptValue::Object => true,
        }
    }
}

/// A value thrown while evaluating a probe
///
/// `message` is `None` when the thrown value carries no message
/// (`throw null`, `throw undefined`, a thrown primitive).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .message.as_deref().unwrap_or("thrown value without message"))]
pub struct ScriptError {
    pub message: Option<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    pub fn without_message() -> Self {
        Self { message: None }
    }
}

/// Shared evaluation environment threaded through every probe execution
///
/// One context per run: probes deliberately share it (some of them test
/// global mutation). Tests build a fresh one per case.
#[derive(Debug, Default)]
pub struct EvalContext {
    prelude: String,
    globals: Mutex<HashMap<String, ScriptValue>>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose helper source is injected ahead of every probe
    pub fn with_prelude(prelude: impl Into<String>) -> Self {
        Self {
            prelude: prelude.into(),
            globals: Mutex::default(),
        }
    }

    pub fn prelude(&self) -> &str {
        &self.prelude
    }

    /// Read a probe-visible global (in-process engines)
    pub fn global(&self, name: &str) -> Option<ScriptValue> {
        self.globals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Write a probe-visible global (in-process engines)
    pub fn set_global(&self, name: impl Into<String>, value: ScriptValue) {
        self.globals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value);
    }
}

/// One of the two callbacks injected into an async probe
#[derive(Clone)]
pub struct CompletionSignal(Arc<dyn Fn() + Send + Sync>);

impl CompletionSignal {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the callback. Safe to call any number of times: only the
    /// first signal of a probe is committed.
    pub fn fire(&self) {
        (self.0)()
    }
}

impl std::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CompletionSignal")
    }
}

/// Callbacks bound into the scope of an async probe
#[derive(Debug, Clone)]
pub struct AsyncCallbacks {
    pub pass_name: String,
    pub fail_name: String,
    pub passed: CompletionSignal,
    pub failed: CompletionSignal,
}

impl AsyncCallbacks {
    /// Signal bound under `name`, if any
    pub fn signal(&self, name: &str) -> Option<&CompletionSignal> {
        if name == self.pass_name {
            Some(&self.passed)
        } else if name == self.fail_name {
            Some(&self.failed)
        } else {
            None
        }
    }
}

/// Script Engine trait
///
/// Implementations:
/// - SubprocessEngine (infra-system): spawns an external JavaScript shell
/// - mocks::ScriptedEngine: in-process interpreter of a tiny probe dialect
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Engine name reported as `_engine`
    fn name(&self) -> &str;

    /// Evaluate `source` as an isolated function body and return its value
    ///
    /// # Errors
    /// - ScriptError with the thrown value's message if evaluation throws
    async fn eval_sync(&self, ctx: &EvalContext, source: &str) -> Result<ScriptValue, ScriptError>;

    /// Evaluate `source` as a function body receiving the two callbacks
    ///
    /// Returning `Ok` means setup completed; the callbacks may fire during
    /// the call or at any later time.
    ///
    /// # Errors
    /// - ScriptError if setup throws
    async fn eval_async(
        &self,
        ctx: &EvalContext,
        source: &str,
        callbacks: AsyncCallbacks,
    ) -> Result<(), ScriptError>;

    /// Source appended to an async probe that fires `fail_callback` once
    /// `deadline` elapses. `None` for engines without timers.
    fn deadline_script(&self, _fail_callback: &str, _deadline: Duration) -> Option<String> {
        None
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// One evaluation started by the scripted engine
    #[derive(Debug, Clone)]
    pub struct Evaluation {
        pub source: String,
        pub started_at: Instant,
    }

    /// In-process engine for a tiny probe dialect
    ///
    /// Statements are separated by `;` or newlines, `//` lines are skipped:
    /// - `return <expr>` / `throw new Error('msg')` / `throw null`
    /// - `asyncTestPassed()` / `asyncTestFailed()` (any bound callback name)
    /// - `setTimeout(<callback>, <ms>)`
    /// - `globalThis.<name> = <expr>`
    /// - `panic('msg')` panics the evaluating task
    ///
    /// Expressions: literals, `globalThis.<name>`, `<expr> === <expr>`.
    pub struct ScriptedEngine {
        supports_timers: bool,
        executions: AtomicUsize,
        evaluations: Mutex<Vec<Evaluation>>,
    }

    enum Flow {
        Continue,
        Return(ScriptValue),
    }

    impl ScriptedEngine {
        pub fn new() -> Self {
            Self {
                supports_timers: true,
                executions: AtomicUsize::new(0),
                evaluations: Mutex::new(Vec::new()),
            }
        }

        /// Engine without `deadline_script` support: only the harness timer
        /// can time a probe out
        pub fn without_timers() -> Self {
            Self {
                supports_timers: false,
                ..Self::new()
            }
        }

        /// Number of evaluations attempted (instrumentation hook)
        pub fn executions(&self) -> usize {
            self.executions.load(Ordering::SeqCst)
        }

        pub fn evaluations(&self) -> Vec<Evaluation> {
            self.evaluations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn record(&self, source: &str) {
            self.executions.fetch_add(1, Ordering::SeqCst);
            self.evaluations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Evaluation {
                    source: source.to_string(),
                    started_at: Instant::now(),
                });
        }

        fn run_body(
            &self,
            ctx: &EvalContext,
            source: &str,
            callbacks: Option<&AsyncCallbacks>,
        ) -> Result<ScriptValue, ScriptError> {
            let statements = source
                .lines()
                .filter(|line| !line.trim_start().starts_with("//"))
                .flat_map(|line| line.split(';'))
                .map(str::trim)
                .filter(|statement| !statement.is_empty());

            for statement in statements {
                if let Flow::Return(value) = execute(ctx, statement, callbacks)? {
                    return Ok(value);
                }
            }
            Ok(ScriptValue::Undefined)
        }
    }

    impl Default for ScriptedEngine {
        fn default() -> Self {
            Self::new()
        }
    }


    fn execute(
        ctx: &EvalContext,
        statement: &str,
        callbacks: Option<&AsyncCallbacks>,
    ) -> Result<Flow, ScriptError> {
        if statement == "return" {
            return Ok(Flow::Return(ScriptValue::Undefined));
        }
        if let Some(expr) = statement.strip_prefix("return ") {
            return Ok(Flow::Return(evaluate(ctx, expr)?));
        }
        if let Some(thrown) = statement.strip_prefix("throw ") {
            return Err(throw(ctx, thrown.trim())?);
        }
        if let Some(args) = call_args(statement, "panic") {
            panic!("{}", parse_string(args).unwrap_or_else(|| args.to_string()));
        }
        if let Some(args) = call_args(statement, "setTimeout") {
            let (target, delay) = args
                .split_once(',')
                .ok_or_else(|| ScriptError::new("setTimeout expects two arguments"))?;
            let delay: u64 = delay
                .trim()
                .parse()
                .map_err(|_| ScriptError::new(format!("invalid delay '{}'", delay.trim())))?;
            let signal = lookup_callback(callbacks, target.trim())?;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                signal.fire();
            });
            return Ok(Flow::Continue);
        }
        if let Some(rest) = statement.strip_prefix("globalThis.") {
            if let Some((name, expr)) = rest.split_once('=') {
                if !expr.starts_with('=') {
                    ctx.set_global(name.trim(), evaluate(ctx, expr)?);
                    return Ok(Flow::Continue);
                }
            }
        }
        if let Some(callee) = statement.strip_suffix("()") {
            lookup_callback(callbacks, callee.trim())?.fire();
            return Ok(Flow::Continue);
        }

        evaluate(ctx, statement).map(|_| Flow::Continue)
    }

    fn lookup_callback(
        callbacks: Option<&AsyncCallbacks>,
        name: &str,
    ) -> Result<CompletionSignal, ScriptError> {
        callbacks
            .and_then(|cb| cb.signal(name))
            .cloned()
            .ok_or_else(|| ScriptError::new(format!("{} is not defined", name)))
    }

    fn throw(ctx: &EvalContext, thrown: &str) -> Result<ScriptError, ScriptError> {
        if let Some(ctor) = thrown.strip_prefix("new ") {
            if let Some((_, args)) = ctor.split_once('(') {
                let args = args.trim_end_matches(')').trim();
                return Ok(match parse_string(args) {
                    Some(message) => ScriptError::new(message),
                    None => ScriptError::new(""),
                });
            }
        }
        // Thrown primitives carry no message
        evaluate(ctx, thrown)?;
        Ok(ScriptError::without_message())
    }

    fn evaluate(ctx: &EvalContext, expr: &str) -> Result<ScriptValue, ScriptError> {
        let expr = expr.trim();
        if let Some((left, right)) = expr.split_once("===") {
            let left = evaluate(ctx, left)?;
            let right = evaluate(ctx, right)?;
            return Ok(ScriptValue::Bool(left == right));
        }
        if let Some(name) = expr.strip_prefix("globalThis.") {
            return Ok(ctx.global(name.trim()).unwrap_or(ScriptValue::Undefined));
        }
        if let Some(s) = parse_string(expr) {
            return Ok(ScriptValue::String(s));
        }

        match expr {
            "true" => Ok(ScriptValue::Bool(true)),
            "false" => Ok(ScriptValue::Bool(false)),
            "null" => Ok(ScriptValue::Null),
            "undefined" => Ok(ScriptValue::Undefined),
            "{}" | "[]" => Ok(ScriptValue::Object),
            _ => expr
                .parse::<f64>()
                .map(ScriptValue::Number)
                .map_err(|_| ScriptError::new(format!("Unexpected token: {}", expr))),
        }
    }

    fn call_args<'a>(statement: &'a str, callee: &str) -> Option<&'a str> {
        statement
            .strip_prefix(callee)?
            .trim_start()
            .strip_prefix('(')?
            .strip_suffix(')')
            .map(str::trim)
    }

    fn parse_string(literal: &str) -> Option<String> {
        let literal = literal.trim();
        ['\'', '"'].iter().find_map(|quote| {
            literal
                .strip_prefix(*quote)
                .and_then(|rest| rest.strip_suffix(*quote))
                .map(str::to_string)
        })
    }

    #[async_trait]
    impl ScriptEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn eval_sync(
            &self,
            ctx: &EvalContext,
            source: &str,
        ) -> Result<ScriptValue, ScriptError> {
            self.record(source);
            self.run_body(ctx, source, None)
        }

        async fn eval_async(
            &self,
            ctx: &EvalContext,
            source: &str,
            callbacks: AsyncCallbacks,
        ) -> Result<(), ScriptError> {
            self.record(source);
            self.run_body(ctx, source, Some(&callbacks)).map(|_| ())
        }

        fn deadline_script(&self, fail_callback: &str, deadline: Duration) -> Option<String> {
            self.supports_timers
                .then(|| format!("setTimeout({}, {})", fail_callback, deadline.as_millis()))
        }
    }
}
