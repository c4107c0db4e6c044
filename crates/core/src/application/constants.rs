// Harness constants (no magic values)

/// Async probe deadline: a probe that never signals resolves to `Fail` after 5s
pub const DEFAULT_ASYNC_DEADLINE_MS: u64 = 5000;

/// Flush gate fallback polling interval (100ms)
pub const DEFAULT_FLUSH_POLL_INTERVAL_MS: u64 = 100;

/// Max runtime of a synchronous probe before it is reported as an error (60s)
pub const DEFAULT_SYNC_MAX_RUNTIME_MS: u64 = 60_000;

/// Callback injected into async probes to report success
pub const DEFAULT_PASS_CALLBACK: &str = "asyncTestPassed";

/// Callback injected into async probes to report failure
pub const DEFAULT_FAIL_CALLBACK: &str = "asyncTestFailed";

/// Version string written to the report when none is known
pub const DEFAULT_REPORTED_VERSION: &str = "UNKNOWN";

/// Probe-name patterns that are forced to `Fail` without being executed
/// - regexp engine defect with incomplete patterns/quantifiers
/// - exception defect in `__defineGetter__`/`__defineSetter__` ToObject probes
pub const DEFAULT_DENYLIST: &[&str] = &[
    "incomplete patterns and quantifiers",
    "__define[GS]etter__.+ToObject",
];

/// Outcome message when a thrown value carries no message (e.g. `throw null`)
pub const NO_MESSAGE_PLACEHOLDER: &str = "Unknown error";

/// Outcome message when a synchronous probe exceeds its max runtime
pub const MAX_RUNTIME_EXCEEDED_MESSAGE: &str = "Max timeout exceeded";

