// Panic isolation for engine evaluations
use tokio::task::JoinError;
use tracing::error;

/// Describe a failed evaluation task as an outcome message
///
/// An engine panic must never abort the run: the probe is still accounted for.
pub(crate) fn join_error_message(join_err: JoinError) -> String {
    if !join_err.is_panic() {
        error!("Probe evaluation cancelled: {:?}", join_err);
        return "Engine evaluation cancelled".to_string();
    }

    let panic_info = join_err.into_panic();
    let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    };

    error!(panic_msg = %panic_msg, "Probe evaluation panicked");
    format!("Engine panicked: {}", panic_msg)
}
