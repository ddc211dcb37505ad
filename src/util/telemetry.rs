//! Telemetry helpers for structured logging.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the orchestrating process. Users can install their
/// own subscriber; this helper installs an env-filtered fmt subscriber
/// (`RUST_LOG`, defaulting to `info`) if none is set.
///
/// Per-item log scopes layer on top of whatever is installed here and restore
/// it when they close.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
