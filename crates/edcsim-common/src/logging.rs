//! Structured logging setup, shared by every binary in the workspace.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; falls back to `default_level` when unset. Per-event
/// detail that would be noisy at the default level should be logged at
/// `debug`/`trace` so it is available on demand without changing the default.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
