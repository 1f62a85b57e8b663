//! Tracing subscriber initialization.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, filtered by `RUST_LOG`.
///
/// Safe to call repeatedly; only the first call installs anything, so
/// every integration test can call it without coordination.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

/// JSON-formatted variant for environments that ship logs.
pub fn init_json() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();
}
