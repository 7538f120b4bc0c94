//! Tracing subscriber setup for applications embedding the agent.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber honoring `RUST_LOG`, falling back to
/// the given directive. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
