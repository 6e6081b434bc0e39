//! Shared helpers for the integration tests.

use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness. Set `RUST_LOG=warn`
/// to see retry and timeout events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Error raised by the flaky operations in these tests.
#[allow(dead_code)]
#[derive(Debug, thiserror::Error)]
#[error("transient failure #{0}")]
pub struct Transient(pub u32);
