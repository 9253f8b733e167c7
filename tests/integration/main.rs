//! Cross-layer integration tests for Trellis
//!
//! Tests that verify correct interaction between multiple crates.

mod concurrency;
mod lifecycle;
mod reconciliation;
mod rollback;

/// Installs a log subscriber for the test binary, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
