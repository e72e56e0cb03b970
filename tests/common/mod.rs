// Shared helpers for integration tests.
#![allow(dead_code)]

use tracing_subscriber::EnvFilter;

/// Routes store logs to the test writer; set RUST_LOG to see them.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}
