// src/observability.rs
//! Tracing initialization
//!
//! Log filtering follows `RUST_LOG`, defaulting to `info` for the host
//! and its dependencies.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    Ok(())
}
