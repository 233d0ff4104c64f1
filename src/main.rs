// src/main.rs
//! Runhub Dispatch Host
//!
//! Accepts worker registrations, round-robins code-execution requests
//! across the registered fleet, and relays each run's output stream back
//! to the caller.

use anyhow::Result;
use runhub::notifier::spawn_count_notifier;
use runhub::observability::init_tracing;
use runhub::pool::RoundRobinPool;
use runhub::server::HostServer;
use runhub::utils::config::HostConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting Runhub dispatch host v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = HostConfig::load()?;
    info!("Configuration loaded: {:?}", config);

    // Create the worker pool and the count-changed subscriber
    let pool = RoundRobinPool::new();
    spawn_count_notifier(pool.subscribe());

    // Graceful shutdown handler
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cleaning up...");
            signal_token.cancel();
        }
    });

    // Run the HTTP server until shutdown
    let server = HostServer::new(config, pool, shutdown);
    match server.run().await {
        Ok(()) => {
            info!("Server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e.into())
        }
    }
}
