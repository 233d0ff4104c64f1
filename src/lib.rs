// src/lib.rs
//! Runhub Dispatch Host Library
//!
//! This library provides the core components for dispatching short-lived
//! code-execution requests across a fleet of stateless executor workers.
//!
//! # Architecture
//!
//! The host is structured into several key modules:
//!
//! - **pool**: Round-robin worker pool, admission control, scoped leases
//! - **relay**: SSE framing and typed stream events
//! - **server**: HTTP surface (registration, dispatch, status page)
//! - **notifier**: Worker-count change fan-out
//! - **observability**: Tracing setup
//! - **utils**: Configuration and error types

// Public module exports
pub mod notifier;
pub mod observability;
pub mod pool;
pub mod relay;
pub mod server;
pub mod utils;

// Re-export commonly used types
pub use pool::{RoundRobinPool, RunLease, RunRequest, Worker};
pub use relay::{EndEvent, SseDecoder, StreamEvent};
pub use server::HostServer;
pub use utils::config::HostConfig;
pub use utils::errors::{HostError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
