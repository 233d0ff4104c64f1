// src/pool/mod.rs
//! Worker pool and admission control
//!
//! This module provides the dispatch host's resource layer:
//!
//! - **Round-Robin Pool**: registered workers, circular selection,
//!   suspending admission when every worker is saturated
//! - **Run Lease**: scoped claim on one unit of a worker's capacity,
//!   released exactly once on every exit path
//! - **Worker**: the registered executor record and its downstream call
//!
//! All mutable pool state (worker list, in-use counters, cursor) lives
//! behind one lock so acquire and release remain compound-atomic.

pub mod lease;
pub mod round_robin;
pub mod worker;

// Re-export commonly used types
pub use lease::RunLease;
pub use round_robin::{PoolStats, RoundRobinPool};
pub use worker::{http_client, HttpClient, RunRequest, Worker};
