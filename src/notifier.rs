// src/notifier.rs
//! Worker-count change fan-out
//!
//! The pool publishes its worker count on a watch channel whenever a
//! registration lands; this background task is the dashboard-facing
//! subscriber, reporting every change on the log stream. It owns its own
//! lifecycle and never blocks the pool.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn the count-changed subscriber
///
/// The task ends when the pool (the channel sender) is dropped.
pub fn spawn_count_notifier(mut count_rx: watch::Receiver<usize>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if count_rx.changed().await.is_err() {
                debug!("pool dropped, stopping count notifier");
                break;
            }
            let count = *count_rx.borrow_and_update();
            info!(count, "registered worker count changed");
        }
    })
}
