// src/pool/round_robin.rs
//! Round-robin worker pool with suspending admission control
//!
//! The pool owns the registered workers, their in-use counters and the
//! round-robin cursor behind a single mutex; acquire and release are
//! atomic with respect to that lock, which is held only for bookkeeping
//! and never across I/O.
//!
//! # Architecture
//!
//! ```text
//! RoundRobinPool
//! ├─ entries: [W1(2/2), W2(0/4), W3(1/1)]   (in_use / capacity)
//! ├─ cursor: 1                              (next scan start)
//! ├─ slot_freed: Notify                     (wakes admission waiters)
//! └─ count_tx: watch<usize>                 (count-changed fan-out)
//! ```
//!
//! Acquire scans circularly from the cursor, skips saturated workers and
//! suspends (cooperatively, no spinning) when every worker is saturated.
//! Waiters are woken on every release and every registration.

use crate::pool::lease::RunLease;
use crate::pool::worker::Worker;
use crate::utils::errors::{HostError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One registered worker plus its live admission counter
#[derive(Debug)]
pub(crate) struct PoolEntry {
    pub(crate) worker: Arc<Worker>,
    pub(crate) in_use: u32,
}

/// Mutable pool aggregate, guarded as a whole
#[derive(Debug, Default)]
pub(crate) struct PoolState {
    pub(crate) entries: Vec<PoolEntry>,
    pub(crate) cursor: usize,
}

/// State shared between the pool and outstanding leases
#[derive(Debug, Default)]
pub(crate) struct PoolShared {
    pub(crate) state: Mutex<PoolState>,
    pub(crate) slot_freed: Notify,
}

/// Round-robin worker pool
///
/// Insertion order defines the rotation order; workers are never removed
/// during the process lifetime. Re-registering the same address creates a
/// second independent entry.
#[derive(Debug)]
pub struct RoundRobinPool {
    shared: Arc<PoolShared>,
    count_tx: watch::Sender<usize>,
}

/// Point-in-time pool statistics for the status page
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Number of registered workers
    pub workers: usize,

    /// Leases currently outstanding across all workers
    pub in_use: u32,

    /// Workers with no spare capacity right now
    pub saturated: usize,
}

impl RoundRobinPool {
    /// Create an empty pool
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(PoolShared::default()),
            count_tx,
        }
    }

    /// Append a worker to the rotation and publish the new count
    pub fn add(&self, worker: Worker) {
        let count = {
            let mut state = self.shared.state.lock();
            state.entries.push(PoolEntry {
                worker: Arc::new(worker),
                in_use: 0,
            });
            state.entries.len()
        };

        debug!(count, "worker added to pool");
        self.count_tx.send_replace(count);
        // A new worker may satisfy blocked admissions.
        self.shared.slot_freed.notify_waiters();
    }

    /// Number of registered workers
    pub fn count(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Subscribe to count-changed notifications
    ///
    /// The receiver observes the latest count; subscribers own their own
    /// lifecycle and never block the pool.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        let in_use = state.entries.iter().map(|e| e.in_use).sum();
        let saturated = state
            .entries
            .iter()
            .filter(|e| e.worker.max_concurrent_runs != 0 && e.in_use >= e.worker.max_concurrent_runs)
            .count();
        PoolStats {
            workers: state.entries.len(),
            in_use,
            saturated,
        }
    }

    /// Acquire a lease on the next eligible worker, suspending while all
    /// workers are saturated
    ///
    /// Fails immediately with [`HostError::NoWorkers`] on an empty pool
    /// and with [`HostError::AdmissionCancelled`] when `cancel` fires
    /// first; a cancelled acquire leaves the pool untouched.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<RunLease> {
        loop {
            let notified = self.shared.slot_freed.notified();
            tokio::pin!(notified);
            // Register interest before re-checking so a release between
            // the check and the await cannot be missed.
            notified.as_mut().enable();

            if let Some(lease) = self.try_acquire()? {
                return Ok(lease);
            }

            tokio::select! {
                () = &mut notified => {}
                () = cancel.cancelled() => return Err(HostError::AdmissionCancelled),
            }
        }
    }

    /// [`acquire`](Self::acquire) bounded by a deadline, mapping expiry to
    /// [`HostError::AdmissionTimeout`]
    pub async fn acquire_timeout(
        &self,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<RunLease> {
        match tokio::time::timeout(deadline, self.acquire(cancel)).await {
            Ok(result) => result,
            Err(_) => Err(HostError::AdmissionTimeout),
        }
    }

    /// One synchronized scan: claim a slot and advance the cursor, or
    /// report that every worker is saturated
    fn try_acquire(&self) -> Result<Option<RunLease>> {
        let mut state = self.shared.state.lock();
        if state.entries.is_empty() {
            return Err(HostError::NoWorkers);
        }

        let len = state.entries.len();
        let cursor = state.cursor;
        for step in 0..len {
            let idx = (cursor + step) % len;
            let entry = &mut state.entries[idx];
            let capacity = entry.worker.max_concurrent_runs;
            if capacity == 0 || entry.in_use < capacity {
                entry.in_use += 1;
                let worker = Arc::clone(&entry.worker);
                state.cursor = (idx + 1) % len;
                debug!(worker = %worker.url, in_use = state.entries[idx].in_use, "lease acquired");
                return Ok(Some(RunLease::new(Arc::clone(&self.shared), worker, idx)));
            }
        }

        Ok(None)
    }
}

impl Default for RoundRobinPool {
    fn default() -> Self {
        Self::new()
    }
}
