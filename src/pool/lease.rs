// src/pool/lease.rs
//! Scoped lease on one unit of a worker's capacity
//!
//! A lease owns exactly one increment of its worker's in-use counter.
//! Release happens at most once, either explicitly or on drop, and wakes
//! admission waiters so a freed slot is visible without polling.

use crate::pool::round_robin::PoolShared;
use crate::pool::worker::Worker;
use std::sync::Arc;
use tracing::debug;

/// RAII claim on one run slot of a pooled worker
///
/// Created only by [`RoundRobinPool::acquire`](crate::pool::RoundRobinPool::acquire).
/// Dropping the lease releases the slot on every exit path, including
/// cancellation and panics in the holding task.
#[derive(Debug)]
pub struct RunLease {
    shared: Arc<PoolShared>,
    worker: Arc<Worker>,
    index: usize,
    released: bool,
}

impl RunLease {
    pub(crate) fn new(shared: Arc<PoolShared>, worker: Arc<Worker>, index: usize) -> Self {
        Self {
            shared,
            worker,
            index,
            released: false,
        }
    }

    /// The worker this lease is bound to
    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    /// Release the slot early; calling this more than once is a no-op
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        {
            let mut state = self.shared.state.lock();
            let entry = &mut state.entries[self.index];
            entry.in_use = entry.in_use.saturating_sub(1);
        }

        debug!(worker = %self.worker.url, "lease released");
        self.shared.slot_freed.notify_waiters();
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::round_robin::RoundRobinPool;
    use crate::pool::worker::Worker;
    use tokio_util::sync::CancellationToken;

    fn pool_with_one(capacity: u32) -> RoundRobinPool {
        let pool = RoundRobinPool::new();
        pool.add(Worker {
            url: "http://w1:8080".parse().unwrap(),
            max_concurrent_runs: capacity,
            max_total_runs: None,
        });
        pool
    }

    #[tokio::test]
    async fn test_drop_releases_slot() {
        let pool = pool_with_one(1);
        let cancel = CancellationToken::new();

        let lease = pool.acquire(&cancel).await.unwrap();
        assert_eq!(pool.stats().in_use, 1);
        drop(lease);
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_double_release_is_idempotent() {
        let pool = pool_with_one(2);
        let cancel = CancellationToken::new();

        let other = pool.acquire(&cancel).await.unwrap();
        let mut lease = pool.acquire(&cancel).await.unwrap();
        lease.release();
        lease.release();
        drop(lease);

        // Only one decrement happened; the other lease is still counted.
        assert_eq!(pool.stats().in_use, 1);
        drop(other);
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_lease_exposes_its_worker() {
        let pool = pool_with_one(1);
        let cancel = CancellationToken::new();
        let lease = pool.acquire(&cancel).await.unwrap();
        assert_eq!(lease.worker().url.host().unwrap(), "w1");
    }
}
