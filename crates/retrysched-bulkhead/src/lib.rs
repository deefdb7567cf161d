//! Bounded worker pool: the semaphore-gated slot that bulkheads the
//! dispatcher's concurrency at `N` simultaneous attempts.
//!
//! Slot acquisition is cancellable, racing the wait against a
//! [`CancellationToken`] so shutdown and per-entry cancellation are noticed
//! promptly rather than leaving a waiter parked until a slot frees up.

mod error;

pub use error::SlotError;

use retrysched_core::CancellationToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[cfg(feature = "tracing")]
use tracing::debug;

/// A fixed-size pool of worker slots.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool with `size` slots.
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// The total number of slots in the pool.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The number of slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquires a slot, waiting indefinitely unless cancelled.
    ///
    /// Returns [`SlotError::Cancelled`] if `cancel` fires first, or
    /// [`SlotError::ShutDown`] if the pool's semaphore has been closed via
    /// [`Self::shutdown`].
    pub async fn acquire_slot(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, SlotError> {
        tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| SlotError::ShutDown)
            }
            _ = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                debug!("worker slot acquisition cancelled");
                Err(SlotError::Cancelled)
            }
        }
    }

    /// As [`Self::acquire_slot`], but gives up after `max_wait` with
    /// [`SlotError::Timeout`].
    pub async fn acquire_slot_timeout(
        &self,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, SlotError> {
        tokio::select! {
            result = self.acquire_slot(cancel) => result,
            _ = tokio::time::sleep(max_wait) => Err(SlotError::Timeout),
        }
    }

    /// Closes the semaphore: every pending and future acquisition fails with
    /// [`SlotError::ShutDown`].
    pub fn shutdown(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_slot_succeeds_up_to_pool_size() {
        let pool = WorkerPool::new(2);
        let cancel = CancellationToken::new();
        let a = pool.acquire_slot(&cancel).await.unwrap();
        let b = pool.acquire_slot(&cancel).await.unwrap();
        assert_eq!(pool.available(), 0);
        drop(a);
        assert_eq!(pool.available(), 1);
        drop(b);
    }

    #[tokio::test]
    async fn acquire_slot_timeout_gives_up_when_pool_is_saturated() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();
        let _permit = pool.acquire_slot(&cancel).await.unwrap();

        let result = pool
            .acquire_slot_timeout(Duration::from_millis(20), &cancel)
            .await;
        assert!(matches!(result, Err(SlotError::Timeout)));
    }

    #[tokio::test]
    async fn acquire_slot_is_cancelled_promptly() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();
        let _permit = pool.acquire_slot(&cancel).await.unwrap();

        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel2.cancel();
        });

        let result = pool.acquire_slot(&cancel).await;
        assert!(matches!(result, Err(SlotError::Cancelled)));
    }

    #[tokio::test]
    async fn shutdown_rejects_pending_and_future_acquisitions() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();
        pool.shutdown();
        let result = pool.acquire_slot(&cancel).await;
        assert!(matches!(result, Err(SlotError::ShutDown)));
    }
}
