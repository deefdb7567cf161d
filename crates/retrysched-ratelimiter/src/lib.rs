//! Ticket bucket: the cancellable, blocking acquisition primitive that gates
//! every attempt.
//!
//! A background replenisher task adds tokens on a fixed schedule up to a
//! configured burst ceiling; callers race acquisition against a
//! [`CancellationToken`] rather than relying on thread interruption.

use retrysched_core::CancellationToken;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Outcome of a [`TicketBucket::acquire`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A ticket was obtained.
    Acquired,
    /// No ticket became available within `max_wait`.
    WouldBlock,
    /// The cancellation token fired before a ticket became available.
    Cancelled,
}

struct Inner {
    tokens: AtomicU32,
    burst: u32,
    notify: Notify,
}

/// A token-bucket rate limiter with atomic bookkeeping and a background
/// replenisher.
///
/// Cloning shares the same bucket and replenisher handle; dropping every
/// clone (and the handle returned by [`TicketBucket::spawn_replenisher`])
/// stops replenishment.
#[derive(Clone)]
pub struct TicketBucket {
    inner: Arc<Inner>,
}

impl TicketBucket {
    /// Creates a bucket starting at full burst capacity.
    pub fn new(burst: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens: AtomicU32::new(burst),
                burst,
                notify: Notify::new(),
            }),
        }
    }

    /// Spawns the background task that adds `count` tokens (capped at
    /// `burst`) every `interval`, until the returned `JoinHandle` is
    /// dropped/aborted or the runtime shuts down.
    pub fn spawn_replenisher(&self, count: u32, interval: Duration) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let mut current = inner.tokens.load(Ordering::Acquire);
                loop {
                    let next = current.saturating_add(count).min(inner.burst);
                    if next == current {
                        break;
                    }
                    match inner.tokens.compare_exchange_weak(
                        current,
                        next,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            inner.notify.notify_waiters();
                            break;
                        }
                        Err(actual) => current = actual,
                    }
                }
            }
        })
    }

    /// Attempts a non-blocking acquisition.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.inner.tokens.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.inner.tokens.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Acquires a ticket, waiting up to `max_wait` and racing against
    /// `cancel`. `max_wait <= Duration::ZERO` behaves as a non-blocking
    /// try-acquire.
    pub async fn acquire(&self, max_wait: Duration, cancel: &CancellationToken) -> AcquireOutcome {
        if self.try_acquire() {
            return AcquireOutcome::Acquired;
        }
        if max_wait.is_zero() {
            return AcquireOutcome::WouldBlock;
        }
        if cancel.is_cancelled() {
            return AcquireOutcome::Cancelled;
        }

        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let notified = self.inner.notify.notified();
            tokio::select! {
                _ = notified => {
                    if self.try_acquire() {
                        return AcquireOutcome::Acquired;
                    }
                }
                _ = cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    debug!("ticket acquisition cancelled");
                    return AcquireOutcome::Cancelled;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return AcquireOutcome::WouldBlock;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return AcquireOutcome::WouldBlock;
            }
        }
    }
}
