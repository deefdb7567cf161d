//! Cached status snapshotting for [`Service::get_status`](crate::Service::get_status).

use std::time::{Duration, Instant};

/// An immutable point-in-time view of the scheduler's internal queues and
/// long-running tasks.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Depth of the main admission queue at the time this snapshot was taken.
    pub main_queue_depth: usize,
    /// Number of worker slots currently occupied.
    pub active_workers: usize,
    /// Depth of each of the `delay_queue_count` delay queues, by index.
    pub delay_queue_depths: Vec<usize>,
    /// Whether the dispatcher task is still running.
    pub dispatcher_alive: bool,
    /// The instant this snapshot was generated.
    pub generated_at: Instant,
}

impl StatusSnapshot {
    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.generated_at)
    }
}
