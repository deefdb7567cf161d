//! One of the `D` independent delay queues: a min-heap of entries waiting
//! for their scheduled `not_before` instant, each drained by its own task.

use crate::dispatcher::DispatchMsg;
use crate::entry::{CompletionState, Entry};
use retrysched_core::{
    Clock, DelayQueueDecider, DelayQueueDecision, DelayQueueDecisionInput, EventListeners,
    SchedulerEvent,
};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{mpsc, Notify};

#[cfg(feature = "tracing")]
use tracing::debug;

struct HeapItem<I, O, E>(Entry<I, O, E>);

impl<I, O, E> PartialEq for HeapItem<I, O, E> {
    fn eq(&self, other: &Self) -> bool {
        self.0.not_before == other.0.not_before
    }
}
impl<I, O, E> Eq for HeapItem<I, O, E> {}
impl<I, O, E> PartialOrd for HeapItem<I, O, E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<I, O, E> Ord for HeapItem<I, O, E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.not_before.cmp(&other.0.not_before)
    }
}

/// A single time-ordered queue of waiting entries, keyed by `not_before`.
pub(crate) struct DelayQueue<I, O, E> {
    heap: Mutex<BinaryHeap<std::cmp::Reverse<HeapItem<I, O, E>>>>,
    notify: Notify,
    shutting_down: AtomicBool,
}

impl<I, O, E> DelayQueue<I, O, E> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Inserts `entry`, waking the drainer if it is now the earliest.
    pub fn push(&self, entry: Entry<I, O, E>) {
        let mut heap = self.heap.lock().unwrap();
        let is_new_head = match heap.peek() {
            Some(std::cmp::Reverse(head)) => entry.not_before < head.0.not_before,
            None => true,
        };
        heap.push(std::cmp::Reverse(HeapItem(entry)));
        drop(heap);
        if is_new_head {
            self.notify.notify_one();
        }
    }

    pub fn depth(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, AtomicOrdering::SeqCst);
        self.notify.notify_one();
    }
}

impl<I, O, E> Default for DelayQueue<I, O, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains `queue` for its entire lifetime: peeks the earliest entry,
/// consults the delay-queue decision SPI, and either sleeps, promotes the
/// entry to the main queue, or drops it (terminating it directly).
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_drainer<I, O, E>(
    queue_index: usize,
    queue: Arc<DelayQueue<I, O, E>>,
    decider: Arc<dyn DelayQueueDecider>,
    clock: Arc<dyn Clock>,
    listeners: Arc<EventListeners<O, E>>,
    promote_tx: mpsc::UnboundedSender<DispatchMsg<I, O, E>>,
    live_count: Arc<AtomicUsize>,
    main_queue_count: Arc<AtomicUsize>,
) where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    loop {
        let head = {
            let heap = queue.heap.lock().unwrap();
            heap.peek()
                .map(|std::cmp::Reverse(item)| (item.0.id, item.0.not_before, item.0.is_cancellation_requested()))
        };

        let Some((request_id, not_before, cancellation_requested)) = head else {
            if queue.shutting_down.load(AtomicOrdering::SeqCst) {
                return;
            }
            queue.notify.notified().await;
            continue;
        };

        let now = clock.now();
        let remaining_delay = not_before.saturating_duration_since(now);
        let shutting_down = queue.shutting_down.load(AtomicOrdering::SeqCst);

        #[cfg(feature = "tracing")]
        debug!(queue_index, ?remaining_delay, "delay queue evaluating head");

        listeners.emit(&SchedulerEvent::DelayQueueItemBeforeDelayStep {
            request_id,
            queue_index,
            remaining_delay,
            timestamp: Instant::now(),
        });

        let decision = decider.decide(&DelayQueueDecisionInput {
            remaining_delay,
            cancellation_requested,
            shutting_down,
        });

        listeners.emit(&SchedulerEvent::DelayQueueDecisionAfterDelayStep {
            request_id,
            queue_index,
            decision: decision_name(decision),
            timestamp: Instant::now(),
        });

        match decision {
            DelayQueueDecision::Promote => {
                if let Some(entry) = pop_head(&queue) {
                    main_queue_count.fetch_add(1, AtomicOrdering::AcqRel);
                    let _ = promote_tx.send(DispatchMsg::Promote(entry));
                }
            }
            DelayQueueDecision::Drop => {
                if let Some(mut entry) = pop_head(&queue) {
                    let state = if entry.is_cancellation_requested() {
                        CompletionState::Cancelled
                    } else {
                        CompletionState::TimedOut
                    };
                    let remaining_validity = entry.remaining_validity(clock.now());
                    let request_id = entry.id;
                    entry.complete(
                        state,
                        Err(match state {
                            CompletionState::Cancelled => retrysched_core::WaitError::Cancelled,
                            _ => retrysched_core::WaitError::RequestTimedOut,
                        }),
                    );
                    if state == CompletionState::TimedOut {
                        listeners.emit(&SchedulerEvent::RequestFinalTimeout {
                            request_id,
                            remaining_validity,
                            timestamp: Instant::now(),
                        });
                    }
                    live_count.fetch_sub(1, AtomicOrdering::AcqRel);
                    listeners.emit(&SchedulerEvent::RequestRemoved {
                        request_id,
                        timestamp: Instant::now(),
                    });
                }
            }
            DelayQueueDecision::SleepFully => {
                tokio::select! {
                    _ = tokio::time::sleep(remaining_delay) => {}
                    _ = queue.notify.notified() => {}
                }
            }
            DelayQueueDecision::SleepStep(step) => {
                tokio::select! {
                    _ = tokio::time::sleep(step.min(remaining_delay)) => {}
                    _ = queue.notify.notified() => {}
                }
            }
        }
    }
}

fn pop_head<I, O, E>(queue: &DelayQueue<I, O, E>) -> Option<Entry<I, O, E>> {
    queue
        .heap
        .lock()
        .unwrap()
        .pop()
        .map(|std::cmp::Reverse(item)| item.0)
}

fn decision_name(decision: DelayQueueDecision) -> &'static str {
    match decision {
        DelayQueueDecision::SleepFully => "sleep_fully",
        DelayQueueDecision::SleepStep(_) => "sleep_step",
        DelayQueueDecision::Promote => "promote",
        DelayQueueDecision::Drop => "drop",
    }
}
