//! The single task that owns the main queue: a strict FIFO pipeline that
//! consults the main-queue decision SPI, acquires a worker slot and a
//! rate-limiter ticket, and submits the attempt, re-consulting the decision
//! after each acquisition per the scheduler's dispatch protocol.
//!
//! Attempt execution itself does not block the dispatcher: each accepted
//! attempt is handed to a supervisor task that reports its outcome back
//! over the same channel as a [`DispatchMsg::Outcome`].

use crate::delay_queue::DelayQueue;
use crate::entry::{CompletionState, Entry};
use retrysched_bulkhead::{SlotError, WorkerPool};
use retrysched_core::{
    AfterAttemptDecider, AfterAttemptDecision, AfterAttemptInput, CancellationToken, Clock,
    EventListeners, MainQueueDecider, MainQueueDecision, MainQueueDecisionInput, SchedulerEvent,
    WaitError,
};
use retrysched_executor::{AttemptError, AttemptRunner, Executor, SubmitOutcome};
use retrysched_ratelimiter::{AcquireOutcome, TicketBucket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[cfg(feature = "tracing")]
use tracing::debug;

/// The attempt function signature: given the request's input and the
/// 1-based attempt number, returns a future resolving to the attempt's
/// outcome.
pub(crate) type AttemptFn<I, O, E> =
    Arc<dyn Fn(Arc<I>, u32) -> futures::future::BoxFuture<'static, Result<O, E>> + Send + Sync>;

/// Messages flowing through the dispatcher's single channel: new
/// submissions, entries promoted out of a delay queue, and attempt
/// outcomes reported back by supervisor tasks.
pub(crate) enum DispatchMsg<I, O, E> {
    Submit(Entry<I, O, E>),
    Promote(Entry<I, O, E>),
    Outcome {
        entry: Entry<I, O, E>,
        attempt_started: Instant,
        result: Result<O, AttemptError<E>>,
    },
}

pub(crate) struct Dispatcher<I, O, E, Ex> {
    pub self_tx: mpsc::UnboundedSender<DispatchMsg<I, O, E>>,
    pub rx: mpsc::UnboundedReceiver<DispatchMsg<I, O, E>>,
    pub pool: WorkerPool,
    pub tickets: TicketBucket,
    pub executor: AttemptRunner<Ex>,
    pub main_decider: Arc<dyn MainQueueDecider>,
    pub after_decider: Arc<dyn AfterAttemptDecider<E>>,
    pub delay_queues: Vec<Arc<DelayQueue<I, O, E>>>,
    pub clock: Arc<dyn Clock>,
    pub listeners: Arc<EventListeners<O, E>>,
    pub attempt_fn: AttemptFn<I, O, E>,
    pub grace: Duration,
    pub shutdown: CancellationToken,
    pub live_count: Arc<AtomicUsize>,
    /// Entries currently owned by the main queue (dispatched or mid-pipeline),
    /// disjoint from entries parked in a delay queue.
    pub main_queue_count: Arc<AtomicUsize>,
}

impl<I, O, E, Ex> Dispatcher<I, O, E, Ex>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    Ex: Executor,
{
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                DispatchMsg::Submit(entry) | DispatchMsg::Promote(entry) => {
                    self.process_entry(entry).await;
                }
                DispatchMsg::Outcome {
                    entry,
                    attempt_started,
                    result,
                } => {
                    self.handle_outcome(entry, attempt_started, result);
                }
            }
        }
    }

    /// Runs one entry through the main-queue protocol: decide, acquire a
    /// slot, re-decide, acquire a ticket, re-decide, submit. Cancellation is
    /// checked at each of these three decision points, per the scheduler's
    /// contract that a cancellation request takes effect at the next one.
    async fn process_entry(&self, entry: Entry<I, O, E>) {
        let Some(entry) = self.terminate_if_cancelled(entry) else {
            return;
        };
        let now = self.clock.now();
        let decision = self.consult_main(&entry, false, false, now);
        let Some(entry) = self.apply_non_process_decision(entry, decision) else {
            return;
        };

        let slot_wait_start = Instant::now();
        let remaining = entry.remaining_validity(self.clock.now());
        let slot = self.pool.acquire_slot_timeout(remaining, &entry.cancel).await;
        self.listeners.emit(&SchedulerEvent::MainQueueThreadObtained {
            request_id: entry.id,
            time_taken: slot_wait_start.elapsed(),
            timestamp: Instant::now(),
        });
        let permit = match slot {
            Ok(permit) => permit,
            Err(err) => {
                self.terminate_for_acquire_failure(entry, into_acquire_failure(err));
                return;
            }
        };

        let Some(entry) = self.terminate_if_cancelled(entry) else {
            drop(permit);
            return;
        };
        let now = self.clock.now();
        let decision = self.consult_main(&entry, true, false, now);
        if !matches!(decision, MainQueueDecision::ProcessNow) {
            drop(permit);
            self.apply_non_process_decision(entry, decision);
            return;
        }

        let ticket_wait_start = Instant::now();
        let remaining = entry.remaining_validity(self.clock.now());
        let ticket_outcome = tokio::select! {
            outcome = self.tickets.acquire(remaining, &entry.cancel) => outcome,
            _ = self.shutdown.cancelled() => AcquireOutcome::Cancelled,
        };
        self.listeners
            .emit(&SchedulerEvent::MainQueueTicketObtainAttempt {
                request_id: entry.id,
                obtained: ticket_outcome == AcquireOutcome::Acquired,
                time_taken: ticket_wait_start.elapsed(),
                timestamp: Instant::now(),
            });
        if ticket_outcome != AcquireOutcome::Acquired {
            drop(permit);
            self.terminate_for_acquire_failure(entry, into_ticket_failure(ticket_outcome));
            return;
        }

        let Some(entry) = self.terminate_if_cancelled(entry) else {
            drop(permit);
            return;
        };
        let now = self.clock.now();
        let decision = self.consult_main(&entry, true, true, now);
        if !matches!(decision, MainQueueDecision::ProcessNow) {
            drop(permit);
            self.apply_non_process_decision(entry, decision);
            return;
        }

        self.listeners
            .emit(&SchedulerEvent::MainQueueProcessingCompleted {
                request_id: entry.id,
                timestamp: Instant::now(),
            });

        let mut entry = entry;
        entry.attempt += 1;
        let attempt_number = entry.attempt;
        let remaining_validity = entry.remaining_validity(self.clock.now());
        self.listeners.emit(&SchedulerEvent::RequestExecuting {
            request_id: entry.id,
            attempt: attempt_number,
            remaining_validity,
            timestamp: Instant::now(),
        });

        let input = Arc::clone(&entry.input);
        let attempt_fn = Arc::clone(&self.attempt_fn);
        let future = (attempt_fn)(input, attempt_number);
        match self.executor.submit_attempt(permit, future) {
            SubmitOutcome::Rejected => {
                self.terminate_for_acquire_failure(entry, AcquireFailure::ShutDown);
            }
            SubmitOutcome::Accepted(attempt_future) => {
                let tx = self.self_tx.clone();
                let attempt_started = Instant::now();
                tokio::spawn(async move {
                    let result = attempt_future.await;
                    let _ = tx.send(DispatchMsg::Outcome {
                        entry,
                        attempt_started,
                        result,
                    });
                });
            }
        }
    }

    fn consult_main(
        &self,
        entry: &Entry<I, O, E>,
        has_thread_slot: bool,
        has_ticket: bool,
        now: Instant,
    ) -> MainQueueDecision {
        let decision = self.main_decider.decide(&MainQueueDecisionInput {
            attempt: entry.attempt,
            has_thread_slot,
            has_ticket,
            remaining_validity: entry.remaining_validity(now),
        });
        self.listeners
            .emit(&SchedulerEvent::MainQueueProcessingDecision {
                request_id: entry.id,
                decision: main_decision_name(decision),
                timestamp: Instant::now(),
            });
        decision
    }

    /// Handles a [`MainQueueDecision`]: `ProcessNow` hands `entry` back to
    /// the caller to continue the pipeline; every other decision consumes
    /// it (terminated directly, or routed to a delay queue) and this
    /// returns `None`.
    fn apply_non_process_decision(
        &self,
        mut entry: Entry<I, O, E>,
        decision: MainQueueDecision,
    ) -> Option<Entry<I, O, E>> {
        match decision {
            MainQueueDecision::ProcessNow => Some(entry),
            MainQueueDecision::DelayFor(delay) => {
                self.route_delay(entry, delay);
                None
            }
            MainQueueDecision::FinalTimeout => {
                let remaining_validity = entry.remaining_validity(self.clock.now());
                let request_id = entry.id;
                entry.complete(CompletionState::TimedOut, Err(WaitError::RequestTimedOut));
                self.listeners.emit(&SchedulerEvent::RequestFinalTimeout {
                    request_id,
                    remaining_validity,
                    timestamp: Instant::now(),
                });
                self.finish(request_id);
                None
            }
            MainQueueDecision::FinalFailure => {
                let request_id = entry.id;
                entry.complete(CompletionState::FailedTerminal, Err(WaitError::PolicyRejected));
                self.listeners.emit(&SchedulerEvent::RequestFinalFailure {
                    request_id,
                    cause: None,
                    timestamp: Instant::now(),
                });
                self.finish(request_id);
                None
            }
        }
    }

    /// Checks `entry` for a pending cancellation request and, if one exists,
    /// completes it as `Cancelled` and returns `None`. Otherwise returns
    /// `entry` unchanged. Called at each main-queue decision point so a
    /// cancellation takes effect at the next one rather than only being
    /// noticed by a blocking acquire.
    fn terminate_if_cancelled(&self, mut entry: Entry<I, O, E>) -> Option<Entry<I, O, E>> {
        if !entry.is_cancellation_requested() {
            return Some(entry);
        }
        let request_id = entry.id;
        #[cfg(feature = "tracing")]
        debug!(request_id, attempt = entry.attempt, "cancellation observed at decision point");
        entry.complete(CompletionState::Cancelled, Err(WaitError::Cancelled));
        self.finish(request_id);
        None
    }

    fn terminate_for_acquire_failure(&self, mut entry: Entry<I, O, E>, failure: AcquireFailure) {
        let request_id = entry.id;
        #[cfg(feature = "tracing")]
        debug!(request_id, attempt = entry.attempt, "acquire failed, terminating");
        match failure {
            AcquireFailure::Timeout => {
                let remaining_validity = entry.remaining_validity(self.clock.now());
                entry.complete(CompletionState::TimedOut, Err(WaitError::RequestTimedOut));
                self.listeners.emit(&SchedulerEvent::RequestFinalTimeout {
                    request_id,
                    remaining_validity,
                    timestamp: Instant::now(),
                });
            }
            AcquireFailure::Cancelled | AcquireFailure::ShutDown => {
                entry.complete(CompletionState::Cancelled, Err(WaitError::Cancelled));
            }
        }
        self.finish(request_id);
    }

    fn handle_outcome(
        &self,
        mut entry: Entry<I, O, E>,
        attempt_started: Instant,
        result: Result<O, AttemptError<E>>,
    ) {
        let request_id = entry.id;
        let duration = attempt_started.elapsed();
        match result {
            Ok(value) => {
                let value = Arc::new(value);
                self.listeners.emit(&SchedulerEvent::RequestSuccess {
                    request_id,
                    result: Arc::clone(&value),
                    attempt: entry.attempt,
                    duration,
                    timestamp: Instant::now(),
                });
                entry.complete(CompletionState::Succeeded, Ok(value));
                self.finish(request_id);
            }
            Err(AttemptError::TaskPanicked) => {
                self.listeners.emit(&SchedulerEvent::UnexpectedRuntimeError {
                    message: format!("attempt task for request {request_id} panicked"),
                    timestamp: Instant::now(),
                });
                entry.complete(CompletionState::FailedTerminal, Err(WaitError::Interrupted));
                self.finish(request_id);
            }
            Err(AttemptError::Failed(cause)) => {
                let cause_arc = Arc::new(cause.clone());
                self.listeners.emit(&SchedulerEvent::RequestAttemptFailed {
                    request_id,
                    cause: cause_arc,
                    attempt: entry.attempt,
                    duration,
                    timestamp: Instant::now(),
                });
                let remaining_validity = entry.remaining_validity(self.clock.now());
                let decision = self.after_decider.decide(&AfterAttemptInput {
                    attempt: entry.attempt,
                    cause: Some(&cause),
                    remaining_validity,
                });
                self.listeners
                    .emit(&SchedulerEvent::RequestAttemptFailedDecision {
                        request_id,
                        decision: after_decision_name(&decision),
                        timestamp: Instant::now(),
                    });
                match decision {
                    AfterAttemptDecision::Retry(delay) => {
                        entry.last_error = Some(cause);
                        self.route_delay(entry, delay);
                    }
                    AfterAttemptDecision::FinalFailure(cause) => {
                        entry.complete(
                            CompletionState::FailedTerminal,
                            Err(WaitError::AttemptFailed(cause.clone())),
                        );
                        self.listeners.emit(&SchedulerEvent::RequestFinalFailure {
                            request_id,
                            cause: Some(Arc::new(cause)),
                            timestamp: Instant::now(),
                        });
                        self.finish(request_id);
                    }
                    AfterAttemptDecision::FinalTimeout => {
                        entry.complete(CompletionState::TimedOut, Err(WaitError::RequestTimedOut));
                        self.listeners.emit(&SchedulerEvent::RequestFinalTimeout {
                            request_id,
                            remaining_validity,
                            timestamp: Instant::now(),
                        });
                        self.finish(request_id);
                    }
                }
            }
        }
    }

    /// Schedules `entry`'s next attempt after `delay`, either straight back
    /// to the main queue (when `delay` is within the grace period) or into
    /// one of the delay queues.
    fn route_delay(&self, mut entry: Entry<I, O, E>, delay: Duration) {
        let now = self.clock.now();
        entry.not_before = self.clock.add_virtual_interval(now, delay);
        if delay <= self.grace {
            let _ = self.self_tx.send(DispatchMsg::Promote(entry));
            return;
        }
        self.main_queue_count.fetch_sub(1, Ordering::AcqRel);
        let index = (entry.id as usize) % self.delay_queues.len();
        self.delay_queues[index].push(entry);
    }

    fn finish(&self, request_id: u64) {
        self.live_count.fetch_sub(1, Ordering::AcqRel);
        self.main_queue_count.fetch_sub(1, Ordering::AcqRel);
        self.listeners.emit(&SchedulerEvent::RequestRemoved {
            request_id,
            timestamp: Instant::now(),
        });
    }
}

enum AcquireFailure {
    Timeout,
    Cancelled,
    ShutDown,
}

fn into_acquire_failure(err: SlotError) -> AcquireFailure {
    match err {
        SlotError::Timeout => AcquireFailure::Timeout,
        SlotError::Cancelled => AcquireFailure::Cancelled,
        SlotError::ShutDown => AcquireFailure::ShutDown,
    }
}

fn into_ticket_failure(outcome: AcquireOutcome) -> AcquireFailure {
    match outcome {
        AcquireOutcome::Acquired => unreachable!("caller only maps non-Acquired outcomes"),
        AcquireOutcome::WouldBlock => AcquireFailure::Timeout,
        AcquireOutcome::Cancelled => AcquireFailure::Cancelled,
    }
}

fn main_decision_name(decision: MainQueueDecision) -> &'static str {
    match decision {
        MainQueueDecision::ProcessNow => "process_now",
        MainQueueDecision::DelayFor(_) => "delay_for",
        MainQueueDecision::FinalTimeout => "final_timeout",
        MainQueueDecision::FinalFailure => "final_failure",
    }
}

fn after_decision_name<E>(decision: &AfterAttemptDecision<E>) -> &'static str {
    match decision {
        AfterAttemptDecision::Retry(_) => "retry",
        AfterAttemptDecision::FinalFailure(_) => "final_failure",
        AfterAttemptDecision::FinalTimeout => "final_timeout",
    }
}
