//! Decision SPI: the three policy points the dispatcher consults at every
//! branch.
//!
//! Each trait is handed a small, read-only view of the state it needs rather
//! than the full request record — the record itself (`Entry`) lives in the
//! facade crate that owns the pipeline, and depending on it here would
//! create a cycle between this crate and the default policies in
//! `retrysched-retry`. The views below carry exactly the fields spec'd for
//! each decision point.

use std::time::Duration;

/// Outcome of the main-queue decision: `(attempt, has_thread_slot,
/// has_ticket) -> decision`. Consulted after dequeue, after slot
/// acquisition, and after a ticket acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainQueueDecision {
    /// Proceed to the next step (acquire a slot, a ticket, or submit).
    ProcessNow,
    /// Re-enqueue into a delay queue for at least this long before retrying.
    DelayFor(Duration),
    /// The request has exceeded `valid_until`; terminate as `TimedOut`.
    FinalTimeout,
    /// Terminate as `FailedTerminal` with no further attempts.
    FinalFailure,
}

/// Read-only view passed to [`MainQueueDecider::decide`].
#[derive(Debug, Clone, Copy)]
pub struct MainQueueDecisionInput {
    /// 1-based attempt number; 0 before the first attempt.
    pub attempt: u32,
    /// Whether a worker slot has already been acquired for this pass.
    pub has_thread_slot: bool,
    /// Whether a rate-limiter ticket has already been acquired for this pass.
    pub has_ticket: bool,
    /// Time remaining until `valid_until`.
    pub remaining_validity: Duration,
}

/// The main-queue admission policy.
pub trait MainQueueDecider: Send + Sync {
    /// Decides what to do with an entry at its current pipeline stage.
    fn decide(&self, input: &MainQueueDecisionInput) -> MainQueueDecision;
}

/// Outcome of the after-attempt decision: `(attempt, cause?) -> decision`.
/// Consulted once per attempt outcome; `cause` is `None` on success (the
/// dispatcher elides this call entirely on success in practice).
#[derive(Debug, Clone)]
pub enum AfterAttemptDecision<E> {
    /// Schedule another attempt after this delay, bounded by `valid_until`.
    Retry(Duration),
    /// Terminate as `FailedTerminal`, wrapping the final cause.
    FinalFailure(E),
    /// Terminate as `TimedOut`.
    FinalTimeout,
}

/// Read-only view passed to [`AfterAttemptDecider::decide`].
#[derive(Debug, Clone, Copy)]
pub struct AfterAttemptInput<'a, E> {
    /// The attempt number that just completed (1-based).
    pub attempt: u32,
    /// The failure that ended the attempt, if any.
    pub cause: Option<&'a E>,
    /// Time remaining until `valid_until`.
    pub remaining_validity: Duration,
}

/// The retry/give-up policy evaluated after every attempt.
pub trait AfterAttemptDecider<E>: Send + Sync {
    /// Decides what happens next given the outcome of the most recent attempt.
    fn decide(&self, input: &AfterAttemptInput<'_, E>) -> AfterAttemptDecision<E>;
}

/// Outcome of the delay-queue decision: `(remaining_delay) -> decision`.
/// Consulted before, and potentially many times during, a delay wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayQueueDecision {
    /// Sleep for the full remaining delay, then promote.
    SleepFully,
    /// Sleep for at most this long, then re-consult the decision.
    SleepStep(Duration),
    /// Stop waiting now; hand the entry to the main queue.
    Promote,
    /// Terminate the entry without promoting it.
    Drop,
}

/// Read-only view passed to [`DelayQueueDecider::decide`].
#[derive(Debug, Clone, Copy)]
pub struct DelayQueueDecisionInput {
    /// Time remaining until `not_before`.
    pub remaining_delay: Duration,
    /// Whether the caller has requested cancellation of this entry.
    pub cancellation_requested: bool,
    /// Whether the service is shutting down.
    pub shutting_down: bool,
}

/// The delay-queue wait policy.
pub trait DelayQueueDecider: Send + Sync {
    /// Decides how to proceed while an entry waits in a delay queue.
    fn decide(&self, input: &DelayQueueDecisionInput) -> DelayQueueDecision;
}
