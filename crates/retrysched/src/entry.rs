//! The per-request record that is both the value moved through the pipeline
//! and the backing state for the [`RequestHandle`](crate::RequestHandle)
//! returned to the submitter.

use retrysched_core::CancellationToken;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;

use retrysched_core::WaitError;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Lifecycle states for an [`Entry`]. Terminal states never transition
/// further; `result` is only ever populated on the transition into
/// `Succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompletionState {
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    FailedTerminal = 3,
    TimedOut = 4,
    Cancelled = 5,
}

impl CompletionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Succeeded,
            3 => Self::FailedTerminal,
            4 => Self::TimedOut,
            _ => Self::Cancelled,
        }
    }

    /// Terminal states never transition further.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Shared, atomically-updated completion state for one entry.
///
/// The entry itself is single-writer (owned by whichever pipeline stage
/// currently holds it); this cell is the one piece of state a
/// [`RequestHandle`](crate::RequestHandle) may read concurrently with the
/// owning stage, so the terminal transition is serialised through a
/// compare-and-set rather than a plain store.
#[derive(Debug, Default)]
pub(crate) struct EntryState {
    completion: AtomicU8,
    cancellation_requested: AtomicBool,
}

impl EntryState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn load(&self) -> CompletionState {
        CompletionState::from_u8(self.completion.load(Ordering::Acquire))
    }

    /// Moves into `to` unless already terminal. Returns `false` (no-op) if
    /// the entry had already reached a terminal state.
    pub(crate) fn try_transition(&self, to: CompletionState) -> bool {
        loop {
            let current = self.completion.load(Ordering::Acquire);
            if CompletionState::from_u8(current).is_terminal() {
                return false;
            }
            if self
                .completion
                .compare_exchange_weak(
                    current,
                    to as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Sets the cancellation-requested flag. Returns `true` iff this call
    /// was the one that set it (idempotent thereafter).
    pub(crate) fn request_cancellation(&self) -> bool {
        self.cancellation_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_cancellation_requested(&self) -> bool {
        self.cancellation_requested.load(Ordering::Acquire)
    }
}

/// The canonical per-request record: moved by value between pipeline
/// stages (main queue, delay queue, attempt supervisor), single-writer at
/// every point in time.
pub(crate) struct Entry<I, O, E> {
    pub id: u64,
    pub input: Arc<I>,
    pub created_at: Instant,
    pub valid_until: Instant,
    pub not_before: Instant,
    /// 1-based; 0 before the first attempt.
    pub attempt: u32,
    pub last_error: Option<E>,
    pub state: Arc<EntryState>,
    pub cancel: CancellationToken,
    result_tx: Option<oneshot::Sender<Result<Arc<O>, WaitError<E>>>>,
}

impl<I, O, E> Entry<I, O, E> {
    pub fn new(
        id: u64,
        input: Arc<I>,
        created_at: Instant,
        valid_until: Instant,
        not_before: Instant,
        result_tx: oneshot::Sender<Result<Arc<O>, WaitError<E>>>,
    ) -> Self {
        Self {
            id,
            input,
            created_at,
            valid_until,
            not_before,
            attempt: 0,
            last_error: None,
            state: Arc::new(EntryState::new()),
            cancel: CancellationToken::new(),
            result_tx: Some(result_tx),
        }
    }

    pub fn remaining_validity(&self, now: Instant) -> std::time::Duration {
        self.valid_until.saturating_duration_since(now)
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes the entry's future exactly once, transitioning to `state`.
    /// A no-op if the entry was already terminal (defends against a
    /// double-completion bug rather than a reachable runtime state).
    pub fn complete(&mut self, state: CompletionState, outcome: Result<Arc<O>, WaitError<E>>) {
        if !self.state.try_transition(state) {
            return;
        }
        #[cfg(feature = "tracing")]
        debug!(request_id = self.id, ?state, entry = ?self, "request completed");
        if let Some(tx) = self.result_tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Shows the scalar bookkeeping fields; `input`/`last_error`/`result_tx` are
/// opaque application types that may not implement `Debug` themselves.
impl<I, O, E> std::fmt::Debug for Entry<I, O, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("valid_until", &self.valid_until)
            .field("not_before", &self.not_before)
            .field("attempt", &self.attempt)
            .field("state", &self.state.load())
            .finish()
    }
}
