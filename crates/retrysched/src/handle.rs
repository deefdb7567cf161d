//! The submitter-facing half of an [`Entry`](crate::entry::Entry): the
//! handle returned by [`Service::submit`](crate::Service::submit) and its
//! variants.

use crate::entry::{CompletionState, EntryState};
use retrysched_core::{CancellationToken, WaitError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// A handle to a submitted request: the future surfacing its eventual
/// result, plus the lifecycle queries and cancellation request named in
/// the scheduler's Future/Entry contract.
///
/// The success value is handed back as `Arc<Output>` rather than `Output`
/// — the same allocation the event listener SPI already observes via
/// `SchedulerEvent::RequestSuccess`, which avoids requiring `Output: Clone`
/// to satisfy both the listener and the handle from a single attempt
/// result.
pub struct RequestHandle<Input, Output, Error> {
    pub(crate) input: Arc<Input>,
    pub(crate) state: Arc<EntryState>,
    pub(crate) cancel: CancellationToken,
    pub(crate) rx: oneshot::Receiver<Result<Arc<Output>, WaitError<Error>>>,
}

impl<Input, Output, Error> RequestHandle<Input, Output, Error> {
    /// The original payload this request was submitted with.
    pub fn task(&self) -> &Input {
        &self.input
    }

    /// Requests cancellation. Returns `true` iff this call is the one that
    /// set the flag (idempotent thereafter, and once the request is
    /// terminal). Best-effort: takes effect at the request's next decision
    /// point rather than pre-empting a running attempt.
    pub fn request_cancellation(&self) -> bool {
        if self.state.is_cancellation_requested() {
            return false;
        }
        let set = self.state.request_cancellation();
        if set {
            self.cancel.cancel();
        }
        set
    }

    /// `true` if the request has already completed successfully.
    pub fn is_successful(&self) -> bool {
        self.state.load() == CompletionState::Succeeded
    }

    /// `true` if the request has already completed as cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.load() == CompletionState::Cancelled
    }

    /// `true` if the request has reached any terminal state.
    pub fn is_done(&self) -> bool {
        self.state.load().is_terminal()
    }

    /// Waits for completion. Consumes the handle: a request's future is
    /// signalled exactly once, so there is nothing to observe afterwards
    /// except through the state queries above.
    pub async fn get(self) -> Result<Arc<Output>, WaitError<Error>> {
        match self.rx.await {
            Ok(outcome) => outcome,
            // The dispatcher dropped the sender without completing the
            // entry — only reachable if the service is degraded.
            Err(_) => Err(WaitError::Interrupted),
        }
    }

    /// As [`Self::get`], but gives up after `timeout` with
    /// `WaitError::Timeout` rather than waiting for the request itself.
    pub async fn get_timeout(
        self,
        timeout: Duration,
    ) -> Result<Arc<Output>, WaitError<Error>> {
        match tokio::time::timeout(timeout, self.get()).await {
            Ok(result) => result,
            Err(_) => Err(WaitError::Timeout(timeout)),
        }
    }

    /// As [`Self::get_timeout`], but returns `None` on caller-wait timeout
    /// instead of `Err(WaitError::Timeout)`.
    pub async fn get_or_none(self, timeout: Duration) -> Option<Arc<Output>> {
        self.get_timeout(timeout).await.ok()
    }
}
