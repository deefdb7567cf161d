//! Error taxonomy for the scheduler.
//!
//! The original system leaked checked exceptions through its future's `get`
//! surface; here the future exposes a closed sum type instead
//! ([`WaitError`]), and admission/runtime failures from the service facade
//! are a separate [`SchedulerError`].

use std::fmt;
use std::time::Duration;

/// Errors a waiter on a request's handle can observe.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WaitError<E> {
    /// The waiting call itself was asked to abort (not the request).
    #[error("wait was interrupted")]
    Interrupted,
    /// The caller's `get(timeout)` elapsed before the request completed.
    #[error("wait timed out after {0:?}")]
    Timeout(Duration),
    /// The request hit its own `validUntil` deadline.
    #[error("request exceeded its deadline")]
    RequestTimedOut,
    /// The request was cancelled before completion.
    #[error("request was cancelled")]
    Cancelled,
    /// All attempts were exhausted, or a decision declared final failure.
    #[error("request failed: {0}")]
    AttemptFailed(#[source] E),
    /// The main-queue decision SPI declared final failure before any
    /// attempt ran, so there is no attempt cause to carry.
    #[error("request was rejected by policy before any attempt ran")]
    PolicyRejected,
}

impl<E> WaitError<E> {
    /// Maps the wrapped application error, leaving other variants untouched.
    pub fn map_cause<F, E2>(self, f: F) -> WaitError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Self::Interrupted => WaitError::Interrupted,
            Self::Timeout(d) => WaitError::Timeout(d),
            Self::RequestTimedOut => WaitError::RequestTimedOut,
            Self::Cancelled => WaitError::Cancelled,
            Self::AttemptFailed(e) => WaitError::AttemptFailed(f(e)),
            Self::PolicyRejected => WaitError::PolicyRejected,
        }
    }

    /// Returns `true` if the request simply never got its answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RequestTimedOut)
    }
}

/// Errors surfaced synchronously from the service facade, or fatally by the
/// dispatcher when it can no longer make progress.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The admission ceiling (`max_pending_requests`) was reached.
    #[error("too many pending requests (ceiling {ceiling})")]
    TooManyPendingRequests {
        /// The configured ceiling that was hit.
        ceiling: usize,
    },
    /// `submit` was called after `shutdown`.
    #[error("service has been shut down")]
    ShutDown,
    /// The dispatcher hit an unrecoverable error; the service is no longer
    /// making progress. Also reported to listeners as `UnexpectedRuntimeError`.
    #[error("scheduler is degraded: {reason}")]
    Degraded {
        /// Human-readable diagnosis.
        reason: String,
    },
}

/// A plain-string application cause, used by the default decision SPI
/// implementations which only carry a formatted message rather than a typed
/// error.
#[derive(Debug, Clone)]
pub struct Cause(pub String);

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Cause {}
