//! Error types for worker-slot acquisition.

/// Errors that can occur while acquiring a worker slot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SlotError {
    /// No slot became available within the requested wait.
    #[error("timed out waiting for a worker slot")]
    Timeout,
    /// The cancellation token fired before a slot became available.
    #[error("slot acquisition was cancelled")]
    Cancelled,
    /// The pool has been shut down and is no longer accepting work.
    #[error("worker pool has been shut down")]
    ShutDown,
}
