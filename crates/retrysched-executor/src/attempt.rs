//! Spawns a single retry attempt onto an [`Executor`] and hands back a future
//! that resolves once the attempt completes.
//!
//! The worker-pool permit is moved into the spawned task and held for the
//! attempt's entire lifetime, so it is released automatically (and promptly,
//! even on panic) the moment the task ends.

use crate::Executor;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::sync::OwnedSemaphorePermit;

/// Outcome of trying to submit an attempt to the pool.
pub enum SubmitOutcome<T, E> {
    /// The attempt was spawned; await the future for its result.
    Accepted(AttemptFuture<T, E>),
    /// The runner has begun shutting down and is no longer accepting work.
    Rejected,
}

/// Errors specific to running an attempt on the pool, distinct from the
/// attempt's own error type `E`.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError<E> {
    /// The spawned task was dropped or panicked before reporting a result.
    #[error("attempt task panicked or was cancelled before completion")]
    TaskPanicked,
    /// The attempt itself failed.
    #[error("attempt failed: {0}")]
    Failed(E),
}

pin_project! {
    /// Resolves to the spawned attempt's result.
    pub struct AttemptFuture<T, E> {
        #[pin]
        rx: oneshot::Receiver<Result<T, E>>,
    }
}

impl<T, E> Future for AttemptFuture<T, E> {
    type Output = Result<T, AttemptError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.rx.poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(AttemptError::Failed(err))),
            Poll::Ready(Err(_)) => Poll::Ready(Err(AttemptError::TaskPanicked)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Submits attempts to an [`Executor`], tracking whether the runner has
/// begun shutting down.
#[derive(Clone)]
pub struct AttemptRunner<Ex> {
    executor: Ex,
    shutting_down: Arc<AtomicBool>,
}

impl<Ex: Executor> AttemptRunner<Ex> {
    /// Creates a runner that spawns attempts onto `executor`.
    pub fn new(executor: Ex) -> Self {
        Self {
            executor,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Marks the runner as shutting down; subsequent [`Self::submit_attempt`]
    /// calls return [`SubmitOutcome::Rejected`]. Attempts already spawned run
    /// to completion.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Spawns `attempt` onto the executor, holding `permit` for its duration.
    pub fn submit_attempt<F, T, E>(
        &self,
        permit: OwnedSemaphorePermit,
        attempt: F,
    ) -> SubmitOutcome<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if self.shutting_down.load(Ordering::SeqCst) {
            return SubmitOutcome::Rejected;
        }

        let (tx, rx) = oneshot::channel();
        self.executor.spawn(async move {
            let result = attempt.await;
            drop(permit);
            let _ = tx.send(result);
        });
        SubmitOutcome::Accepted(AttemptFuture { rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CurrentRuntime;
    use tokio::sync::Semaphore;

    async fn permit(sem: &Arc<Semaphore>) -> OwnedSemaphorePermit {
        Arc::clone(sem).acquire_owned().await.unwrap()
    }

    #[tokio::test]
    async fn submit_attempt_returns_the_attempts_output() {
        let runner = AttemptRunner::new(CurrentRuntime::new());
        let sem = Arc::new(Semaphore::new(1));
        let outcome =
            runner.submit_attempt::<_, i32, &str>(permit(&sem).await, async { Ok(42) });
        let SubmitOutcome::Accepted(future) = outcome else {
            panic!("expected Accepted");
        };
        assert_eq!(future.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn submit_attempt_propagates_the_attempts_error() {
        let runner = AttemptRunner::new(CurrentRuntime::new());
        let sem = Arc::new(Semaphore::new(1));
        let outcome = runner
            .submit_attempt::<_, i32, &str>(permit(&sem).await, async { Err("boom") });
        let SubmitOutcome::Accepted(future) = outcome else {
            panic!("expected Accepted");
        };
        assert!(matches!(future.await, Err(AttemptError::Failed("boom"))));
    }

    #[tokio::test]
    async fn submit_attempt_releases_the_permit_on_completion() {
        let runner = AttemptRunner::new(CurrentRuntime::new());
        let sem = Arc::new(Semaphore::new(1));
        let outcome = runner.submit_attempt::<_, (), &str>(permit(&sem).await, async { Ok(()) });
        let SubmitOutcome::Accepted(future) = outcome else {
            panic!("expected Accepted");
        };
        future.await.unwrap();
        let _held = permit(&sem).await;
        assert_eq!(sem.available_permits(), 0);
    }

    #[tokio::test]
    async fn submit_attempt_rejects_after_shutdown() {
        let runner = AttemptRunner::new(CurrentRuntime::new());
        let sem = Arc::new(Semaphore::new(1));
        runner.shutdown();
        let outcome = runner.submit_attempt::<_, (), &str>(permit(&sem).await, async { Ok(()) });
        assert!(matches!(outcome, SubmitOutcome::Rejected));
    }

    #[tokio::test]
    async fn a_panicking_attempt_resolves_to_task_panicked() {
        let runner = AttemptRunner::new(CurrentRuntime::new());
        let sem = Arc::new(Semaphore::new(1));
        let outcome = runner.submit_attempt::<_, (), &str>(permit(&sem).await, async {
            panic!("attempt panicked")
        });
        let SubmitOutcome::Accepted(future) = outcome else {
            panic!("expected Accepted");
        };
        assert!(matches!(future.await, Err(AttemptError::TaskPanicked)));
    }
}
