//! Spawns retry attempts onto a runtime, decoupling how an attempt is run
//! from the scheduling decisions that surround it.
//!
//! - [`Executor`]: abstracts over where a future is spawned ([`CurrentRuntime`],
//!   [`BlockingExecutor`], or a plain `tokio::runtime::Handle`).
//! - [`AttemptRunner`]: submits attempts to an [`Executor`], holding the
//!   worker-pool permit for the attempt's lifetime and reporting the result
//!   back through an [`AttemptFuture`].

mod attempt;
mod executor;

pub use attempt::{AttemptError, AttemptFuture, AttemptRunner, SubmitOutcome};
pub use executor::{BlockingExecutor, CurrentRuntime, Executor};
