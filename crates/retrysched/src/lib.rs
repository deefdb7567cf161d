//! `retrysched`: an in-process retry-and-rate-limit scheduler.
//!
//! Callers submit opaque request payloads with a deadline and an optional
//! initial delay via [`Service`]; the service repeatedly attempts each
//! request until it succeeds, exhausts retries, or exceeds its deadline,
//! subject to an admission-control ceiling and a ticket-based rate limiter.
//! Each submission is represented by a [`RequestHandle`] surfacing the
//! eventual result or a typed [`WaitError`](retrysched_core::WaitError).
//!
//! This crate is the facade over the cooperating crates that do the actual
//! work: `retrysched_core` (clock, event/decision SPIs, error taxonomy),
//! `retrysched_retry` (default decision policies), `retrysched_ratelimiter`
//! (the ticket bucket), `retrysched_bulkhead` (the worker pool), and
//! `retrysched_executor` (attempt spawning).

mod delay_queue;
mod dispatcher;
mod entry;
mod handle;
mod service;
mod status;

pub use handle::RequestHandle;
pub use service::{Service, ServiceBuilder};
pub use status::StatusSnapshot;

pub use retrysched_core::{
    AfterAttemptDecider, AfterAttemptDecision, AfterAttemptInput, Cause, Clock, DelayQueueDecider,
    DelayQueueDecision, DelayQueueDecisionInput, EventListener, MainQueueDecider, MainQueueDecision,
    MainQueueDecisionInput, SchedulerConfig, SchedulerConfigBuilder, SchedulerError, SchedulerEvent,
    SystemClock, VirtualClock, WaitError,
};
pub use retrysched_executor::Executor;
