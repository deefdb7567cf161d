//! Core infrastructure shared by the retrysched crates.
//!
//! This crate provides:
//! - [`clock`]: the swappable time source used by every scheduling decision.
//! - [`events`]: the fixed Event Listener SPI.
//! - [`error`]: the public error taxonomy (`WaitError`, `SchedulerError`).
//! - [`config`]: the recognised configuration keys and their builder.

pub mod cancellation;
pub mod clock;
pub mod config;
pub mod decision;
pub mod error;
pub mod events;

pub use cancellation::CancellationToken;
pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::{parse_duration, SchedulerConfig, SchedulerConfigBuilder};
pub use decision::{
    AfterAttemptDecider, AfterAttemptDecision, AfterAttemptInput, DelayQueueDecider,
    DelayQueueDecision, DelayQueueDecisionInput, MainQueueDecider, MainQueueDecision,
    MainQueueDecisionInput,
};
pub use error::{Cause, SchedulerError, WaitError};
pub use events::{BoxedEventListener, EventListener, EventListeners, FnListener, SchedulerEvent};
