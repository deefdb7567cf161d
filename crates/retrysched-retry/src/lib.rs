//! Default Decision SPI policies for retrysched: exponential-or-configured
//! retry delays bounded by a request's deadline, and the grace-period rule
//! that lets a near-due entry skip the delay queue entirely.
//!
//! The [`IntervalFunction`] abstraction (fixed, exponential, exponential
//! with jitter, or a custom closure) is reused from the retry middleware
//! this crate is descended from; the three decision structs below adapt it
//! to the scheduler's Decision SPI traits (`retrysched_core::decision`).

mod backoff;

pub use backoff::{ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction};

use retrysched_core::{
    AfterAttemptDecider, AfterAttemptDecision, AfterAttemptInput, DelayQueueDecider,
    DelayQueueDecision, DelayQueueDecisionInput, MainQueueDecider, MainQueueDecision,
    MainQueueDecisionInput,
};
use std::time::Duration;

/// Main-queue admission policy: proceed unless the request has already run
/// out of validity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMainQueueDecider;

impl MainQueueDecider for DefaultMainQueueDecider {
    fn decide(&self, input: &MainQueueDecisionInput) -> MainQueueDecision {
        if input.remaining_validity.is_zero() {
            MainQueueDecision::FinalTimeout
        } else {
            MainQueueDecision::ProcessNow
        }
    }
}

/// After-attempt policy: retry failures using an [`IntervalFunction`] up to
/// `max_attempts`, bounded by the request's remaining validity.
pub struct ExponentialAfterAttemptDecider<I> {
    interval: I,
    max_attempts: u32,
}

impl<I> ExponentialAfterAttemptDecider<I>
where
    I: IntervalFunction,
{
    /// Creates a decider that consults `interval` for the delay before each
    /// retry and gives up after `max_attempts` attempts.
    pub fn new(interval: I, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl<I, E> AfterAttemptDecider<E> for ExponentialAfterAttemptDecider<I>
where
    I: IntervalFunction,
    E: Clone + Send + Sync,
{
    fn decide(&self, input: &AfterAttemptInput<'_, E>) -> AfterAttemptDecision<E> {
        let Some(cause) = input.cause else {
            // Success is handled by the dispatcher directly; this call only
            // happens on failure in practice, but treat a causeless call as
            // a no-op retry signal rather than panicking.
            return AfterAttemptDecision::Retry(Duration::ZERO);
        };

        if input.remaining_validity.is_zero() {
            return AfterAttemptDecision::FinalTimeout;
        }

        if input.attempt >= self.max_attempts {
            return AfterAttemptDecision::FinalFailure(cause.clone());
        }

        let delay = self.interval.next_interval(input.attempt as usize);
        if delay >= input.remaining_validity {
            return AfterAttemptDecision::FinalTimeout;
        }

        AfterAttemptDecision::Retry(delay)
    }
}

/// Delay-queue wait policy: drop on cancellation/shutdown, promote once the
/// remaining delay is exhausted, otherwise sleep in `max_sleep_step`
/// increments so cancellation and shutdown are noticed promptly.
#[derive(Debug, Clone, Copy)]
pub struct DefaultDelayQueueDecider {
    max_sleep_step: Duration,
}

impl DefaultDelayQueueDecider {
    /// Creates a decider that never sleeps longer than `max_sleep_step` in
    /// one step before re-consulting.
    pub fn new(max_sleep_step: Duration) -> Self {
        Self { max_sleep_step }
    }
}

impl DelayQueueDecider for DefaultDelayQueueDecider {
    fn decide(&self, input: &DelayQueueDecisionInput) -> DelayQueueDecision {
        if input.cancellation_requested || input.shutting_down {
            return DelayQueueDecision::Drop;
        }
        if input.remaining_delay.is_zero() {
            return DelayQueueDecision::Promote;
        }
        if input.remaining_delay <= self.max_sleep_step {
            DelayQueueDecision::SleepFully
        } else {
            DelayQueueDecision::SleepStep(self.max_sleep_step)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct AppError;

    #[test]
    fn main_queue_decider_allows_processing_while_time_remains() {
        let decider = DefaultMainQueueDecider;
        let decision = decider.decide(&MainQueueDecisionInput {
            attempt: 1,
            has_thread_slot: false,
            has_ticket: false,
            remaining_validity: Duration::from_secs(1),
        });
        assert_eq!(decision, MainQueueDecision::ProcessNow);
    }

    #[test]
    fn main_queue_decider_times_out_at_zero_validity() {
        let decider = DefaultMainQueueDecider;
        let decision = decider.decide(&MainQueueDecisionInput {
            attempt: 1,
            has_thread_slot: true,
            has_ticket: true,
            remaining_validity: Duration::ZERO,
        });
        assert_eq!(decision, MainQueueDecision::FinalTimeout);
    }

    #[test]
    fn after_attempt_decider_retries_under_the_ceiling() {
        let decider = ExponentialAfterAttemptDecider::new(FixedInterval::new(Duration::from_millis(50)), 3);
        let cause = AppError;
        let decision = decider.decide(&AfterAttemptInput {
            attempt: 1,
            cause: Some(&cause),
            remaining_validity: Duration::from_secs(10),
        });
        assert!(matches!(decision, AfterAttemptDecision::Retry(d) if d == Duration::from_millis(50)));
    }

    #[test]
    fn after_attempt_decider_gives_up_at_max_attempts() {
        let decider = ExponentialAfterAttemptDecider::new(FixedInterval::new(Duration::from_millis(50)), 3);
        let cause = AppError;
        let decision = decider.decide(&AfterAttemptInput {
            attempt: 3,
            cause: Some(&cause),
            remaining_validity: Duration::from_secs(10),
        });
        assert!(matches!(decision, AfterAttemptDecision::FinalFailure(_)));
    }

    #[test]
    fn after_attempt_decider_times_out_when_delay_would_exceed_deadline() {
        let decider = ExponentialAfterAttemptDecider::new(FixedInterval::new(Duration::from_secs(5)), 10);
        let cause = AppError;
        let decision = decider.decide(&AfterAttemptInput {
            attempt: 1,
            cause: Some(&cause),
            remaining_validity: Duration::from_millis(100),
        });
        assert!(matches!(decision, AfterAttemptDecision::FinalTimeout));
    }

    #[test]
    fn delay_queue_decider_drops_on_cancellation() {
        let decider = DefaultDelayQueueDecider::new(Duration::from_secs(1));
        let decision = decider.decide(&DelayQueueDecisionInput {
            remaining_delay: Duration::from_secs(5),
            cancellation_requested: true,
            shutting_down: false,
        });
        assert_eq!(decision, DelayQueueDecision::Drop);
    }

    #[test]
    fn delay_queue_decider_promotes_when_due() {
        let decider = DefaultDelayQueueDecider::new(Duration::from_secs(1));
        let decision = decider.decide(&DelayQueueDecisionInput {
            remaining_delay: Duration::ZERO,
            cancellation_requested: false,
            shutting_down: false,
        });
        assert_eq!(decision, DelayQueueDecision::Promote);
    }

    #[test]
    fn delay_queue_decider_steps_long_delays() {
        let decider = DefaultDelayQueueDecider::new(Duration::from_millis(100));
        let decision = decider.decide(&DelayQueueDecisionInput {
            remaining_delay: Duration::from_secs(1),
            cancellation_requested: false,
            shutting_down: false,
        });
        assert_eq!(decision, DelayQueueDecision::SleepStep(Duration::from_millis(100)));
    }
}
