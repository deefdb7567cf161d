//! Pluggable interval computation for the after-attempt retry decision.

use std::time::Duration;

/// Computes the delay before the next retry attempt.
pub trait IntervalFunction: Send + Sync {
    /// Returns the delay before the given 0-indexed retry attempt.
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// Fixed interval backoff: the same duration for every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    /// Creates a new fixed interval backoff.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _attempt: usize) -> Duration {
        self.duration
    }
}

/// Exponential backoff with a configurable multiplier and optional ceiling.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Option<Duration>,
}

impl ExponentialBackoff {
    /// Creates an exponential backoff with the default multiplier of 2.0.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            max_interval: None,
        }
    }

    /// Sets the exponential growth multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Caps the computed interval at `max_interval`.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let scaled = self.initial_interval.mul_f64(self.multiplier.powi(attempt as i32));
        match self.max_interval {
            Some(max) => scaled.min(max),
            None => scaled,
        }
    }
}

/// Exponential backoff with jitter, to avoid a thundering herd of
/// simultaneously-scheduled retries.
#[derive(Debug, Clone)]
pub struct ExponentialRandomBackoff {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Option<Duration>,
}

impl ExponentialRandomBackoff {
    /// Creates an exponential-random backoff. `randomization_factor` is
    /// clamped to `[0.0, 1.0]`; `0.5` means the interval is randomized
    /// between 50% and 150% of the computed value.
    pub fn new(initial_interval: Duration, randomization_factor: f64) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            randomization_factor: randomization_factor.clamp(0.0, 1.0),
            max_interval: None,
        }
    }

    /// Sets the exponential growth multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Caps the computed interval (before randomization) at `max_interval`.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    fn randomize(&self, duration: Duration) -> Duration {
        use rand::Rng;
        let mut rng = rand::rng();
        let delta = duration.as_secs_f64() * self.randomization_factor;
        let min = (duration.as_secs_f64() - delta).max(0.0);
        let max = duration.as_secs_f64() + delta;
        let randomized = rng.random_range(min..=max);
        Duration::from_secs_f64(randomized)
    }
}

impl IntervalFunction for ExponentialRandomBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let scaled = self.initial_interval.mul_f64(self.multiplier.powi(attempt as i32));
        let capped = match self.max_interval {
            Some(max) => scaled.min(max),
            None => scaled,
        };
        self.randomize(capped)
    }
}

/// A custom interval function built from a closure.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    /// Wraps `f` as an [`IntervalFunction`].
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, attempt: usize) -> Duration {
        (self.f)(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_interval_returns_same_duration() {
        let backoff = FixedInterval::new(Duration::from_secs(1));
        assert_eq!(backoff.next_interval(0), Duration::from_secs(1));
        assert_eq!(backoff.next_interval(10), Duration::from_secs(1));
    }

    #[test]
    fn exponential_backoff_grows() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100));
        assert_eq!(backoff.next_interval(0), Duration::from_millis(100));
        assert_eq!(backoff.next_interval(1), Duration::from_millis(200));
        assert_eq!(backoff.next_interval(2), Duration::from_millis(400));
    }

    #[test]
    fn exponential_backoff_respects_max() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100)).max_interval(Duration::from_millis(300));
        assert_eq!(backoff.next_interval(3), Duration::from_millis(300));
    }

    #[test]
    fn exponential_random_backoff_stays_in_expected_range() {
        let backoff = ExponentialRandomBackoff::new(Duration::from_millis(100), 0.5);
        for _ in 0..20 {
            let interval = backoff.next_interval(1);
            assert!(interval >= Duration::from_millis(100));
            assert!(interval <= Duration::from_millis(300));
        }
    }

    #[test]
    fn fn_interval_uses_custom_function() {
        let backoff = FnInterval::new(|attempt| Duration::from_secs((attempt + 1) as u64));
        assert_eq!(backoff.next_interval(0), Duration::from_secs(1));
        assert_eq!(backoff.next_interval(2), Duration::from_secs(3));
    }
}
