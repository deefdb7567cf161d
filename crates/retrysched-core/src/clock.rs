//! Time abstraction used throughout the scheduler.
//!
//! Every scheduling decision — when a delay queue entry becomes eligible,
//! how long a ticket wait may run, how long `get(timeout)` may block — is
//! parameterized by a [`Clock`] so that tests can compress or dilate
//! multi-second scenarios without touching the scheduling code itself.

use std::time::{Duration, Instant};

/// Abstracts wall time and exposes a virtual-time scaling factor.
///
/// A `time_factor` of `Some(2.0)` means virtual time moves twice as fast as
/// real time: a 100ms real sleep corresponds to 200ms of virtual schedule
/// time, and a 100ms virtual delay only needs a 50ms real sleep. `None` is
/// the "no scaling" sentinel used in production.
pub trait Clock: Send + Sync + std::fmt::Debug + 'static {
    /// Returns the current real instant.
    fn now(&self) -> Instant;

    /// Returns the virtual-time scaling factor, or `None` if unscaled.
    fn time_factor(&self) -> Option<f64>;

    /// Returns the virtual duration that elapsed between two real instants.
    ///
    /// Returns [`Duration::ZERO`] iff `start == end`; otherwise the result is
    /// rounded away from zero (ceiling), so a nonzero real gap never reports
    /// as "no time passed" due to truncation.
    fn virtual_gap(&self, start: Instant, end: Instant) -> Duration {
        if start == end {
            return Duration::ZERO;
        }
        let factor = self.time_factor().unwrap_or(1.0);
        let real = if end >= start {
            end - start
        } else {
            start - end
        };
        scale_duration_ceil(real, factor)
    }

    /// Converts a virtual sleep request into the real duration to actually
    /// wait, given `start` as the reference instant.
    ///
    /// Never returns `start` unless `virtual_duration` is zero.
    fn add_virtual_interval(&self, start: Instant, virtual_duration: Duration) -> Instant {
        if virtual_duration.is_zero() {
            return start;
        }
        let factor = self.time_factor().unwrap_or(1.0);
        let real = scale_duration_ceil(virtual_duration, 1.0 / factor);
        start + real
    }
}

/// Scales `d` by `factor`, rounding away from zero and never collapsing a
/// nonzero duration to zero.
fn scale_duration_ceil(d: Duration, factor: f64) -> Duration {
    let scaled_nanos = (d.as_nanos() as f64) * factor;
    let nanos = scaled_nanos.ceil().max(1.0);
    if nanos >= u64::MAX as f64 {
        Duration::from_secs(u64::MAX / 1_000_000_000)
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

/// The production clock: real wall time, unscaled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn time_factor(&self) -> Option<f64> {
        None
    }
}

/// A clock that scales virtual schedule time by a fixed factor, for tests
/// that need to compress or dilate multi-second scenarios.
///
/// `now()` still returns real time — only the conversions in
/// [`Clock::virtual_gap`] and [`Clock::add_virtual_interval`] are scaled.
/// A `VirtualClock` with `factor > 1.0` makes the scheduler sleep for less
/// real time per unit of configured (virtual) delay.
#[derive(Debug, Clone, Copy)]
pub struct VirtualClock {
    factor: f64,
}

impl VirtualClock {
    /// Creates a clock with the given time factor.
    ///
    /// # Panics
    ///
    /// Panics if `factor` is not finite and positive.
    pub fn new(factor: f64) -> Self {
        assert!(
            factor.is_finite() && factor > 0.0,
            "time factor must be finite and positive, got {factor}"
        );
        Self { factor }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn time_factor(&self) -> Option<f64> {
        Some(self.factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_has_no_factor() {
        let clock = SystemClock;
        assert_eq!(clock.time_factor(), None);
    }

    #[test]
    fn virtual_gap_is_zero_only_for_equal_endpoints() {
        let clock = SystemClock;
        let t = Instant::now();
        assert_eq!(clock.virtual_gap(t, t), Duration::ZERO);
        assert!(clock.virtual_gap(t, t + Duration::from_nanos(1)) > Duration::ZERO);
    }

    #[test]
    fn virtual_gap_scales_by_factor() {
        let clock = VirtualClock::new(2.0);
        let t = Instant::now();
        let gap = clock.virtual_gap(t, t + Duration::from_millis(100));
        assert_eq!(gap, Duration::from_millis(200));
    }

    #[test]
    fn add_virtual_interval_never_returns_start_for_nonzero_interval() {
        let clock = VirtualClock::new(1000.0);
        let t = Instant::now();
        let end = clock.add_virtual_interval(t, Duration::from_nanos(1));
        assert!(end > t);
    }

    #[test]
    fn add_virtual_interval_is_identity_for_zero() {
        let clock = VirtualClock::new(2.0);
        let t = Instant::now();
        assert_eq!(clock.add_virtual_interval(t, Duration::ZERO), t);
    }

    #[test]
    fn add_virtual_interval_inverts_virtual_gap_roughly() {
        // A fast virtual clock should need proportionally less real sleep
        // to cover the same virtual delay.
        let clock = VirtualClock::new(10.0);
        let t = Instant::now();
        let real_end = clock.add_virtual_interval(t, Duration::from_millis(1000));
        // 1000ms virtual at 10x factor should need ~100ms real.
        let real_elapsed = real_end - t;
        assert!(real_elapsed <= Duration::from_millis(110));
        assert!(real_elapsed >= Duration::from_millis(90));
    }

    #[test]
    #[should_panic]
    fn virtual_clock_rejects_nonpositive_factor() {
        VirtualClock::new(0.0);
    }
}
