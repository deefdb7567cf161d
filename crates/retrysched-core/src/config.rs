//! Recognised configuration keys for the scheduler.
//!
//! Parsing/loading these values from a file or environment is out of scope;
//! this module only owns the typed, validated struct and the builder that
//! produces it, plus a small duration-suffix parser consumed by the
//! builder's `*_str` setters.

use std::time::Duration;

/// Immutable, validated scheduler configuration.
///
/// Constructed via [`SchedulerConfigBuilder`]; there is no public way to
/// mutate a config after `build()`.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    service_name: String,
    main_queue_cache_time: Duration,
    max_pending_requests: usize,
    max_attempts: u32,
    delay_queue_count: usize,
    max_sleep_step: Duration,
    request_early_processing_grace_period: Duration,
    thread_pool_size: usize,
    rate_limit: u32,
    rate_limit_interval: Duration,
    rate_limit_burst: u32,
    time_factor: Option<f64>,
}

impl SchedulerConfig {
    /// Starts a new builder with the teacher-style defaults.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    /// Name used in tracing spans and metrics labels.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// How long a `get_status` snapshot may be served from cache.
    pub fn main_queue_cache_time(&self) -> Duration {
        self.main_queue_cache_time
    }

    /// Admission ceiling on concurrently pending requests.
    pub fn max_pending_requests(&self) -> usize {
        self.max_pending_requests
    }

    /// Retry ceiling (1-based attempt count).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Number of independent delay queues.
    pub fn delay_queue_count(&self) -> usize {
        self.delay_queue_count
    }

    /// Upper bound on a single delay-queue sleep before re-polling the decision.
    pub fn max_sleep_step(&self) -> Duration {
        self.max_sleep_step
    }

    /// `notBefore - grace <= now` is allowed to skip the delay queue.
    pub fn request_early_processing_grace_period(&self) -> Duration {
        self.request_early_processing_grace_period
    }

    /// Number of executor worker slots.
    pub fn thread_pool_size(&self) -> usize {
        self.thread_pool_size
    }

    /// Ticket bucket replenishment rate: `rate_limit` tokens per `rate_limit_interval`.
    pub fn rate_limit(&self) -> (u32, Duration) {
        (self.rate_limit, self.rate_limit_interval)
    }

    /// Ticket bucket burst ceiling.
    pub fn rate_limit_burst(&self) -> u32 {
        self.rate_limit_burst
    }

    /// Virtual-time scaling factor, or `None` for unscaled real time.
    pub fn time_factor(&self) -> Option<f64> {
        self.time_factor
    }
}

/// Builder for [`SchedulerConfig`].
///
/// Every setter has a duration-or-string pair where applicable
/// (`max_sleep_step`/`max_sleep_step_str`) so callers can supply either a
/// typed `Duration` or a suffixed string (`"500ms"`, `"2s"`, `"1m"`).
#[derive(Debug, Clone)]
pub struct SchedulerConfigBuilder {
    service_name: String,
    main_queue_cache_time: Duration,
    max_pending_requests: usize,
    max_attempts: u32,
    delay_queue_count: usize,
    max_sleep_step: Duration,
    request_early_processing_grace_period: Duration,
    thread_pool_size: usize,
    rate_limit: u32,
    rate_limit_interval: Duration,
    rate_limit_burst: u32,
    time_factor: Option<f64>,
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self {
            service_name: "retrysched".to_string(),
            main_queue_cache_time: Duration::ZERO,
            max_pending_requests: 10_000,
            max_attempts: 3,
            delay_queue_count: 4,
            max_sleep_step: Duration::from_secs(1),
            request_early_processing_grace_period: Duration::from_millis(10),
            thread_pool_size: 8,
            rate_limit: 100,
            rate_limit_interval: Duration::from_secs(1),
            rate_limit_burst: 100,
            time_factor: None,
        }
    }
}

impl SchedulerConfigBuilder {
    /// Sets the service name used in tracing/metrics labels.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Sets the status-snapshot cache validity.
    pub fn main_queue_cache_time(mut self, d: Duration) -> Self {
        self.main_queue_cache_time = d;
        self
    }

    /// As [`Self::main_queue_cache_time`], parsing a `"500ms"`-style string.
    ///
    /// # Panics
    ///
    /// Panics if `s` cannot be parsed by [`parse_duration`].
    pub fn main_queue_cache_time_str(self, s: &str) -> Self {
        let d = parse_duration(s).unwrap_or_else(|e| panic!("main_queue_cache_time: {e}"));
        self.main_queue_cache_time(d)
    }

    /// Sets the admission ceiling. Must be `>= 1`.
    pub fn max_pending_requests(mut self, n: usize) -> Self {
        self.max_pending_requests = n;
        self
    }

    /// Sets the retry ceiling. Must be `>= 1`.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Sets the number of independent delay queues. Must be `>= 1`.
    pub fn delay_queue_count(mut self, n: usize) -> Self {
        self.delay_queue_count = n;
        self
    }

    /// Sets the maximum single delay-queue sleep step.
    pub fn max_sleep_step(mut self, d: Duration) -> Self {
        self.max_sleep_step = d;
        self
    }

    /// As [`Self::max_sleep_step`], parsing a `"500ms"`-style string.
    pub fn max_sleep_step_str(self, s: &str) -> Self {
        let d = parse_duration(s).unwrap_or_else(|e| panic!("max_sleep_step: {e}"));
        self.max_sleep_step(d)
    }

    /// Sets the early-processing grace period.
    pub fn request_early_processing_grace_period(mut self, d: Duration) -> Self {
        self.request_early_processing_grace_period = d;
        self
    }

    /// As [`Self::request_early_processing_grace_period`], parsing a string.
    pub fn request_early_processing_grace_period_str(self, s: &str) -> Self {
        let d = parse_duration(s)
            .unwrap_or_else(|e| panic!("request_early_processing_grace_period: {e}"));
        self.request_early_processing_grace_period(d)
    }

    /// Sets the number of executor worker slots. Must be `>= 1`.
    pub fn thread_pool_size(mut self, n: usize) -> Self {
        self.thread_pool_size = n;
        self
    }

    /// Sets the ticket bucket replenishment rate: `count` tokens per `interval`.
    pub fn rate_limit(mut self, count: u32, interval: Duration) -> Self {
        self.rate_limit = count;
        self.rate_limit_interval = interval;
        self
    }

    /// Sets the ticket bucket burst ceiling.
    pub fn rate_limit_burst(mut self, n: u32) -> Self {
        self.rate_limit_burst = n;
        self
    }

    /// Sets the virtual-time scaling factor. `None` means unscaled real time.
    pub fn time_factor(mut self, factor: Option<f64>) -> Self {
        self.time_factor = factor;
        self
    }

    /// Validates and builds the config.
    ///
    /// # Panics
    ///
    /// Panics if any `>= 1` constrained field is zero, or `time_factor` is
    /// `Some` non-finite/non-positive.
    pub fn build(self) -> SchedulerConfig {
        assert!(
            self.max_pending_requests >= 1,
            "max_pending_requests must be >= 1"
        );
        assert!(self.max_attempts >= 1, "max_attempts must be >= 1");
        assert!(
            self.delay_queue_count >= 1,
            "delay_queue_count must be >= 1"
        );
        assert!(self.thread_pool_size >= 1, "thread_pool_size must be >= 1");
        if let Some(factor) = self.time_factor {
            assert!(
                factor.is_finite() && factor > 0.0,
                "time_factor must be finite and positive, got {factor}"
            );
        }
        SchedulerConfig {
            service_name: self.service_name,
            main_queue_cache_time: self.main_queue_cache_time,
            max_pending_requests: self.max_pending_requests,
            max_attempts: self.max_attempts,
            delay_queue_count: self.delay_queue_count,
            max_sleep_step: self.max_sleep_step,
            request_early_processing_grace_period: self.request_early_processing_grace_period,
            thread_pool_size: self.thread_pool_size,
            rate_limit: self.rate_limit,
            rate_limit_interval: self.rate_limit_interval,
            rate_limit_burst: self.rate_limit_burst,
            time_factor: self.time_factor,
        }
    }
}

/// Parses a duration string with an `ms`, `s`, or `m` suffix (e.g. `"500ms"`,
/// `"2s"`, `"1m"`).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit) = if let Some(d) = s.strip_suffix("ms") {
        (d, "ms")
    } else if let Some(d) = s.strip_suffix('s') {
        (d, "s")
    } else if let Some(d) = s.strip_suffix('m') {
        (d, "m")
    } else {
        return Err(format!("duration '{s}' is missing a ms/s/m suffix"));
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("duration '{s}' has a non-integer magnitude"))?;
    Ok(match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        _ => unreachable!(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_successfully() {
        let cfg = SchedulerConfig::builder().build();
        assert_eq!(cfg.max_attempts(), 3);
        assert_eq!(cfg.delay_queue_count(), 4);
    }

    #[test]
    fn str_setters_parse_suffixed_durations() {
        let cfg = SchedulerConfig::builder()
            .max_sleep_step_str("250ms")
            .request_early_processing_grace_period_str("2s")
            .build();
        assert_eq!(cfg.max_sleep_step(), Duration::from_millis(250));
        assert_eq!(
            cfg.request_early_processing_grace_period(),
            Duration::from_secs(2)
        );
    }

    #[test]
    #[should_panic(expected = "max_attempts must be >= 1")]
    fn rejects_zero_max_attempts() {
        SchedulerConfig::builder().max_attempts(0).build();
    }

    #[test]
    #[should_panic(expected = "delay_queue_count must be >= 1")]
    fn rejects_zero_delay_queue_count() {
        SchedulerConfig::builder().delay_queue_count(0).build();
    }

    #[test]
    #[should_panic(expected = "time_factor must be finite and positive")]
    fn rejects_nonpositive_time_factor() {
        SchedulerConfig::builder().time_factor(Some(-1.0)).build();
    }

    #[test]
    fn parse_duration_accepts_all_suffixes() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn parse_duration_rejects_missing_suffix() {
        assert!(parse_duration("500").is_err());
    }
}
