use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;

use super::error::StreamError;

/// Tags retried out of the box, on top of the transient network conditions.
pub const DEFAULT_RETRYABLE_TAGS: [&str; 4] =
    ["network_error", "timeout", "server_error", "temporary_failure"];

/// Decision returned by the retry policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Error is not retryable; stop now without consuming further attempts.
    Fatal,
    /// Error is retryable but the attempt budget is spent.
    Exhausted,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with a cap, jitter, and retryable-error tags.
///
/// Shared read-only (`Arc<RetryPolicy>`) by every stream of a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the pre-jitter delay.
    pub max_delay: Duration,
    /// Multiplicative growth per attempt.
    pub backoff_factor: f64,
    /// Retries allowed after the first attempt; `max_retries + 1` attempts in total.
    pub max_retries: u32,
    /// Fraction of the computed delay added as uniform random noise (0..=1).
    pub jitter_fraction: f64,
    /// Error tags (see `StreamError::tag`) that are retried.
    pub retryable_tags: BTreeSet<String>,
    /// Health-check cadence of the stream monitor.
    pub heartbeat_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_retries: 10,
            jitter_fraction: 0.1,
            retryable_tags: DEFAULT_RETRYABLE_TAGS.iter().map(|t| t.to_string()).collect(),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Check the invariants the delay computation relies on.
    pub fn validate(&self) -> Result<(), StreamError> {
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(StreamError::Config(format!(
                "jitter_fraction must be within 0..=1, got {}",
                self.jitter_fraction
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(StreamError::Config(format!(
                "initial_delay ({:?}) exceeds max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(StreamError::Config(format!(
                "backoff_factor must be a finite value >= 1, got {}",
                self.backoff_factor
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(StreamError::Config("heartbeat_interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Pre-jitter delay for a 0-based attempt index: `initial * factor^index`, capped.
    pub fn base_delay(&self, attempt_index: u32) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let exp = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let raw = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        // Overflow (inf) or a nonsensical factor (NaN) saturate at the cap.
        let secs = if raw.is_finite() { raw.min(max) } else { max };
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay before the next attempt, with jitter drawn from the thread RNG.
    pub fn compute_delay(&self, attempt_index: u32) -> Duration {
        let unit: f64 = rand::rng().random();
        self.delay_with_sample(attempt_index, unit)
    }

    /// `compute_delay` with the uniform sample supplied by the caller (0..1).
    pub fn delay_with_sample(&self, attempt_index: u32, unit: f64) -> Duration {
        let base = self.base_delay(attempt_index);
        let fraction = if self.jitter_fraction.is_finite() {
            self.jitter_fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let unit = if unit.is_finite() { unit.clamp(0.0, 1.0) } else { 0.0 };
        base + Duration::from_secs_f64(base.as_secs_f64() * fraction * unit)
    }

    /// True when the error is worth another attempt.
    ///
    /// Transient network conditions always are; other errors only when their
    /// tag is configured. Terminal errors never are.
    pub fn is_retryable(&self, err: &StreamError) -> bool {
        if err.is_terminal() {
            return false;
        }
        if let StreamError::Transport { kind, .. } = err {
            if kind.is_transient() {
                return true;
            }
        }
        self.retryable_tags.contains(err.tag())
    }

    /// Decide what to do after the attempt at `attempt_index` (0-based) failed.
    pub fn decide(&self, attempt_index: u32, err: &StreamError) -> RetryDecision {
        if !self.is_retryable(err) {
            return RetryDecision::Fatal;
        }
        if attempt_index >= self.max_retries {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.compute_delay(attempt_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::TransportKind;

    fn scenario_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            max_retries: 3,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn default_values() {
        let p = RetryPolicy::default();
        assert_eq!(p.initial_delay, Duration::from_secs(1));
        assert_eq!(p.max_delay, Duration::from_secs(30));
        assert_eq!(p.max_retries, 10);
        assert!((p.backoff_factor - 2.0).abs() < 1e-9);
        assert!((p.jitter_fraction - 0.1).abs() < 1e-9);
        assert_eq!(p.heartbeat_interval, Duration::from_secs(30));
        assert!(p.retryable_tags.contains("server_error"));
        p.validate().unwrap();
    }

    #[test]
    fn base_delays_double_then_cap() {
        let p = scenario_policy();
        assert_eq!(p.base_delay(0), Duration::from_secs(1));
        assert_eq!(p.base_delay(1), Duration::from_secs(2));
        assert_eq!(p.base_delay(2), Duration::from_secs(4));
        assert_eq!(p.base_delay(3), Duration::from_secs(8));
        assert_eq!(p.base_delay(4), Duration::from_secs(10));
        assert_eq!(p.base_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn compute_delay_within_bounds_and_non_decreasing_before_cap() {
        let p = RetryPolicy::default();
        let upper = p.max_delay.as_secs_f64() * (1.0 + p.jitter_fraction);
        let mut prev_base = Duration::ZERO;
        for attempt in 0..64 {
            let d = p.compute_delay(attempt);
            assert!(d.as_secs_f64() <= upper + 1e-9, "attempt {attempt}: {d:?}");
            // Lowest and highest jitter samples bracket the random one.
            let lo = p.delay_with_sample(attempt, 0.0);
            let hi = p.delay_with_sample(attempt, 1.0);
            assert!(lo <= d && d <= hi);
            assert!(lo >= prev_base);
            prev_base = lo;
        }
    }

    #[test]
    fn overflowing_growth_saturates() {
        let p = RetryPolicy {
            backoff_factor: 1e300,
            ..RetryPolicy::default()
        };
        assert_eq!(p.base_delay(10), p.max_delay);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut p = RetryPolicy::default();
        p.jitter_fraction = 1.5;
        assert!(p.validate().is_err());

        let mut p = RetryPolicy::default();
        p.initial_delay = Duration::from_secs(60);
        assert!(p.validate().is_err());

        let mut p = RetryPolicy::default();
        p.backoff_factor = f64::NAN;
        assert!(p.validate().is_err());

        let mut p = RetryPolicy::default();
        p.heartbeat_interval = Duration::ZERO;
        assert!(p.validate().is_err());
    }

    #[test]
    fn transient_transport_errors_always_retryable() {
        let mut p = RetryPolicy::default();
        p.retryable_tags.clear();
        let err = StreamError::transport(TransportKind::ConnectionRefused, "refused");
        assert!(p.is_retryable(&err));
        let err = StreamError::transport(TransportKind::Other, "bad tls");
        assert!(!p.is_retryable(&err));
    }

    #[test]
    fn status_retryability_follows_tags() {
        let p = RetryPolicy::default();
        assert!(p.is_retryable(&StreamError::Status { code: 503 }));
        assert!(p.is_retryable(&StreamError::Status { code: 500 }));
        assert!(!p.is_retryable(&StreamError::Status { code: 404 }));
        assert!(!p.is_retryable(&StreamError::Protocol {
            content_type: Some("text/html".into())
        }));

        let mut p = p;
        p.retryable_tags.insert("protocol_error".into());
        assert!(p.is_retryable(&StreamError::Protocol { content_type: None }));
    }

    #[test]
    fn is_retryable_is_pure() {
        let p = RetryPolicy::default();
        let err = StreamError::Status { code: 502 };
        let first = p.is_retryable(&err);
        for _ in 0..10 {
            assert_eq!(p.is_retryable(&err), first);
        }
    }

    #[test]
    fn terminal_errors_never_retried() {
        let mut p = RetryPolicy::default();
        p.retryable_tags.insert("fatal".into());
        p.retryable_tags.insert("cancelled".into());
        assert!(!p.is_retryable(&StreamError::Cancelled));
        assert!(!p.is_retryable(&StreamError::Status { code: 404 }.into_fatal()));
    }

    #[test]
    fn respects_max_retries() {
        let p = scenario_policy();
        let err = StreamError::transport(TransportKind::Timeout, "timed out");
        for attempt in 0..3 {
            assert!(matches!(p.decide(attempt, &err), RetryDecision::RetryAfter(_)));
        }
        assert_eq!(p.decide(3, &err), RetryDecision::Exhausted);
        assert_eq!(
            p.decide(0, &StreamError::Status { code: 401 }),
            RetryDecision::Fatal
        );
    }
}
