//! Reconnect backoff policy.

use std::time::Duration;

/// Exponential backoff with a cap and a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after a drop before giving up. `0` disables reconnecting.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt` (zero-based), or `None` once the
    /// attempts are exhausted.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        if self.initial_delay.is_zero() {
            return Some(Duration::ZERO);
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay = Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 8,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
        };
        let delays: Vec<_> = (0..8).filter_map(|a| policy.delay_for_attempt(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn exhausted_after_max_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(1)));
        assert!(policy.delay_for_attempt(4).is_some());
        assert_eq!(policy.delay_for_attempt(5), None);
        assert_eq!(RetryPolicy::disabled().delay_for_attempt(0), None);
    }

    #[test]
    fn huge_attempt_numbers_stay_capped() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(
            policy.delay_for_attempt(10_000),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn huge_delays_saturate_at_the_cap() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            initial_delay: Duration::from_secs(u64::MAX / 2),
            max_delay: Duration::from_secs(60),
            multiplier: 10.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(60)));
        assert_eq!(policy.delay_for_attempt(400), Some(Duration::from_secs(60)));
    }
}
