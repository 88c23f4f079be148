//! Exponential backoff with upward-only jitter.
//!
//! The raw delay for attempt `n` (1-based) is `min(base * 2^(n-1), max)`.
//! Jitter adds a random `[0, raw * jitter)` on top and the result is capped
//! at `max` again, so successive delays never decrease.

use atw_config::RetryConfig;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter fraction in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(RetryConfig::default())
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// True if a delivery that just failed its `attempt`-th try may be retried.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay after the `attempt`-th failure, without jitter.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay after the `attempt`-th failure, with jitter drawn from `rng`.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let raw = self.raw_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || raw.is_zero() {
            return raw;
        }
        let extra = raw.mul_f64(rng.gen::<f64>() * jitter);
        raw.saturating_add(extra).min(self.max_delay)
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter,
        }
    }

    #[test]
    fn test_raw_delay_doubles_and_caps() {
        let policy = policy(0.0);
        assert_eq!(policy.raw_delay(1), Duration::from_millis(100));
        assert_eq!(policy.raw_delay(2), Duration::from_millis(200));
        assert_eq!(policy.raw_delay(3), Duration::from_millis(400));
        assert_eq!(policy.raw_delay(4), Duration::from_millis(800));
        assert_eq!(policy.raw_delay(5), Duration::from_millis(1000));
        assert_eq!(policy.raw_delay(64), Duration::from_millis(1000));
    }

    #[test]
    fn test_jittered_delays_are_non_decreasing_and_capped() {
        let policy = policy(1.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut previous = Duration::ZERO;
            for attempt in 1..=10 {
                let delay = policy.delay_with_rng(attempt, &mut rng);
                assert!(delay >= previous, "attempt {} went down", attempt);
                assert!(delay <= policy.max_delay);
                assert!(delay >= policy.raw_delay(attempt));
                previous = delay;
            }
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..policy(0.0)
        };
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }
}
