use atw_config::RateLimitConfig;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_per_interval: u32,
    pub interval: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(RateLimitConfig::default())
    }
}

impl From<RateLimitConfig> for RateLimitPolicy {
    fn from(config: RateLimitConfig) -> Self {
        Self {
            max_per_interval: config.max_per_interval,
            interval: Duration::from_millis(config.interval_ms),
        }
    }
}

/// Token bucket owned by a single delivery worker.
///
/// Holds up to `max_per_interval` tokens and refills continuously at
/// `max_per_interval / interval`. Starts full.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    policy: RateLimitPolicy,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(policy: RateLimitPolicy, now: Instant) -> Self {
        Self {
            policy,
            tokens: f64::from(policy.max_per_interval),
            last_refill: now,
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    fn capacity(&self) -> f64 {
        f64::from(self.policy.max_per_interval.max(1))
    }

    /// Tokens per second.
    fn rate(&self) -> f64 {
        let secs = self.policy.interval.as_secs_f64();
        if secs <= 0.0 {
            f64::INFINITY
        } else {
            self.capacity() / secs
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate()).min(self.capacity());
        self.last_refill = now;
    }

    /// Take one token, or return how long until one is available.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - self.tokens) / self.rate();
            Err(Duration::from_secs_f64(wait).max(Duration::from_millis(1)))
        }
    }
}
