//! Per-target circuit breaker.
//!
//! ```text
//!   Closed ──(threshold consecutive failures)──▶ Open
//!     ▲                                           │
//!     │ success                        cool-down elapsed
//!     │                                           ▼
//!     └──────────────────────────────────────── HalfOpen ──(failure)──▶ Open (timer reset)
//! ```
//!
//! The breaker is owned by its target's delivery worker; readers get
//! snapshots through a `watch` channel.

use atw_config::CircuitConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitPolicy {
    pub failure_threshold: u32,
    pub cool_down: Duration,
}

impl Default for CircuitPolicy {
    fn default() -> Self {
        Self::from(CircuitConfig::default())
    }
}

impl From<CircuitConfig> for CircuitPolicy {
    fn from(config: CircuitConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            cool_down: Duration::from_millis(config.cool_down_ms),
        }
    }
}

/// Read-only view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
}

impl Default for CircuitSnapshot {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Admission decision for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// First admission after the cool-down; the circuit is now half-open.
    Probe,
    Rejected { retry_in: Duration },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    target_id: String,
    policy: CircuitPolicy,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    publisher: Arc<watch::Sender<CircuitSnapshot>>,
}

impl CircuitBreaker {
    pub fn new(target_id: impl Into<String>, policy: CircuitPolicy) -> Self {
        let (sender, _) = watch::channel(CircuitSnapshot::default());
        Self::with_publisher(target_id, policy, Arc::new(sender))
    }

    /// A breaker that publishes its snapshots through an existing channel.
    pub fn with_publisher(
        target_id: impl Into<String>,
        policy: CircuitPolicy,
        publisher: Arc<watch::Sender<CircuitSnapshot>>,
    ) -> Self {
        let breaker = Self {
            target_id: target_id.into(),
            policy,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            publisher,
        };
        breaker.publish();
        breaker
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn policy(&self) -> CircuitPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: CircuitPolicy) {
        self.policy = policy;
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            opened_at: self.opened_at,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CircuitSnapshot> {
        self.publisher.subscribe()
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot());
    }

    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => Admission::Allowed,
            CircuitState::Open => {
                let opened_at = self.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= self.policy.cool_down {
                    self.state = CircuitState::HalfOpen;
                    info!(
                        "Circuit for webhook {} is half-open, probing endpoint",
                        self.target_id
                    );
                    self.publish();
                    Admission::Probe
                } else {
                    Admission::Rejected {
                        retry_in: self.policy.cool_down - elapsed,
                    }
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        let was = self.state;
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
        self.opened_at = None;
        if was != CircuitState::Closed {
            info!("✅ Circuit for webhook {} closed", self.target_id);
        }
        self.publish();
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                warn!(
                    "Circuit for webhook {} re-opened after failed probe",
                    self.target_id
                );
            }
            CircuitState::Closed if self.consecutive_failures >= self.policy.failure_threshold => {
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                warn!(
                    "Circuit for webhook {} opened after {} consecutive failures",
                    self.target_id, self.consecutive_failures
                );
            }
            _ => {}
        }
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitPolicy {
                failure_threshold: 3,
                cool_down: Duration::from_secs(10),
            },
        )
    }

    #[test]
    fn test_opens_after_threshold() {
        let mut breaker = breaker();
        let now = Instant::now();
        breaker.record_failure(now);
        breaker.record_failure(now);
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure(now);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(
            breaker.admit(now + Duration::from_secs(1)),
            Admission::Rejected { retry_in } if retry_in == Duration::from_secs(9)
        ));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut breaker = breaker();
        let now = Instant::now();
        breaker.record_failure(now);
        breaker.record_failure(now);
        breaker.record_success();
        breaker.record_failure(now);
        breaker.record_failure(now);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 2);
    }

    #[test]
    fn test_half_open_success_closes() {
        let mut breaker = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }
        let later = now + Duration::from_secs(10);
        assert_eq!(breaker.admit(later), Admission::Probe);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.admit(later), Admission::Allowed);
    }

    #[test]
    fn test_half_open_failure_reopens_and_resets_timer() {
        let mut breaker = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }
        let probe_at = now + Duration::from_secs(15);
        assert_eq!(breaker.admit(probe_at), Admission::Probe);
        breaker.record_failure(probe_at);
        assert_eq!(breaker.state(), CircuitState::Open);

        // Cool-down counts from the failed probe, not the first opening
        assert!(matches!(
            breaker.admit(probe_at + Duration::from_secs(5)),
            Admission::Rejected { .. }
        ));
        assert_eq!(
            breaker.admit(probe_at + Duration::from_secs(10)),
            Admission::Probe
        );
    }

    #[test]
    fn test_snapshots_are_published() {
        let mut breaker = breaker();
        let receiver = breaker.subscribe();
        let now = Instant::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }
        let snapshot = *receiver.borrow();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.opened_at, Some(now));
    }

    #[test]
    fn test_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }
}
