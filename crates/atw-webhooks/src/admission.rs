//! Host-side admission limit per event kind.
//!
//! Checked once per event before any target sees it. Kinds without an
//! override share one window; an overridden kind gets its own.

use crate::rate_limit::{RateLimitPolicy, TokenBucket};
use atw_config::{EventRateLimitConfig, OverflowBehavior};
use atw_core::most_specific;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionSettings {
    pub enabled: bool,
    pub events_per_second: u32,
    pub overflow: OverflowBehavior,
    /// `(pattern, events per second)`, most specific pattern wins.
    pub per_event: Vec<(String, u32)>,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self::from(&EventRateLimitConfig::default())
    }
}

impl From<&EventRateLimitConfig> for AdmissionSettings {
    fn from(config: &EventRateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            events_per_second: config.events_per_second,
            overflow: config.overflow_behavior,
            per_event: config
                .per_event
                .iter()
                .map(|(pattern, limit)| (pattern.clone(), *limit))
                .collect(),
        }
    }
}

impl AdmissionSettings {
    /// Admit everything.
    pub fn unlimited() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// The per-kind override for `kind`, if any pattern matches it.
    pub fn override_for(&self, kind: &str) -> Option<u32> {
        most_specific(&self.per_event, kind, |(pattern, _)| pattern.as_str())
            .map(|(_, limit)| *limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admitted,
    /// Over the limit. `muted` is set when this event disabled its kind.
    Limited { muted: bool },
    /// The kind was disabled by an earlier overflow.
    Disabled,
}

fn per_second(limit: u32) -> RateLimitPolicy {
    RateLimitPolicy {
        max_per_interval: limit.max(1),
        interval: Duration::from_secs(1),
    }
}

/// Limiter state for one configuration. A reload builds a fresh one, which
/// also lifts every `disable-event` mute.
#[derive(Debug)]
pub struct AdmissionControl {
    settings: AdmissionSettings,
    shared: Mutex<TokenBucket>,
    per_kind: Mutex<HashMap<String, TokenBucket>>,
    muted: Mutex<HashSet<String>>,
}

impl AdmissionControl {
    pub fn new(settings: AdmissionSettings) -> Self {
        let shared = TokenBucket::new(per_second(settings.events_per_second), Instant::now());
        Self {
            settings,
            shared: Mutex::new(shared),
            per_kind: Mutex::new(HashMap::new()),
            muted: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &AdmissionSettings {
        &self.settings
    }

    pub fn is_muted(&self, kind: &str) -> bool {
        self.muted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(kind)
    }

    pub fn admit(&self, kind: &str, now: Instant) -> AdmissionDecision {
        if !self.settings.enabled {
            return AdmissionDecision::Admitted;
        }
        if self.is_muted(kind) {
            return AdmissionDecision::Disabled;
        }

        let acquired = match self.settings.override_for(kind) {
            Some(limit) => self
                .per_kind
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(kind.to_string())
                .or_insert_with(|| TokenBucket::new(per_second(limit), now))
                .try_acquire(now)
                .is_ok(),
            None => self
                .shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .try_acquire(now)
                .is_ok(),
        };
        if acquired {
            return AdmissionDecision::Admitted;
        }

        let muted = self.settings.overflow == OverflowBehavior::DisableEvent
            && self
                .muted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(kind.to_string());
        AdmissionDecision::Limited { muted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(yaml: &str) -> AdmissionControl {
        let config: EventRateLimitConfig = serde_yaml::from_str(yaml).unwrap();
        AdmissionControl::new(AdmissionSettings::from(&config))
    }

    #[test]
    fn test_shared_window_across_kinds() {
        let control = control("events-per-second: 2");
        let now = Instant::now();
        assert_eq!(control.admit("player.join", now), AdmissionDecision::Admitted);
        assert_eq!(control.admit("player.quit", now), AdmissionDecision::Admitted);
        assert_eq!(
            control.admit("player.join", now),
            AdmissionDecision::Limited { muted: false }
        );
        assert_eq!(
            control.admit("player.join", now + Duration::from_secs(1)),
            AdmissionDecision::Admitted
        );
    }

    #[test]
    fn test_override_gets_its_own_window() {
        let control = control("events-per-second: 1\nper-event:\n  player: 5\n  player.chat: 2\n");
        let now = Instant::now();
        assert_eq!(control.settings().override_for("player.chat"), Some(2));
        assert_eq!(control.settings().override_for("player.join"), Some(5));
        assert_eq!(control.settings().override_for("server.enable"), None);

        assert_eq!(control.admit("player.chat", now), AdmissionDecision::Admitted);
        assert_eq!(control.admit("player.chat", now), AdmissionDecision::Admitted);
        assert!(matches!(
            control.admit("player.chat", now),
            AdmissionDecision::Limited { .. }
        ));
        // The shared window is untouched by overridden kinds
        assert_eq!(control.admit("server.enable", now), AdmissionDecision::Admitted);
    }

    #[test]
    fn test_disable_event_mutes_until_rebuilt() {
        let control = control("events-per-second: 1\noverflow-behavior: disable-event");
        let now = Instant::now();
        assert_eq!(control.admit("player.chat", now), AdmissionDecision::Admitted);
        assert_eq!(
            control.admit("player.chat", now),
            AdmissionDecision::Limited { muted: true }
        );
        assert!(control.is_muted("player.chat"));
        assert_eq!(
            control.admit("player.chat", now + Duration::from_secs(10)),
            AdmissionDecision::Disabled
        );

        let rebuilt = AdmissionControl::new(control.settings().clone());
        assert_eq!(
            rebuilt.admit("player.chat", now + Duration::from_secs(10)),
            AdmissionDecision::Admitted
        );
    }

    #[test]
    fn test_disabled_admits_everything() {
        let control = AdmissionControl::new(AdmissionSettings::unlimited());
        let now = Instant::now();
        for _ in 0..1000 {
            assert_eq!(control.admit("player.move", now), AdmissionDecision::Admitted);
        }
        assert!(AdmissionSettings::default().enabled);
    }
}
