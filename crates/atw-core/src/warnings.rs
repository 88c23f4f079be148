use std::collections::HashSet;
use std::sync::Mutex;
use tracing::warn;

/// Emits each distinct warning once per process, keyed by `key`.
///
/// Used on hot paths (per-event template rendering, routing) where the same
/// misconfiguration would otherwise be logged for every event.
#[derive(Debug, Default)]
pub struct WarningTracker {
    emitted: Mutex<HashSet<String>>,
}

impl WarningTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `message` unless a warning with the same key was already logged.
    /// Returns true if the warning was emitted.
    pub fn warn_once(&self, key: &str, message: &str) -> bool {
        let mut emitted = self
            .emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !emitted.insert(key.to_string()) {
            return false;
        }
        drop(emitted);
        warn!("{}", message);
        true
    }

    /// Forget everything emitted so far, e.g. after a configuration reload.
    pub fn reset(&self) {
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_per_key() {
        let tracker = WarningTracker::new();
        assert!(tracker.warn_once("missing:a", "first"));
        assert!(!tracker.warn_once("missing:a", "second"));
        assert!(tracker.warn_once("missing:b", "other"));

        tracker.reset();
        assert!(tracker.warn_once("missing:a", "again"));
    }
}
