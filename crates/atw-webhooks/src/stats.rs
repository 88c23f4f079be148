//! Delivery counters exposed to observability and admin tooling.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

macro_rules! counters {
    ($(#[$meta:meta])* $counters:ident => $snapshot:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $counters {
            $(pub $field: AtomicU64,)+
        }

        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        pub struct $snapshot {
            $(pub $field: u64,)+
        }

        impl $counters {
            pub fn snapshot(&self) -> $snapshot {
                $snapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)+
                }
            }
        }
    };
}

counters!(
    /// Per-target counters. Every queue entry ends in exactly one of
    /// `delivered`, `dropped_*` or `discarded_on_shutdown`.
    TargetCounters => TargetStats {
        enqueued,
        http_calls,
        delivered,
        failed_attempts,
        retries,
        dropped_queue_full,
        dropped_rate_limited,
        dropped_retry_exhausted,
        dropped_circuit_open,
        discarded_on_shutdown,
        filtered,
        build_failures,
    }
);

counters!(
    DispatcherCounters => DispatcherTotals {
        events_received,
        events_skipped,
        events_unrouted,
        events_rate_limited,
    }
);

counters!(
    /// Per event kind, summed over targets. `dropped` is every routing to a
    /// target that ends undelivered for a reason other than rate limiting;
    /// `failed` counts failed HTTP attempts.
    EventCounters => EventStats {
        delivered,
        failed,
        dropped,
        rate_limited,
    }
);

/// [`EventCounters`] keyed by event kind, created on first use.
#[derive(Debug, Default)]
pub struct EventKindCounters {
    kinds: RwLock<HashMap<String, Arc<EventCounters>>>,
}

impl EventKindCounters {
    pub fn kind(&self, kind: &str) -> Arc<EventCounters> {
        if let Some(counters) = self
            .kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
        {
            return counters.clone();
        }
        self.kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind.to_string())
            .or_default()
            .clone()
    }

    pub fn snapshot(&self) -> BTreeMap<String, EventStats> {
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(kind, counters)| (kind.clone(), counters.snapshot()))
            .collect()
    }
}

/// Increment a counter by one.
#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Add `n` to a counter.
#[inline]
pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetStatsEntry {
    pub id: String,
    #[serde(flatten)]
    pub stats: TargetStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    #[serde(flatten)]
    pub totals: DispatcherTotals,
    /// Current targets, in configuration order.
    pub targets: Vec<TargetStatsEntry>,
    /// Every event kind seen since startup.
    pub events: BTreeMap<String, EventStats>,
}

impl DispatcherStats {
    pub fn target(&self, id: &str) -> Option<&TargetStats> {
        self.targets
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| &entry.stats)
    }

    pub fn event(&self, kind: &str) -> Option<&EventStats> {
        self.events.get(kind)
    }
}
