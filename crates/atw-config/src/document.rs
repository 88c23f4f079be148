//! Serde model of the YAML configuration document.

use atw_core::{AttributeValue, RedactionPolicy};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Body encoding of a webhook request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// The rendered template is the body.
    #[default]
    Raw,
    /// `{"content": ..., "username": ...}` as expected by Discord webhooks.
    Discord,
}

impl PayloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Discord => "discord",
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    pub max_per_interval: u32,
    pub interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_interval: 5,
            interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the raw delay added as random jitter, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub cool_down_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down_ms: 30_000,
        }
    }
}

/// Settings applied to every webhook that does not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DefaultsConfig {
    pub queue_capacity: usize,
    pub timeout_ms: u64,
    pub content_type: String,
    pub format: PayloadFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub rate_limit_rechecks: u32,
    pub retry: RetryConfig,
    pub circuit: CircuitConfig,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            timeout_ms: 5000,
            content_type: "application/json".to_string(),
            format: PayloadFormat::Raw,
            username: None,
            rate_limit: RateLimitConfig::default(),
            rate_limit_rechecks: 10,
            retry: RetryConfig::default(),
            circuit: CircuitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DispatcherConfig {
    /// How long workers may keep flushing after `stop()` before being cancelled.
    pub shutdown_grace_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub fields: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fields: Vec::new(),
        }
    }
}

impl RedactionConfig {
    pub fn policy(&self) -> RedactionPolicy {
        RedactionPolicy::new(self.enabled, self.fields.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    pub log_webhook_failures: bool,
    pub warn_on_unresolved_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_webhook_failures: true,
            warn_on_unresolved_events: true,
        }
    }
}

/// What happens to an event kind that exceeds its admission limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowBehavior {
    /// Drop the excess events only.
    #[default]
    Drop,
    /// Mute the kind until the next reload.
    DisableEvent,
}

/// Admission limit applied on the host path, before any target is considered.
///
/// Kinds without a `per-event` entry share the `events-per-second` window.
/// A kind matched by a `per-event` pattern gets its own window; the most
/// specific pattern decides the limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EventRateLimitConfig {
    pub enabled: bool,
    pub events_per_second: u32,
    pub overflow_behavior: OverflowBehavior,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub per_event: BTreeMap<String, u32>,
}

impl Default for EventRateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            events_per_second: 100,
            overflow_behavior: OverflowBehavior::Drop,
            per_event: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RateLimitOverride {
    pub max_per_interval: Option<u32>,
    pub interval_ms: Option<u64>,
}

impl RateLimitOverride {
    pub fn apply(&self, base: RateLimitConfig) -> RateLimitConfig {
        RateLimitConfig {
            max_per_interval: self.max_per_interval.unwrap_or(base.max_per_interval),
            interval_ms: self.interval_ms.unwrap_or(base.interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RetryOverride {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub jitter: Option<f64>,
}

impl RetryOverride {
    pub fn apply(&self, base: RetryConfig) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_delay_ms: self.base_delay_ms.unwrap_or(base.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            jitter: self.jitter.unwrap_or(base.jitter),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CircuitOverride {
    pub failure_threshold: Option<u32>,
    pub cool_down_ms: Option<u64>,
}

impl CircuitOverride {
    pub fn apply(&self, base: CircuitConfig) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            cool_down_ms: self.cool_down_ms.unwrap_or(base.cool_down_ms),
        }
    }
}

/// Comparison operators of a single condition. Every operator that is set must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConditionOperators {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equals: Option<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greater_than: Option<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub less_than: Option<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greater_than_or_equal: Option<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub less_than_or_equal: Option<AttributeValue>,
}

/// A condition on one attribute.
///
/// ```yaml
/// conditions:
///   world.name: world               # equals
///   player.gamemode: [SURVIVAL, ADVENTURE]  # any of
///   damage.amount: { greater-than: 5 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    // Sequences must be tried before the operator struct, which also accepts them.
    AnyOf(Vec<AttributeValue>),
    Operators(ConditionOperators),
    Equals(AttributeValue),
}

/// One webhook as written in the document. Unset fields fall back to `defaults`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TargetConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    /// Patterns this webhook opts out of. Where an exclusion and a
    /// subscription both match a kind, the more specific pattern wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_events: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<PayloadFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_rechecks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit: Option<CircuitOverride>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, ConditionSpec>,
}

/// Webhooks keyed by id, in document order. Duplicate ids are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookEntries(Vec<(String, TargetConfig)>);

impl WebhookEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a webhook; returns false if the id is already taken.
    pub fn insert(&mut self, id: impl Into<String>, target: TargetConfig) -> bool {
        let id = id.into();
        if self.get(&id).is_some() {
            return false;
        }
        self.0.push((id, target));
        true
    }

    pub fn get(&self, id: &str) -> Option<&TargetConfig> {
        self.0
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, target)| target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TargetConfig)> {
        self.0.iter().map(|(id, target)| (id.as_str(), target))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for WebhookEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, target) in &self.0 {
            map.serialize_entry(id, target)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WebhookEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = WebhookEntries;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a mapping of webhook id to webhook")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(WebhookEntries::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut seen = HashSet::new();
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((id, target)) = access.next_entry::<String, TargetConfig>()? {
                    if !seen.insert(id.clone()) {
                        return Err(de::Error::custom(format!("duplicate webhook id '{}'", id)));
                    }
                    entries.push((id, target));
                }
                Ok(WebhookEntries(entries))
            }
        }

        deserializer.deserialize_any(EntriesVisitor)
    }
}

/// The whole configuration document. Reload replaces it as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WebhooksConfig {
    pub defaults: DefaultsConfig,
    pub dispatcher: DispatcherConfig,
    pub redaction: RedactionConfig,
    pub logging: LoggingConfig,
    pub event_rate_limit: EventRateLimitConfig,
    pub webhooks: WebhookEntries,
}
