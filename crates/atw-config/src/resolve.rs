use crate::document::{
    CircuitConfig, ConditionSpec, DefaultsConfig, EventRateLimitConfig, PayloadFormat,
    RateLimitConfig, RetryConfig, TargetConfig, WebhooksConfig,
};
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

/// Template used when a webhook does not declare one.
pub const DEFAULT_TEMPLATE: &str = "{event.name}";

/// A webhook with every default applied and every structural check passed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
    pub exclude_events: Vec<String>,
    pub template: String,
    pub format: PayloadFormat,
    pub username: Option<String>,
    pub content_type: String,
    pub headers: BTreeMap<String, String>,
    pub secret: Option<String>,
    pub timeout_ms: u64,
    pub queue_capacity: usize,
    pub rate_limit: RateLimitConfig,
    pub rate_limit_rechecks: u32,
    pub retry: RetryConfig,
    pub circuit: CircuitConfig,
    pub conditions: BTreeMap<String, ConditionSpec>,
}

impl WebhooksConfig {
    /// Parse a document from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize the document to YAML text
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Read, parse and validate a document from disk
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        info!(
            "Loaded {} webhook(s) from {}",
            config.webhooks.len(),
            path.display()
        );
        Ok(config)
    }

    /// Structural validation of the defaults and every webhook.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolved_targets().map(|_| ())
    }

    /// Every webhook with defaults applied, in document order.
    pub fn resolved_targets(&self) -> Result<Vec<ResolvedTarget>, ConfigError> {
        validate_defaults(&self.defaults)?;
        validate_event_rate_limit(&self.event_rate_limit)?;
        self.webhooks
            .iter()
            .map(|(id, target)| resolve_target(id, target, &self.defaults))
            .collect()
    }
}

fn validate_defaults(defaults: &DefaultsConfig) -> Result<(), ConfigError> {
    check_limits(
        defaults.queue_capacity,
        defaults.timeout_ms,
        &defaults.rate_limit,
        &defaults.retry,
        &defaults.circuit,
    )
    .map_err(ConfigError::InvalidDefaults)
}

fn validate_event_rate_limit(config: &EventRateLimitConfig) -> Result<(), ConfigError> {
    if config.events_per_second == 0 {
        return Err(ConfigError::InvalidEventRateLimit(
            "events-per-second must be at least 1".to_string(),
        ));
    }
    for (pattern, limit) in &config.per_event {
        if is_invalid_pattern(pattern) {
            return Err(ConfigError::InvalidEventRateLimit(format!(
                "invalid event pattern '{}'",
                pattern
            )));
        }
        if *limit == 0 {
            return Err(ConfigError::InvalidEventRateLimit(format!(
                "limit for '{}' must be at least 1",
                pattern
            )));
        }
    }
    Ok(())
}

fn is_invalid_pattern(pattern: &str) -> bool {
    pattern.trim().is_empty() || pattern.trim().split('.').any(str::is_empty)
}

fn resolve_target(
    id: &str,
    target: &TargetConfig,
    defaults: &DefaultsConfig,
) -> Result<ResolvedTarget, ConfigError> {
    if id.trim().is_empty() {
        return Err(ConfigError::invalid_target(id, "webhook id must not be empty"));
    }
    validate_url(&target.url).map_err(|reason| ConfigError::invalid_target(id, reason))?;

    if target.events.is_empty() {
        return Err(ConfigError::invalid_target(
            id,
            "at least one event pattern is required",
        ));
    }
    if let Some(pattern) = target
        .events
        .iter()
        .chain(&target.exclude_events)
        .find(|pattern| is_invalid_pattern(pattern))
    {
        return Err(ConfigError::invalid_target(
            id,
            format!("invalid event pattern '{}'", pattern),
        ));
    }

    let resolved = ResolvedTarget {
        id: id.to_string(),
        url: target.url.clone(),
        events: target.events.iter().map(|e| e.trim().to_string()).collect(),
        exclude_events: target
            .exclude_events
            .iter()
            .map(|e| e.trim().to_string())
            .collect(),
        template: target
            .template
            .clone()
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        format: target.format.unwrap_or(defaults.format),
        username: target.username.clone().or_else(|| defaults.username.clone()),
        content_type: target
            .content_type
            .clone()
            .unwrap_or_else(|| defaults.content_type.clone()),
        headers: target.headers.clone(),
        secret: target.secret.clone().filter(|s| !s.is_empty()),
        timeout_ms: target.timeout_ms.unwrap_or(defaults.timeout_ms),
        queue_capacity: target.queue_capacity.unwrap_or(defaults.queue_capacity),
        rate_limit: target
            .rate_limit
            .map(|o| o.apply(defaults.rate_limit))
            .unwrap_or(defaults.rate_limit),
        rate_limit_rechecks: target
            .rate_limit_rechecks
            .unwrap_or(defaults.rate_limit_rechecks),
        retry: target
            .retry
            .map(|o| o.apply(defaults.retry))
            .unwrap_or(defaults.retry),
        circuit: target
            .circuit
            .map(|o| o.apply(defaults.circuit))
            .unwrap_or(defaults.circuit),
        conditions: target.conditions.clone(),
    };

    check_limits(
        resolved.queue_capacity,
        resolved.timeout_ms,
        &resolved.rate_limit,
        &resolved.retry,
        &resolved.circuit,
    )
    .map_err(|reason| ConfigError::invalid_target(id, reason))?;

    debug!("Resolved webhook {} for {:?}", id, resolved.events);
    Ok(resolved)
}

fn validate_url(raw: &str) -> Result<(), String> {
    if raw.trim().is_empty() {
        return Err("url is required".to_string());
    }
    let parsed = Url::parse(raw).map_err(|e| format!("invalid url: {}", e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported url scheme '{}'", other)),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("url has no host".to_string());
    }
    Ok(())
}

fn check_limits(
    queue_capacity: usize,
    timeout_ms: u64,
    rate_limit: &RateLimitConfig,
    retry: &RetryConfig,
    circuit: &CircuitConfig,
) -> Result<(), String> {
    if queue_capacity == 0 {
        return Err("queue-capacity must be at least 1".to_string());
    }
    if timeout_ms == 0 {
        return Err("timeout-ms must be at least 1".to_string());
    }
    if rate_limit.max_per_interval == 0 || rate_limit.interval_ms == 0 {
        return Err("rate-limit max-per-interval and interval-ms must be at least 1".to_string());
    }
    if retry.max_attempts == 0 {
        return Err("retry max-attempts must be at least 1".to_string());
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(format!(
            "retry base-delay-ms ({}) exceeds max-delay-ms ({})",
            retry.base_delay_ms, retry.max_delay_ms
        ));
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        return Err(format!("retry jitter {} must be within [0, 1]", retry.jitter));
    }
    if circuit.failure_threshold == 0 {
        return Err("circuit failure-threshold must be at least 1".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://discord.com/api/webhooks/1/x").is_ok());
        assert!(validate_url("http://127.0.0.1:9000/hook").is_ok());
        assert_eq!(validate_url(""), Err("url is required".to_string()));
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_event_rate_limit_validation() {
        let mut config = EventRateLimitConfig::default();
        assert!(validate_event_rate_limit(&config).is_ok());

        config.per_event.insert("player.chat".into(), 0);
        assert!(validate_event_rate_limit(&config).is_err());

        config.per_event.clear();
        config.per_event.insert("player..chat".into(), 5);
        assert!(validate_event_rate_limit(&config).is_err());

        let zero = EventRateLimitConfig {
            events_per_second: 0,
            ..Default::default()
        };
        assert!(matches!(
            validate_event_rate_limit(&zero),
            Err(ConfigError::InvalidEventRateLimit(_))
        ));
    }

    #[test]
    fn test_nan_jitter_rejected() {
        let retry = RetryConfig {
            jitter: f64::NAN,
            ..Default::default()
        };
        assert!(check_limits(
            1,
            1,
            &RateLimitConfig::default(),
            &retry,
            &CircuitConfig::default()
        )
        .is_err());
    }
}
