use crate::circuit::CircuitPolicy;
use crate::conditions::Conditions;
use crate::error::RegistryError;
use crate::rate_limit::RateLimitPolicy;
use crate::retry::RetryPolicy;
use crate::template::Template;
use atw_config::{PayloadFormat, ResolvedTarget};
use atw_core::{best_match, mask_url};
use reqwest::header::{HeaderName, HeaderValue};
use std::time::Duration;

/// A configured webhook destination and its delivery policy.
///
/// Immutable once built; a reload builds new targets and swaps them in.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    id: String,
    url: String,
    masked_url: String,
    event_kinds: Vec<String>,
    excluded_kinds: Vec<String>,
    template: Template,
    format: PayloadFormat,
    username: Option<String>,
    content_type: String,
    headers: Vec<(String, String)>,
    secret: Option<String>,
    timeout: Duration,
    queue_capacity: usize,
    rate_limit: RateLimitPolicy,
    rate_limit_rechecks: u32,
    retry: RetryPolicy,
    circuit: CircuitPolicy,
    conditions: Conditions,
}

impl WebhookTarget {
    /// Build a target from a resolved configuration entry, compiling its template.
    pub fn from_resolved(resolved: ResolvedTarget) -> Result<Self, RegistryError> {
        let template =
            Template::parse(&resolved.template).map_err(|source| RegistryError::Template {
                target: resolved.id.clone(),
                source,
            })?;

        for (name, value) in &resolved.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err()
                || HeaderValue::from_str(value).is_err()
            {
                return Err(RegistryError::InvalidHeader {
                    target: resolved.id.clone(),
                    header: name.clone(),
                });
            }
        }
        if HeaderValue::from_str(&resolved.content_type).is_err() {
            return Err(RegistryError::InvalidHeader {
                target: resolved.id.clone(),
                header: "Content-Type".to_string(),
            });
        }

        let event_kinds = dedup(resolved.events);
        let excluded_kinds = dedup(resolved.exclude_events);

        Ok(Self {
            masked_url: mask_url(&resolved.url),
            id: resolved.id,
            url: resolved.url,
            event_kinds,
            excluded_kinds,
            template,
            format: resolved.format,
            username: resolved.username,
            content_type: resolved.content_type,
            headers: resolved.headers.into_iter().collect(),
            secret: resolved.secret,
            timeout: Duration::from_millis(resolved.timeout_ms),
            queue_capacity: resolved.queue_capacity,
            rate_limit: resolved.rate_limit.into(),
            rate_limit_rechecks: resolved.rate_limit_rechecks,
            retry: resolved.retry.into(),
            circuit: resolved.circuit.into(),
            conditions: Conditions::new(resolved.conditions),
        })
    }

    /// True if the most specific pattern matching `kind` is a subscription.
    /// An exclusion as specific as the best subscription wins the tie.
    pub fn accepts(&self, kind: &str) -> bool {
        let Some(subscribed) = best_match(self.event_kinds.iter().map(String::as_str), kind)
        else {
            return false;
        };
        match best_match(self.excluded_kinds.iter().map(String::as_str), kind) {
            Some(excluded) => subscribed > excluded,
            None => true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL safe for logs.
    pub fn masked_url(&self) -> &str {
        &self.masked_url
    }

    pub fn event_kinds(&self) -> &[String] {
        &self.event_kinds
    }

    pub fn excluded_kinds(&self) -> &[String] {
        &self.excluded_kinds
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn rate_limit(&self) -> RateLimitPolicy {
        self.rate_limit
    }

    pub fn rate_limit_rechecks(&self) -> u32 {
        self.rate_limit_rechecks
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn circuit(&self) -> CircuitPolicy {
        self.circuit
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }
}

fn dedup(patterns: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        if !unique.contains(&pattern) {
            unique.push(pattern);
        }
    }
    unique
}
