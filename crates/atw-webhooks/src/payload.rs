//! Payload Builder: renders an event through a target's template into the
//! request body.

use crate::error::BuildError;
use crate::target::WebhookTarget;
use atw_config::PayloadFormat;
use atw_core::{DispatchEvent, RedactionPolicy, WarningTracker};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct DiscordBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct PayloadBuilder {
    redaction: RedactionPolicy,
    warn_missing: bool,
    warnings: Arc<WarningTracker>,
}

impl PayloadBuilder {
    pub fn new(redaction: RedactionPolicy) -> Self {
        Self {
            redaction,
            warn_missing: false,
            warnings: Arc::new(WarningTracker::new()),
        }
    }

    /// Log (once per webhook and key) placeholders that resolved to nothing.
    pub fn warn_on_missing(mut self, enabled: bool) -> Self {
        self.warn_missing = enabled;
        self
    }

    pub fn redaction(&self) -> &RedactionPolicy {
        &self.redaction
    }

    /// Build the request body for `event` sent to `target`.
    ///
    /// Deterministic: identical inputs produce byte-identical output.
    pub fn build(&self, event: &DispatchEvent, target: &WebhookTarget) -> Result<Bytes, BuildError> {
        if !target.accepts(event.kind()) {
            return Err(BuildError::KindMismatch {
                target: target.id().to_string(),
                kind: event.kind().to_string(),
            });
        }

        let rendered = target
            .template()
            .render(event.attributes(), &self.redaction);

        if self.warn_missing {
            for key in &rendered.missing {
                self.warnings.warn_once(
                    &format!("missing-placeholder:{}:{}", target.id(), key),
                    &format!(
                        "Missing placeholder value for {{{}}} in webhook {} ({})",
                        key,
                        target.id(),
                        event.kind()
                    ),
                );
            }
        }

        match target.format() {
            PayloadFormat::Raw => Ok(Bytes::from(rendered.text)),
            PayloadFormat::Discord => {
                let body = serde_json::to_vec(&DiscordBody {
                    content: &rendered.text,
                    username: target.username(),
                })?;
                Ok(Bytes::from(body))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atw_config::WebhooksConfig;
    use atw_core::Attributes;

    fn target(yaml_fields: &str) -> WebhookTarget {
        let yaml = format!(
            "webhooks:\n  t: {{ url: 'http://h/', {} }}",
            yaml_fields
        );
        let resolved = WebhooksConfig::from_yaml(&yaml)
            .unwrap()
            .resolved_targets()
            .unwrap()
            .remove(0);
        WebhookTarget::from_resolved(resolved).unwrap()
    }

    fn chat_event() -> DispatchEvent {
        let mut attributes = Attributes::new();
        attributes.insert("player".into(), "Alice".into());
        attributes.insert("text".into(), "hi \"there\"".into());
        DispatchEvent::new("chat.message", attributes)
    }

    #[test]
    fn test_raw_body() {
        let target = target("events: [chat.message], template: '{player}: {text}'");
        let body = PayloadBuilder::default().build(&chat_event(), &target).unwrap();
        assert_eq!(&body[..], b"Alice: hi \"there\"");
    }

    #[test]
    fn test_discord_body_is_json() {
        let target = target(
            "events: [chat.message], template: '{player}: {text}', format: discord, username: Server",
        );
        let body = PayloadBuilder::default().build(&chat_event(), &target).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["content"], "Alice: hi \"there\"");
        assert_eq!(json["username"], "Server");
    }

    #[test]
    fn test_discord_body_without_username() {
        let target = target("events: [chat.message], template: '{player}', format: discord");
        let body = PayloadBuilder::default().build(&chat_event(), &target).unwrap();
        assert_eq!(&body[..], br#"{"content":"Alice"}"#);
    }

    #[test]
    fn test_build_is_idempotent() {
        let target = target("events: [chat.message], template: '{player}|{text|upper}'");
        let builder = PayloadBuilder::new(RedactionPolicy::disabled()).warn_on_missing(true);
        let event = chat_event();
        assert_eq!(
            builder.build(&event, &target).unwrap(),
            builder.build(&event, &target).unwrap()
        );
    }

    #[test]
    fn test_redaction_applies() {
        let target = target("events: [chat.message], template: '{player}: {text}'");
        let builder = PayloadBuilder::new(RedactionPolicy::new(true, vec!["text".into()]));
        let body = builder.build(&chat_event(), &target).unwrap();
        assert_eq!(&body[..], b"Alice: [REDACTED]");
    }

    #[test]
    fn test_kind_mismatch() {
        let target = target("events: [player.join]");
        let err = PayloadBuilder::default()
            .build(&chat_event(), &target)
            .unwrap_err();
        assert!(matches!(err, BuildError::KindMismatch { .. }));
    }
}
