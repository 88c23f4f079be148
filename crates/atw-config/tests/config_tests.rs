use atw_config::{
    ConditionSpec, ConfigError, OverflowBehavior, PayloadFormat, RetryConfig, TargetConfig,
    WebhookEntries, WebhooksConfig, DEFAULT_TEMPLATE,
};
use atw_core::AttributeValue;
use std::io::Write;

const FULL_CONFIG: &str = r#"
defaults:
  queue-capacity: 50
  retry:
    max-attempts: 3
    base-delay-ms: 100
    max-delay-ms: 1000
    jitter: 0.0
dispatcher:
  shutdown-grace-ms: 250
redaction:
  enabled: true
  fields: ["player.uuid"]
webhooks:
  chat:
    url: https://discord.com/api/webhooks/1/token
    events: ["player.chat"]
    template: "{player.name}: {chat.message}"
    format: discord
    username: Server
    retry:
      max-attempts: 7
  audit:
    url: http://127.0.0.1:9000/audit
    events: ["player.*", "server"]
    headers:
      X-Env: test
    conditions:
      world.name: world
      player.gamemode: [SURVIVAL, ADVENTURE]
      damage.amount: { greater-than: 5 }
"#;

#[test]
fn test_defaults_match_documented_values() {
    let config = WebhooksConfig::default();

    assert_eq!(config.defaults.queue_capacity, 1000);
    assert_eq!(config.defaults.timeout_ms, 5000);
    assert_eq!(config.defaults.content_type, "application/json");
    assert_eq!(config.defaults.format, PayloadFormat::Raw);
    assert_eq!(config.defaults.rate_limit.max_per_interval, 5);
    assert_eq!(config.defaults.rate_limit.interval_ms, 2000);
    assert_eq!(config.defaults.rate_limit_rechecks, 10);
    assert_eq!(config.defaults.retry, RetryConfig::default());
    assert_eq!(config.defaults.circuit.failure_threshold, 5);
    assert_eq!(config.dispatcher.shutdown_grace_ms, 5000);
    assert!(config.redaction.enabled);
    assert!(config.logging.log_webhook_failures);
    assert!(config.event_rate_limit.enabled);
    assert_eq!(config.event_rate_limit.events_per_second, 100);
    assert_eq!(config.event_rate_limit.overflow_behavior, OverflowBehavior::Drop);
    assert!(config.webhooks.is_empty());
}

#[test]
fn test_event_rate_limit_and_exclusions() {
    let config = WebhooksConfig::from_yaml(
        r#"
event-rate-limit:
  events-per-second: 20
  overflow-behavior: disable-event
  per-event:
    player.chat: 2
webhooks:
  players:
    url: http://h/
    events: ["player.*"]
    exclude-events: [" player.command "]
"#,
    )
    .unwrap();
    assert_eq!(config.event_rate_limit.events_per_second, 20);
    assert_eq!(
        config.event_rate_limit.overflow_behavior,
        OverflowBehavior::DisableEvent
    );
    assert_eq!(config.event_rate_limit.per_event.get("player.chat"), Some(&2));

    let targets = config.resolved_targets().unwrap();
    assert_eq!(targets[0].exclude_events, vec!["player.command"]);

    let bad = WebhooksConfig::from_yaml(
        "webhooks:\n  a: { url: 'http://h/', events: [player.join], exclude-events: ['player.'] }",
    )
    .unwrap();
    assert!(matches!(
        bad.validate(),
        Err(ConfigError::InvalidTarget { ref id, .. }) if id == "a"
    ));

    let zero = WebhooksConfig::from_yaml("event-rate-limit: { events-per-second: 0 }").unwrap();
    assert!(matches!(
        zero.validate(),
        Err(ConfigError::InvalidEventRateLimit(_))
    ));
}

#[test]
fn test_parse_full_document_preserves_order() {
    let config = WebhooksConfig::from_yaml(FULL_CONFIG).unwrap();
    let ids: Vec<_> = config.webhooks.ids().collect();
    assert_eq!(ids, vec!["chat", "audit"]);

    let targets = config.resolved_targets().unwrap();
    assert_eq!(targets.len(), 2);

    let chat = &targets[0];
    assert_eq!(chat.format, PayloadFormat::Discord);
    assert_eq!(chat.username.as_deref(), Some("Server"));
    assert_eq!(chat.queue_capacity, 50);
    // Partial override keeps the document defaults for the other fields
    assert_eq!(chat.retry.max_attempts, 7);
    assert_eq!(chat.retry.base_delay_ms, 100);
    assert_eq!(chat.retry.max_delay_ms, 1000);

    let audit = &targets[1];
    assert_eq!(audit.template, DEFAULT_TEMPLATE);
    assert_eq!(audit.retry.max_attempts, 3);
    assert_eq!(audit.headers.get("X-Env").map(String::as_str), Some("test"));
}

#[test]
fn test_condition_shapes() {
    let config = WebhooksConfig::from_yaml(FULL_CONFIG).unwrap();
    let audit = config.webhooks.get("audit").unwrap();

    assert_eq!(
        audit.conditions.get("world.name"),
        Some(&ConditionSpec::Equals(AttributeValue::Text("world".into())))
    );
    assert!(matches!(
        audit.conditions.get("player.gamemode"),
        Some(ConditionSpec::AnyOf(values)) if values.len() == 2
    ));
    match audit.conditions.get("damage.amount") {
        Some(ConditionSpec::Operators(ops)) => {
            assert_eq!(ops.greater_than, Some(AttributeValue::Integer(5)));
            assert!(ops.equals.is_none());
        }
        other => panic!("unexpected condition {:?}", other),
    }
}

#[test]
fn test_duplicate_webhook_ids_rejected() {
    let yaml = r#"
webhooks:
  a: { url: "http://x.test/", events: [player.join] }
  a: { url: "http://y.test/", events: [player.quit] }
"#;
    let err = WebhooksConfig::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_unknown_target_field_rejected() {
    let yaml = r#"
webhooks:
  a: { url: "http://x.test/", events: [player.join], evnets: [] }
"#;
    assert!(WebhooksConfig::from_yaml(yaml).is_err());
}

fn invalid_reason(yaml: &str) -> String {
    let config = WebhooksConfig::from_yaml(yaml).unwrap();
    match config.validate() {
        Err(ConfigError::InvalidTarget { reason, .. }) => reason,
        other => panic!("expected invalid target, got {:?}", other),
    }
}

#[test]
fn test_structural_validation() {
    assert!(invalid_reason("webhooks:\n  a: { events: [x] }").contains("url is required"));
    assert!(invalid_reason("webhooks:\n  a: { url: 'ftp://h/', events: [x] }").contains("scheme"));
    assert!(invalid_reason("webhooks:\n  a: { url: 'http://h/' }").contains("event pattern"));
    assert!(invalid_reason("webhooks:\n  a: { url: 'http://h/', events: ['a..b'] }")
        .contains("invalid event pattern"));
    assert!(invalid_reason(
        "webhooks:\n  a: { url: 'http://h/', events: [x], queue-capacity: 0 }"
    )
    .contains("queue-capacity"));
    assert!(invalid_reason(
        "webhooks:\n  a: { url: 'http://h/', events: [x], retry: { base-delay-ms: 5000, max-delay-ms: 10 } }"
    )
    .contains("exceeds"));
    assert!(invalid_reason(
        "webhooks:\n  a: { url: 'http://h/', events: [x], retry: { jitter: 1.5 } }"
    )
    .contains("jitter"));
    assert!(invalid_reason(
        "webhooks:\n  a: { url: 'http://h/', events: [x], rate-limit: { max-per-interval: 0 } }"
    )
    .contains("rate-limit"));
}

#[test]
fn test_invalid_defaults() {
    let config = WebhooksConfig::from_yaml("defaults:\n  retry:\n    max-attempts: 0\n").unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidDefaults(_))
    ));
}

#[test]
fn test_load_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL_CONFIG.as_bytes()).unwrap();

    let config = WebhooksConfig::load_from_path(file.path()).unwrap();
    assert_eq!(config.webhooks.len(), 2);
    assert_eq!(config.dispatcher.shutdown_grace_ms, 250);
    assert!(config.redaction.policy().is_redacted("player.uuid"));
}

#[test]
fn test_load_missing_file() {
    let err = WebhooksConfig::load_from_path(std::path::Path::new("/nonexistent/atw.yml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_yaml_roundtrip_keeps_webhooks() {
    let mut webhooks = WebhookEntries::new();
    assert!(webhooks.insert(
        "first",
        TargetConfig {
            url: "http://a.test/".into(),
            events: vec!["player.join".into()],
            ..Default::default()
        }
    ));
    assert!(!webhooks.insert("first", TargetConfig::default()));

    let config = WebhooksConfig {
        webhooks,
        ..Default::default()
    };
    let yaml = config.to_yaml().unwrap();
    let parsed = WebhooksConfig::from_yaml(&yaml).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_empty_document() {
    let config = WebhooksConfig::from_yaml("webhooks:\n").unwrap();
    assert!(config.webhooks.is_empty());
    assert!(config.resolved_targets().unwrap().is_empty());
}
