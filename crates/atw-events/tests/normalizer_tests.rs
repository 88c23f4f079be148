use atw_core::{AttributeValue, Attributes};
use atw_events::{HostEvent, Normalizer};

fn parse(json: &str) -> HostEvent {
    serde_json::from_str(json).expect("valid host event")
}

#[test]
fn test_chat_event_normalizes_all_attributes() {
    let normalizer = Normalizer::with_defaults();
    let event = normalizer
        .normalize(&parse(
            r#"{
                "type": "AsyncPlayerChatEvent",
                "player": {"name": "Alice", "uuid": "6f1c", "world": "world"},
                "message": "hi"
            }"#,
        ))
        .unwrap();

    assert_eq!(event.kind(), "player.chat");
    assert_eq!(event.attribute("player.name").as_text(), "Alice");
    assert_eq!(event.attribute("chat.message").as_text(), "hi");
    assert_eq!(event.attribute("world.name").as_text(), "world");
    assert_eq!(event.attribute("event.name").as_text(), "player.chat");
}

#[test]
fn test_partial_event_yields_absent_values() {
    let normalizer = Normalizer::with_defaults();
    let event = normalizer
        .normalize(&parse(r#"{"type": "AsyncPlayerChatEvent"}"#))
        .unwrap();

    for key in ["player.name", "player.uuid", "chat.message", "world.name"] {
        assert_eq!(event.attribute(key), &AttributeValue::Absent, "{}", key);
        assert!(event.attributes().contains_key(key), "{} declared", key);
    }
}

#[test]
fn test_block_location_uses_block_coordinates() {
    let normalizer = Normalizer::with_defaults();
    let event = normalizer
        .normalize(&parse(
            r#"{
                "type": "BlockBreakEvent",
                "player": {"name": "Steve", "game_mode": "SURVIVAL"},
                "block": {"type": "STONE", "location": {"x": 1.5, "y": 70.0, "z": -0.5}}
            }"#,
        ))
        .unwrap();

    assert_eq!(event.kind(), "player.break.block");
    assert_eq!(event.attribute("block.type").as_text(), "STONE");
    assert_eq!(event.attribute("block.location").as_text(), "1,70,-1");
    assert_eq!(event.attribute("player.gamemode").as_text(), "SURVIVAL");
}

#[test]
fn test_damage_to_non_player_is_skipped() {
    let normalizer = Normalizer::with_defaults();
    let zombie = parse(r#"{"type": "EntityDamageEvent", "entity": {"type": "ZOMBIE"}}"#);
    assert!(normalizer.normalize(&zombie).is_none());

    let no_entity = parse(r#"{"type": "EntityDamageEvent", "final_damage": 3.0}"#);
    assert!(normalizer.normalize(&no_entity).is_none());

    let player = parse(
        r#"{"type": "EntityDamageEvent", "entity": {"type": "PLAYER", "name": "Alex"},
            "final_damage": 4.5, "cause": "FALL"}"#,
    );
    let event = normalizer.normalize(&player).unwrap();
    assert_eq!(event.kind(), "entity.damage.player");
    assert_eq!(event.attribute("damage.amount"), &AttributeValue::Number(4.5));
    assert_eq!(event.attribute("damage.cause").as_text(), "FALL");
}

#[test]
fn test_unknown_host_event_is_skipped() {
    let normalizer = Normalizer::with_defaults();
    assert!(normalizer
        .normalize(&parse(r#"{"type": "WeatherChangeEvent", "raining": true}"#))
        .is_none());
}

#[test]
fn test_world_load_attributes() {
    let normalizer = Normalizer::with_defaults();
    let event = normalizer
        .normalize(&parse(
            r#"{
                "type": "WorldLoadEvent",
                "world": {"name": "world_nether", "seed": 42, "hardcore": false,
                          "spawn_location": {"x": 0.0, "y": 64.9, "z": 0.0}}
            }"#,
        ))
        .unwrap();

    assert_eq!(event.attribute("world.seed"), &AttributeValue::Integer(42));
    assert_eq!(event.attribute("world.hardcore"), &AttributeValue::Bool(false));
    assert_eq!(event.attribute("world.spawn_location").as_text(), "0,64,0");
    assert!(event.attribute("world.folder").is_absent());
}

#[test]
fn test_synthetic_event_fills_declared_attributes() {
    let normalizer = Normalizer::with_defaults();
    let mut overrides = Attributes::new();
    overrides.insert("player.name".into(), "Tester".into());

    let event = normalizer.synthetic("player.join", overrides);
    assert_eq!(event.attribute("player.name").as_text(), "Tester");
    assert!(event.attributes().contains_key("player.uuid"));
    assert!(event.attribute("player.uuid").is_absent());
}

#[test]
fn test_known_kinds_in_catalog_order() {
    let normalizer = Normalizer::with_defaults();
    let kinds: Vec<_> = normalizer.known_kinds().collect();
    assert_eq!(kinds.first(), Some(&"player.join"));
    assert_eq!(kinds.last(), Some(&"server.disable"));
    assert!(normalizer.is_known_kind("world.time.change"));
    assert!(!normalizer.is_known_kind("chat.message"));
}
