//! Statically enumerated event definitions.
//!
//! Each definition maps one host event type to a dispatch kind and declares
//! the attributes that kind always carries.

use crate::host::{HostEvent, PlayerInfo, ServerInfo, WorldInfo};
use atw_core::{AttributeValue, Attributes};
use serde::Serialize;
use std::fmt;

/// Declared value type of an attribute. Informational; values are not coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Uuid,
    Number,
    Boolean,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Uuid => "uuid",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extracts the attributes of one kind from a host event, or `None` if the
/// event does not describe that kind.
pub type NormalizeFn = fn(&HostEvent) -> Option<Attributes>;

#[derive(Debug, Clone)]
pub struct EventDefinition {
    pub kind: &'static str,
    pub host_type: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub attributes: &'static [(&'static str, AttributeType)],
    pub normalize: NormalizeFn,
}

impl EventDefinition {
    pub fn declares(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|(name, _)| *name == attribute)
    }
}

use AttributeType::{Boolean, Number, String as Str, Uuid};

const PLAYER_ATTRIBUTES: &[(&str, AttributeType)] =
    &[("player.name", Str), ("player.uuid", Uuid), ("world.name", Str)];

const SERVER_ATTRIBUTES: &[(&str, AttributeType)] = &[
    ("server.name", Str),
    ("server.version", Str),
    ("server.minecraft_version", Str),
];

/// The built-in registration table, in catalog order.
pub fn default_definitions() -> Vec<EventDefinition> {
    vec![
        EventDefinition {
            kind: "player.join",
            host_type: "PlayerJoinEvent",
            category: "player",
            description: "Fired when a player joins the server.",
            attributes: PLAYER_ATTRIBUTES,
            normalize: |event| match event {
                HostEvent::PlayerJoinEvent { player } => Some(player_attributes(player.as_ref())),
                _ => None,
            },
        },
        EventDefinition {
            kind: "player.quit",
            host_type: "PlayerQuitEvent",
            category: "player",
            description: "Fired when a player leaves the server.",
            attributes: PLAYER_ATTRIBUTES,
            normalize: |event| match event {
                HostEvent::PlayerQuitEvent { player } => Some(player_attributes(player.as_ref())),
                _ => None,
            },
        },
        EventDefinition {
            kind: "player.chat",
            host_type: "AsyncPlayerChatEvent",
            category: "player",
            description: "Fired when a player sends a chat message.",
            attributes: &[
                ("player.name", Str),
                ("player.uuid", Uuid),
                ("chat.message", Str),
                ("world.name", Str),
            ],
            normalize: |event| match event {
                HostEvent::AsyncPlayerChatEvent { player, message } => {
                    let mut attributes = player_attributes(player.as_ref());
                    put(&mut attributes, "chat.message", message.clone());
                    Some(attributes)
                }
                _ => None,
            },
        },
        EventDefinition {
            kind: "player.command",
            host_type: "PlayerCommandPreprocessEvent",
            category: "player",
            description: "Fired when a player runs a command.",
            attributes: &[
                ("player.name", Str),
                ("player.uuid", Uuid),
                ("command.raw", Str),
                ("world.name", Str),
            ],
            normalize: |event| match event {
                HostEvent::PlayerCommandPreprocessEvent { player, message } => {
                    let mut attributes = player_attributes(player.as_ref());
                    put(&mut attributes, "command.raw", message.clone());
                    Some(attributes)
                }
                _ => None,
            },
        },
        EventDefinition {
            kind: "player.death",
            host_type: "PlayerDeathEvent",
            category: "player",
            description: "Fired when a player dies.",
            attributes: &[
                ("player.name", Str),
                ("player.uuid", Uuid),
                ("world.name", Str),
                ("death.message", Str),
            ],
            normalize: |event| match event {
                HostEvent::PlayerDeathEvent {
                    player,
                    death_message,
                } => {
                    let mut attributes = player_attributes(player.as_ref());
                    put(&mut attributes, "death.message", death_message.clone());
                    Some(attributes)
                }
                _ => None,
            },
        },
        EventDefinition {
            kind: "player.break.block",
            host_type: "BlockBreakEvent",
            category: "player",
            description: "Fired when a player breaks a block.",
            attributes: BLOCK_ATTRIBUTES,
            normalize: |event| match event {
                HostEvent::BlockBreakEvent { player, block } => {
                    Some(block_attributes(player.as_ref(), block.as_ref()))
                }
                _ => None,
            },
        },
        EventDefinition {
            kind: "player.place.block",
            host_type: "BlockPlaceEvent",
            category: "player",
            description: "Fired when a player places a block.",
            attributes: BLOCK_ATTRIBUTES,
            normalize: |event| match event {
                HostEvent::BlockPlaceEvent { player, block } => {
                    Some(block_attributes(player.as_ref(), block.as_ref()))
                }
                _ => None,
            },
        },
        EventDefinition {
            kind: "entity.damage.player",
            host_type: "EntityDamageEvent",
            category: "entity",
            description: "Fired when a player is damaged.",
            attributes: &[
                ("player.name", Str),
                ("player.uuid", Uuid),
                ("damage.amount", Number),
                ("damage.cause", Str),
                ("world.name", Str),
            ],
            normalize: |event| match event {
                HostEvent::EntityDamageEvent {
                    entity,
                    final_damage,
                    cause,
                } => {
                    let player = entity.as_ref()?.as_player()?;
                    let mut attributes = player_attributes(Some(&player));
                    put(&mut attributes, "damage.amount", *final_damage);
                    put(&mut attributes, "damage.cause", cause.clone());
                    Some(attributes)
                }
                _ => None,
            },
        },
        EventDefinition {
            kind: "inventory.open",
            host_type: "InventoryOpenEvent",
            category: "inventory",
            description: "Fired when a player opens an inventory.",
            attributes: &[
                ("player.name", Str),
                ("player.uuid", Uuid),
                ("inventory.type", Str),
                ("world.name", Str),
            ],
            normalize: |event| match event {
                HostEvent::InventoryOpenEvent {
                    player,
                    inventory_type,
                } => {
                    let mut attributes = player_attributes(player.as_ref());
                    put(&mut attributes, "inventory.type", inventory_type.clone());
                    Some(attributes)
                }
                _ => None,
            },
        },
        EventDefinition {
            kind: "world.time.change",
            host_type: "TimeSkipEvent",
            category: "world",
            description: "Fired when the time in a world skips forward.",
            attributes: &[
                ("world.name", Str),
                ("world.time", Number),
                ("world.skip.reason", Str),
            ],
            normalize: |event| match event {
                HostEvent::TimeSkipEvent { world, skip_reason } => {
                    let mut attributes = Attributes::new();
                    put(
                        &mut attributes,
                        "world.name",
                        world.as_ref().and_then(|w| w.name.clone()),
                    );
                    put(
                        &mut attributes,
                        "world.time",
                        world.as_ref().and_then(|w| w.time),
                    );
                    put(&mut attributes, "world.skip.reason", skip_reason.clone());
                    Some(attributes)
                }
                _ => None,
            },
        },
        EventDefinition {
            kind: "world.load",
            host_type: "WorldLoadEvent",
            category: "world",
            description: "Fired when a world is loaded.",
            attributes: &[
                ("world.name", Str),
                ("world.seed", Number),
                ("world.environment", Str),
                ("world.difficulty", Str),
                ("world.min_height", Number),
                ("world.max_height", Number),
                ("world.hardcore", Boolean),
                ("world.spawn_location", Str),
                ("world.structures", Boolean),
                ("world.folder", Str),
            ],
            normalize: |event| match event {
                HostEvent::WorldLoadEvent { world } => {
                    Some(world_attributes(world.clone().unwrap_or_default()))
                }
                _ => None,
            },
        },
        EventDefinition {
            kind: "server.enable",
            host_type: "ServerEnable",
            category: "server",
            description: "Fired when the server has finished starting.",
            attributes: SERVER_ATTRIBUTES,
            normalize: |event| match event {
                HostEvent::ServerEnable { server } => Some(server_attributes(server.as_ref())),
                _ => None,
            },
        },
        EventDefinition {
            kind: "server.disable",
            host_type: "ServerDisable",
            category: "server",
            description: "Fired when the server is shutting down.",
            attributes: &[
                ("server.name", Str),
                ("server.version", Str),
                ("server.minecraft_version", Str),
                ("server.reason", Str),
            ],
            normalize: |event| match event {
                HostEvent::ServerDisable { server, reason } => {
                    let mut attributes = server_attributes(server.as_ref());
                    put(&mut attributes, "server.reason", reason.clone());
                    Some(attributes)
                }
                _ => None,
            },
        },
    ]
}

const BLOCK_ATTRIBUTES: &[(&str, AttributeType)] = &[
    ("player.name", Str),
    ("player.uuid", Uuid),
    ("player.gamemode", Str),
    ("block.type", Str),
    ("block.location", Str),
    ("world.name", Str),
];

fn put(attributes: &mut Attributes, key: &str, value: impl Into<AttributeValue>) {
    attributes.insert(key.to_string(), value.into());
}

fn player_attributes(player: Option<&PlayerInfo>) -> Attributes {
    let mut attributes = Attributes::new();
    put(&mut attributes, "player.name", player.and_then(|p| p.name.clone()));
    put(&mut attributes, "player.uuid", player.and_then(|p| p.uuid.clone()));
    put(&mut attributes, "world.name", player.and_then(|p| p.world.clone()));
    attributes
}

fn block_attributes(
    player: Option<&PlayerInfo>,
    block: Option<&crate::host::BlockInfo>,
) -> Attributes {
    let mut attributes = player_attributes(player);
    put(
        &mut attributes,
        "player.gamemode",
        player.and_then(|p| p.game_mode.clone()),
    );
    put(
        &mut attributes,
        "block.type",
        block.and_then(|b| b.block_type.clone()),
    );
    put(
        &mut attributes,
        "block.location",
        block.and_then(|b| b.location).map(|l| l.block_coordinates()),
    );
    attributes
}

fn world_attributes(world: WorldInfo) -> Attributes {
    let mut attributes = Attributes::new();
    put(&mut attributes, "world.name", world.name);
    put(&mut attributes, "world.seed", world.seed);
    put(&mut attributes, "world.environment", world.environment);
    put(&mut attributes, "world.difficulty", world.difficulty);
    put(&mut attributes, "world.min_height", world.min_height);
    put(&mut attributes, "world.max_height", world.max_height);
    put(&mut attributes, "world.hardcore", world.hardcore);
    put(
        &mut attributes,
        "world.spawn_location",
        world.spawn_location.map(|l| l.block_coordinates()),
    );
    put(&mut attributes, "world.structures", world.structures);
    put(&mut attributes, "world.folder", world.folder);
    attributes
}

fn server_attributes(server: Option<&ServerInfo>) -> Attributes {
    let mut attributes = Attributes::new();
    put(&mut attributes, "server.name", server.and_then(|s| s.name.clone()));
    put(
        &mut attributes,
        "server.version",
        server.and_then(|s| s.version.clone()),
    );
    put(
        &mut attributes,
        "server.minecraft_version",
        server.and_then(|s| s.minecraft_version.clone()),
    );
    attributes
}

/// Markdown catalog of the given definitions, one section per kind.
pub fn catalog_markdown<'a>(definitions: impl IntoIterator<Item = &'a EventDefinition>) -> String {
    let mut out = String::from("# Events\n\n");
    out.push_str("Every event also carries `event.name`, the event kind.\n");
    for definition in definitions {
        out.push_str(&format!(
            "\n## `{}`\n\n{}\n\n- Category: {}\n- Host event: `{}`\n",
            definition.kind, definition.description, definition.category, definition.host_type
        ));
        if !definition.attributes.is_empty() {
            out.push_str("\n| Attribute | Type |\n|-----------|------|\n");
            for (name, attribute_type) in definition.attributes {
                out.push_str(&format!("| `{}` | {} |\n", name, attribute_type));
            }
        }
    }
    out
}
