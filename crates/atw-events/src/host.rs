//! Host event payloads as emitted by the game server's event bus.
//!
//! Every field is optional: the host may hand over partially populated
//! objects and normalization must still succeed.

use serde::{Deserialize, Serialize};

/// A player as seen by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerInfo {
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub game_mode: Option<String>,
    /// Name of the world the player is currently in.
    pub world: Option<String>,
}

/// A position in a world. Only block coordinates are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    /// `x,y,z` using floored block coordinates.
    pub fn block_coordinates(&self) -> String {
        format!(
            "{},{},{}",
            self.x.floor() as i64,
            self.y.floor() as i64,
            self.z.floor() as i64
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockInfo {
    #[serde(rename = "type")]
    pub block_type: Option<String>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityInfo {
    /// Host entity type, e.g. `PLAYER`, `ZOMBIE`.
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub world: Option<String>,
}

impl EntityInfo {
    pub fn is_player(&self) -> bool {
        self.entity_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("player"))
    }

    pub fn as_player(&self) -> Option<PlayerInfo> {
        self.is_player().then(|| PlayerInfo {
            name: self.name.clone(),
            uuid: self.uuid.clone(),
            game_mode: None,
            world: self.world.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldInfo {
    pub name: Option<String>,
    pub seed: Option<i64>,
    pub environment: Option<String>,
    pub difficulty: Option<String>,
    pub min_height: Option<i64>,
    pub max_height: Option<i64>,
    pub hardcore: Option<bool>,
    pub spawn_location: Option<Location>,
    pub structures: Option<bool>,
    pub folder: Option<String>,
    pub time: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub minecraft_version: Option<String>,
}

/// Events the host can hand to the pipeline, tagged by host type name.
///
/// ```json
/// {"type": "AsyncPlayerChatEvent", "player": {"name": "Alice"}, "message": "hi"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    PlayerJoinEvent {
        player: Option<PlayerInfo>,
    },
    PlayerQuitEvent {
        player: Option<PlayerInfo>,
    },
    AsyncPlayerChatEvent {
        player: Option<PlayerInfo>,
        message: Option<String>,
    },
    PlayerCommandPreprocessEvent {
        player: Option<PlayerInfo>,
        message: Option<String>,
    },
    PlayerDeathEvent {
        player: Option<PlayerInfo>,
        death_message: Option<String>,
    },
    BlockBreakEvent {
        player: Option<PlayerInfo>,
        block: Option<BlockInfo>,
    },
    BlockPlaceEvent {
        player: Option<PlayerInfo>,
        block: Option<BlockInfo>,
    },
    EntityDamageEvent {
        entity: Option<EntityInfo>,
        final_damage: Option<f64>,
        cause: Option<String>,
    },
    InventoryOpenEvent {
        player: Option<PlayerInfo>,
        inventory_type: Option<String>,
    },
    TimeSkipEvent {
        world: Option<WorldInfo>,
        skip_reason: Option<String>,
    },
    WorldLoadEvent {
        world: Option<WorldInfo>,
    },
    ServerEnable {
        server: Option<ServerInfo>,
    },
    ServerDisable {
        server: Option<ServerInfo>,
        reason: Option<String>,
    },
    /// Any host type this build does not model. Normalizes to nothing.
    #[serde(other)]
    Unknown,
}

impl HostEvent {
    /// The host type name used as the registration key.
    pub fn host_type(&self) -> &'static str {
        match self {
            Self::PlayerJoinEvent { .. } => "PlayerJoinEvent",
            Self::PlayerQuitEvent { .. } => "PlayerQuitEvent",
            Self::AsyncPlayerChatEvent { .. } => "AsyncPlayerChatEvent",
            Self::PlayerCommandPreprocessEvent { .. } => "PlayerCommandPreprocessEvent",
            Self::PlayerDeathEvent { .. } => "PlayerDeathEvent",
            Self::BlockBreakEvent { .. } => "BlockBreakEvent",
            Self::BlockPlaceEvent { .. } => "BlockPlaceEvent",
            Self::EntityDamageEvent { .. } => "EntityDamageEvent",
            Self::InventoryOpenEvent { .. } => "InventoryOpenEvent",
            Self::TimeSkipEvent { .. } => "TimeSkipEvent",
            Self::WorldLoadEvent { .. } => "WorldLoadEvent",
            Self::ServerEnable { .. } => "ServerEnable",
            Self::ServerDisable { .. } => "ServerDisable",
            Self::Unknown => "Unknown",
        }
    }
}
