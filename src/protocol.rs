use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{
    CharacterPatch, DayNightState, OrbView, SoulView, SpellView, Statistics, Team, TileType,
    Vec2, WorldState,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Superseded by the next tick; losing one is harmless.
    DropOnFull,
    /// Losing it would desync the client; drop the transport instead.
    DisconnectOnFull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    Damaged,
    CasterDied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Damaged,
    ParentDied,
    Separated,
    PopulationCap,
}

/// Every server to client message. `type` carries the variant tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    WorldState(WorldState),
    CharacterUpdate {
        character: CharacterPatch,
    },
    CharacterSpawn {
        character: SoulView,
    },
    CharacterRemove {
        #[serde(rename = "characterId")]
        character_id: String,
    },
    CharacterDeath {
        #[serde(rename = "characterId")]
        character_id: String,
        #[serde(rename = "killerId", default, skip_serializing_if = "Option::is_none")]
        killer_id: Option<String>,
        x: f32,
        y: f32,
        team: Team,
    },
    OrbSpawned {
        orb: OrbView,
    },
    OrbCollected {
        #[serde(rename = "orbId")]
        orb_id: String,
        #[serde(rename = "collectorId")]
        collector_id: String,
        #[serde(rename = "respawnTime")]
        respawn_time: u64,
    },
    Attack {
        #[serde(rename = "attackerId")]
        attacker_id: String,
        #[serde(rename = "targetId")]
        target_id: String,
        damage: f32,
        #[serde(rename = "attackerPos")]
        attacker_pos: Vec2,
        #[serde(rename = "targetPos")]
        target_pos: Vec2,
    },
    TileUpdated {
        #[serde(rename = "tileX")]
        tile_x: i32,
        #[serde(rename = "tileY")]
        tile_y: i32,
        #[serde(rename = "newType")]
        new_type: TileType,
    },
    SpellStarted {
        spell: SpellView,
    },
    SpellCompleted {
        #[serde(rename = "spellId")]
        spell_id: String,
        #[serde(rename = "casterId")]
        caster_id: String,
        #[serde(rename = "tileX")]
        tile_x: i32,
        #[serde(rename = "tileY")]
        tile_y: i32,
    },
    SpellInterrupted {
        #[serde(rename = "spellId")]
        spell_id: String,
        #[serde(rename = "casterId")]
        caster_id: String,
        reason: InterruptReason,
    },
    MatingStarted {
        #[serde(rename = "matingId")]
        mating_id: String,
        #[serde(rename = "parentA")]
        parent_a: String,
        #[serde(rename = "parentB")]
        parent_b: String,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    MatingCompleted {
        #[serde(rename = "matingId")]
        mating_id: String,
        #[serde(rename = "parentA")]
        parent_a: String,
        #[serde(rename = "parentB")]
        parent_b: String,
        #[serde(rename = "childId")]
        child_id: String,
    },
    MatingCancelled {
        #[serde(rename = "matingId")]
        mating_id: String,
        reason: CancelReason,
    },
    SoulMatured {
        #[serde(rename = "characterId")]
        character_id: String,
    },
    DayNightPhaseChange {
        #[serde(rename = "dayNightState")]
        day_night_state: DayNightState,
    },
    StatisticsUpdate {
        statistics: Statistics,
    },
    Disconnected {},
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorldState(_) => "world_state",
            Self::CharacterUpdate { .. } => "character_update",
            Self::CharacterSpawn { .. } => "character_spawn",
            Self::CharacterRemove { .. } => "character_remove",
            Self::CharacterDeath { .. } => "character_death",
            Self::OrbSpawned { .. } => "orb_spawned",
            Self::OrbCollected { .. } => "orb_collected",
            Self::Attack { .. } => "attack",
            Self::TileUpdated { .. } => "tile_updated",
            Self::SpellStarted { .. } => "spell_started",
            Self::SpellCompleted { .. } => "spell_completed",
            Self::SpellInterrupted { .. } => "spell_interrupted",
            Self::MatingStarted { .. } => "mating_started",
            Self::MatingCompleted { .. } => "mating_completed",
            Self::MatingCancelled { .. } => "mating_cancelled",
            Self::SoulMatured { .. } => "soul_matured",
            Self::DayNightPhaseChange { .. } => "day_night_phase_change",
            Self::StatisticsUpdate { .. } => "statistics_update",
            Self::Disconnected {} => "disconnected",
        }
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        match self {
            Self::CharacterUpdate { .. } | Self::StatisticsUpdate { .. } => QueuePolicy::DropOnFull,
            _ => QueuePolicy::DisconnectOnFull,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn decode_server_message(raw: &str) -> Result<ServerMessage, ProtocolError> {
    if raw.trim().is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(serde_json::from_str(raw)?)
}
