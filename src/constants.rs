use crate::types::{DayNightPhase, Team};

pub const TICK_RATE: u32 = 30;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const WORLD_SIZE: f32 = 1600.0;
pub const WORLD_MARGIN: f32 = 20.0;
pub const TILE_SIZE: i32 = 40;
pub const TILE_COLUMNS: i32 = (WORLD_SIZE as i32) / TILE_SIZE;
pub const TILE_ROWS: i32 = (WORLD_SIZE as i32) / TILE_SIZE;

pub const SOUL_MAX_ENERGY: f32 = 100.0;
pub const SOUL_START_ENERGY: f32 = 60.0;
pub const CHILD_START_ENERGY: f32 = 30.0;
pub const SOUL_SEARCH_RADIUS: f32 = 220.0;
pub const SOUL_MOVEMENT_SPEED: f32 = 2.2;
pub const CHILD_MOVEMENT_SPEED: f32 = 1.6;
pub const WANDER_JITTER: f32 = 0.6;
pub const ENERGY_DRAIN_CHANCE: f32 = 0.02;

pub const ATTACK_RANGE: f32 = 42.0;
pub const ATTACK_COOLDOWN_MS: u64 = 1_000;
pub const ATTACK_CHANCE: f32 = 0.3;
pub const ATTACK_FAVOURED_BONUS: f32 = 0.15;
pub const ATTACK_DAMAGE_MIN: i32 = 5;
pub const ATTACK_DAMAGE_MAX: i32 = 15;
pub const MIN_SEPARATION: f32 = 24.0;

pub const ORB_COUNT: usize = 40;
pub const ORB_ENERGY_MIN: i32 = 10;
pub const ORB_ENERGY_MAX: i32 = 25;
pub const COLLECTION_RADIUS: f32 = 20.0;
pub const ORB_RESPAWN_MIN_MS: u64 = 10_000;
pub const ORB_RESPAWN_MAX_MS: u64 = 15_000;

pub const SPELL_ENERGY_COST: f32 = 20.0;
pub const SPELL_MIN_RESERVE: f32 = 25.0;
pub const SPELL_CHANCE: f32 = 0.01;
pub const SPELL_DURATION_MS: u64 = 3_000;

pub const MATING_RANGE: f32 = 48.0;
pub const MATING_ENERGY_THRESHOLD: f32 = 70.0;
pub const MATING_ENERGY_COST: f32 = 25.0;
pub const MATING_CHANCE: f32 = 0.004;
pub const MATING_DURATION_MS: u64 = 4_000;
pub const SOUL_MATURE_MS: u64 = 30_000;
pub const MAX_SOULS_PER_TEAM: usize = 40;

pub const DAY_NIGHT_CYCLE_MS: u64 = 120_000;

pub const REMOVE_DELAY_MS: u64 = 600;
pub const SPELL_CLEANUP_GRACE_MS: u64 = 1_000;
pub const RECONNECT_DELAY_MS: u64 = 3_000;
pub const INTERPOLATION_SMOOTHING: f32 = 0.25;
pub const SNAP_DISTANCE: f32 = 200.0;

pub fn team_tile(team: Team) -> crate::types::TileType {
    match team {
        Team::Dark => crate::types::TileType::Gray,
        Team::Light => crate::types::TileType::Green,
    }
}

pub fn nexus_position(team: Team) -> (f32, f32) {
    match team {
        Team::Dark => (WORLD_SIZE * 0.15, WORLD_SIZE * 0.5),
        Team::Light => (WORLD_SIZE * 0.85, WORLD_SIZE * 0.5),
    }
}

pub fn favoured_team(phase: DayNightPhase) -> Team {
    match phase {
        DayNightPhase::Day => Team::Light,
        DayNightPhase::Night => Team::Dark,
    }
}
