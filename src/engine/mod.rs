use std::collections::BTreeMap;

use tracing::debug;

use crate::constants::{
    favoured_team, nexus_position, ATTACK_CHANCE, ATTACK_DAMAGE_MAX, ATTACK_DAMAGE_MIN,
    ATTACK_FAVOURED_BONUS, COLLECTION_RADIUS, DAY_NIGHT_CYCLE_MS, ENERGY_DRAIN_CHANCE,
    MIN_SEPARATION, ORB_COUNT, TICK_RATE, TILE_COLUMNS, TILE_ROWS, WANDER_JITTER, WORLD_MARGIN,
    WORLD_SIZE,
};
use crate::protocol::{CancelReason, InterruptReason, ServerMessage};
use crate::rng::Rng;
use crate::store::{Activity, EntityStore, Soul};
use crate::territory::TileGrid;
use crate::types::{
    DayNightPhase, DayNightState, NexusView, SpellView, Statistics, Team, TileType, Vec2,
    WorldState,
};

mod life_system;
mod orb_system;
mod territory_system;
mod utils;

pub use self::utils::now_ms;
use self::utils::{clamp_axis, distance};

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub seed: u32,
    pub souls_per_team: usize,
    pub orb_count: usize,
    /// Below this a team gets one reinforcement per second at its nexus.
    pub min_population: usize,
    pub day_night_cycle_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            souls_per_team: 12,
            orb_count: ORB_COUNT,
            min_population: 4,
            day_night_cycle_ms: DAY_NIGHT_CYCLE_MS,
        }
    }
}

#[derive(Clone, Debug)]
struct Mating {
    id: String,
    parent_a: String,
    parent_b: String,
    started_at_ms: u64,
    duration_ms: u64,
}

#[derive(Clone, Debug, Default)]
struct Counters {
    orbs_collected: u64,
    deaths: u64,
    births: u64,
    conquests: u64,
}

/// Authoritative world. `step` advances one tick and queues the resulting
/// messages; `drain_events` hands them to the broadcaster.
#[derive(Clone, Debug)]
pub struct WorldSimulator {
    pub started_at_ms: u64,
    pub config: SimulationConfig,

    store: EntityStore,
    tiles: TileGrid,
    nexuses: Vec<NexusView>,
    spells: BTreeMap<String, SpellView>,
    matings: BTreeMap<String, Mating>,
    phase: DayNightPhase,
    counters: Counters,
    rng: Rng,
    events: Vec<ServerMessage>,

    elapsed_ms: u64,
    tick_counter: u64,
}

impl WorldSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_start(config, now_ms())
    }

    pub fn with_start(config: SimulationConfig, started_at_ms: u64) -> Self {
        let mut sim = Self {
            started_at_ms,
            rng: Rng::new(config.seed),
            config,
            store: EntityStore::new(),
            tiles: TileGrid::split(TILE_COLUMNS, TILE_ROWS),
            nexuses: Vec::new(),
            spells: BTreeMap::new(),
            matings: BTreeMap::new(),
            phase: DayNightPhase::Day,
            counters: Counters::default(),
            events: Vec::new(),
            elapsed_ms: 0,
            tick_counter: 0,
        };
        sim.phase = sim.day_night_state().phase;
        sim.seed_world();
        sim
    }

    fn seed_world(&mut self) {
        for team in Team::ALL {
            let id = self.store.next_id("nexus");
            let (x, y) = nexus_position(team);
            self.nexuses.push(NexusView { id, team, x, y });
        }
        for team in Team::ALL {
            for _ in 0..self.config.souls_per_team {
                let (x_min, x_max) = match team {
                    Team::Dark => (WORLD_MARGIN, WORLD_SIZE / 2.0),
                    Team::Light => (WORLD_SIZE / 2.0, WORLD_SIZE - WORLD_MARGIN),
                };
                let x = self.rng.range(x_min, x_max);
                let y = self.rng.range(WORLD_MARGIN, WORLD_SIZE - WORLD_MARGIN);
                let spec = self.adult_spec(team, x, y);
                self.store.spawn_soul(spec);
            }
        }
        for _ in 0..self.config.orb_count {
            self.spawn_orb();
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.started_at_ms.saturating_add(self.elapsed_ms)
    }

    pub fn tick(&self) -> u64 {
        self.tick_counter
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    pub fn step(&mut self, dt_ms: u64) {
        self.tick_counter += 1;
        self.elapsed_ms = self.elapsed_ms.saturating_add(dt_ms);
        let now_ms = self.now_ms();

        for id in self.store.soul_ids() {
            self.update_soul(&id, now_ms);
        }
        self.sweep_dead();
        self.respawn_orbs(now_ms);

        self.complete_spells(now_ms);
        self.start_spells(now_ms);
        self.update_matings(now_ms);
        self.start_matings(now_ms);
        self.mature_souls(now_ms);

        if self.tick_counter.is_multiple_of(TICK_RATE as u64) {
            self.reinforce_teams();
            self.events.push(ServerMessage::StatisticsUpdate {
                statistics: self.statistics(),
            });
        }
        self.update_day_night();
    }

    pub fn drain_events(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.events)
    }

    /// Full state for a newly connected viewer. Collected orbs are omitted
    /// until they respawn.
    pub fn snapshot(&self) -> WorldState {
        let now_ms = self.now_ms();
        WorldState {
            characters: self.store.souls().map(Soul::view).collect(),
            energy_orbs: self
                .store
                .available_orbs(now_ms)
                .map(|orb| orb.view())
                .collect(),
            nexuses: self.nexuses.clone(),
            tile_map: Some(self.tiles.to_view()),
            active_spells: self.spells.values().cloned().collect(),
            day_night_state: Some(self.day_night_state()),
            statistics: Some(self.statistics()),
        }
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            dark_souls: self.store.team_population(Team::Dark),
            light_souls: self.store.team_population(Team::Light),
            gray_tiles: self.tiles.count(TileType::Gray),
            green_tiles: self.tiles.count(TileType::Green),
            orbs_collected: self.counters.orbs_collected,
            deaths: self.counters.deaths,
            births: self.counters.births,
            conquests: self.counters.conquests,
        }
    }

    pub fn day_night_state(&self) -> DayNightState {
        let cycle_ms = self.config.day_night_cycle_ms.max(2);
        let into_cycle = self.elapsed_ms % cycle_ms;
        let phase = if into_cycle < cycle_ms / 2 {
            DayNightPhase::Day
        } else {
            DayNightPhase::Night
        };
        DayNightState {
            phase,
            progress: into_cycle as f32 / cycle_ms as f32,
            cycle_ms,
        }
    }

    fn update_day_night(&mut self) {
        let state = self.day_night_state();
        if state.phase != self.phase {
            self.phase = state.phase;
            debug!(phase = ?state.phase, "day/night phase changed");
            self.events.push(ServerMessage::DayNightPhaseChange {
                day_night_state: state,
            });
        }
    }

    fn update_soul(&mut self, id: &str, now_ms: u64) {
        let Some(mut soul) = self.store.remove_soul(id) else {
            return;
        };
        soul.sanitize();
        if !soul.is_alive() {
            self.store.put_soul(soul);
            return;
        }

        if self.rng.chance(ENERGY_DRAIN_CHANCE) {
            soul.add_energy(-1.0);
        }

        if soul.is_roaming() {
            self.steer(&mut soul, now_ms);
        } else {
            soul.vx = 0.0;
            soul.vy = 0.0;
        }

        soul.x += soul.vx;
        soul.y += soul.vy;
        reflect(&mut soul);

        self.collect_orbs(&mut soul, now_ms);

        let damaged = self.interact(&mut soul, now_ms);

        soul.sanitize();
        self.events.push(ServerMessage::CharacterUpdate {
            character: (&soul.view()).into(),
        });
        self.store.put_soul(soul);

        for target_id in damaged {
            self.disturb(&target_id);
        }
    }

    fn steer(&mut self, soul: &mut Soul, now_ms: u64) {
        let target = self
            .store
            .available_orbs(now_ms)
            .map(|orb| (distance(soul.x, soul.y, orb.x, orb.y), orb.x, orb.y))
            .filter(|(dist, _, _)| *dist < soul.search_radius)
            .min_by(|a, b| a.0.total_cmp(&b.0));

        if let Some((dist, tx, ty)) = target {
            if dist > f32::EPSILON {
                soul.vx = (tx - soul.x) / dist * soul.movement_speed;
                soul.vy = (ty - soul.y) / dist * soul.movement_speed;
            } else {
                soul.vx = 0.0;
                soul.vy = 0.0;
            }
            return;
        }

        soul.vx += self.rng.range(-WANDER_JITTER, WANDER_JITTER);
        soul.vy += self.rng.range(-WANDER_JITTER, WANDER_JITTER);
        let speed = (soul.vx * soul.vx + soul.vy * soul.vy).sqrt();
        if speed > soul.movement_speed && speed > 0.0 {
            soul.vx = soul.vx / speed * soul.movement_speed;
            soul.vy = soul.vy / speed * soul.movement_speed;
        }
    }

    fn collect_orbs(&mut self, soul: &mut Soul, now_ms: u64) {
        let in_reach: Vec<String> = self
            .store
            .available_orbs(now_ms)
            .filter(|orb| distance(soul.x, soul.y, orb.x, orb.y) <= COLLECTION_RADIUS)
            .map(|orb| orb.id.clone())
            .collect();
        for orb_id in in_reach {
            if let Some(energy) = self.collect_orb(&orb_id, &soul.id, now_ms) {
                soul.add_energy(energy);
            }
        }
    }

    /// Attacks first, then separation, against every other live soul.
    /// Returns the ids of souls that took damage.
    fn interact(&mut self, soul: &mut Soul, now_ms: u64) -> Vec<String> {
        let favoured = favoured_team(self.day_night_state().phase);
        let mut damaged = Vec::new();

        for other_id in self.store.soul_ids() {
            let Some(other) = self.store.soul(&other_id) else {
                continue;
            };
            if !other.is_alive() {
                continue;
            }
            let dist = distance(soul.x, soul.y, other.x, other.y);

            let can_attack = other.team != soul.team
                && soul.mature
                && other.mature
                && soul.is_roaming()
                && dist <= soul.attack_range
                && now_ms >= soul.last_attack_ms.saturating_add(soul.attack_cooldown_ms);
            if can_attack {
                let chance = if soul.team == favoured {
                    ATTACK_CHANCE + ATTACK_FAVOURED_BONUS
                } else {
                    ATTACK_CHANCE
                };
                if self.rng.chance(chance) {
                    let damage = self.rng.int(ATTACK_DAMAGE_MIN, ATTACK_DAMAGE_MAX) as f32;
                    soul.last_attack_ms = now_ms;
                    if let Some(target) = self.store.soul_mut(&other_id) {
                        apply_damage(target, damage, &soul.id);
                        self.events.push(ServerMessage::Attack {
                            attacker_id: soul.id.clone(),
                            target_id: other_id.clone(),
                            damage,
                            attacker_pos: Vec2 {
                                x: soul.x,
                                y: soul.y,
                            },
                            target_pos: Vec2 {
                                x: target.x,
                                y: target.y,
                            },
                        });
                        damaged.push(other_id.clone());
                    }
                }
            }

            if dist < MIN_SEPARATION {
                if let Some(other) = self.store.soul_mut(&other_id) {
                    separate(soul, other, dist);
                }
            }
        }
        damaged
    }

    /// Damage breaks concentration: spells are interrupted, matings cancelled.
    fn disturb(&mut self, soul_id: &str) {
        let Some(activity) = self.store.soul(soul_id).map(|soul| soul.activity.clone()) else {
            return;
        };
        match activity {
            Activity::Roaming => {}
            Activity::Casting(spell_id) => {
                self.interrupt_spell(&spell_id, InterruptReason::Damaged);
            }
            Activity::Mating(mating_id) => {
                self.cancel_mating(&mating_id, CancelReason::Damaged);
            }
        }
    }

    fn sweep_dead(&mut self) {
        let dead: Vec<String> = self
            .store
            .souls()
            .filter(|soul| !soul.is_alive())
            .map(|soul| soul.id.clone())
            .collect();
        for id in dead {
            let Some(soul) = self.store.remove_soul(&id) else {
                continue;
            };
            match &soul.activity {
                Activity::Roaming => {}
                Activity::Casting(spell_id) => {
                    self.interrupt_spell(spell_id, InterruptReason::CasterDied);
                }
                Activity::Mating(mating_id) => {
                    self.cancel_mating(mating_id, CancelReason::ParentDied);
                }
            }
            self.counters.deaths += 1;
            debug!(soul = %id, killer = ?soul.last_attacker, "soul died");
            self.events.push(ServerMessage::CharacterDeath {
                character_id: id.clone(),
                killer_id: soul.last_attacker.clone(),
                x: soul.x,
                y: soul.y,
                team: soul.team,
            });
            self.events
                .push(ServerMessage::CharacterRemove { character_id: id });
        }
    }
}

fn reflect(soul: &mut Soul) {
    let (x, vx) = clamp_axis(soul.x, soul.vx);
    let (y, vy) = clamp_axis(soul.y, soul.vy);
    soul.x = x;
    soul.vx = vx;
    soul.y = y;
    soul.vy = vy;
}

fn apply_damage(target: &mut Soul, damage: f32, attacker_id: &str) {
    target.add_energy(-damage);
    target.last_attacker = Some(attacker_id.to_string());
}

/// Pushes both souls apart along the line between them until they are
/// `MIN_SEPARATION` apart. Coincident souls separate along x.
fn separate(a: &mut Soul, b: &mut Soul, dist: f32) {
    let (nx, ny) = if dist > f32::EPSILON {
        ((a.x - b.x) / dist, (a.y - b.y) / dist)
    } else {
        (1.0, 0.0)
    };
    let push = (MIN_SEPARATION - dist) / 2.0;
    a.x += nx * push;
    a.y += ny * push;
    b.x -= nx * push;
    b.y -= ny * push;
    a.x = a.x.clamp(WORLD_MARGIN, WORLD_SIZE - WORLD_MARGIN);
    a.y = a.y.clamp(WORLD_MARGIN, WORLD_SIZE - WORLD_MARGIN);
    b.x = b.x.clamp(WORLD_MARGIN, WORLD_SIZE - WORLD_MARGIN);
    b.y = b.y.clamp(WORLD_MARGIN, WORLD_SIZE - WORLD_MARGIN);
}
