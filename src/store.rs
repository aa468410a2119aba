use std::collections::BTreeMap;

use crate::constants::{WORLD_MARGIN, WORLD_SIZE};
use crate::types::{OrbView, SoulView, Team};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Activity {
    Roaming,
    Casting(String),
    Mating(String),
}

#[derive(Clone, Debug)]
pub struct Soul {
    pub id: String,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    energy: f32,
    pub max_energy: f32,
    pub search_radius: f32,
    pub movement_speed: f32,
    pub last_attack_ms: u64,
    pub attack_cooldown_ms: u64,
    pub attack_range: f32,
    pub mature: bool,
    pub born_at_ms: u64,
    pub activity: Activity,
    pub last_attacker: Option<String>,
}

impl Soul {
    pub fn energy(&self) -> f32 {
        self.energy
    }

    /// Every energy write goes through here so `0 <= energy <= max_energy`.
    pub fn set_energy(&mut self, value: f32) {
        let max = if self.max_energy.is_finite() {
            self.max_energy.max(0.0)
        } else {
            0.0
        };
        self.energy = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, max)
        };
    }

    pub fn add_energy(&mut self, delta: f32) {
        self.set_energy(self.energy + delta);
    }

    pub fn is_alive(&self) -> bool {
        self.energy > 0.0
    }

    pub fn is_roaming(&self) -> bool {
        self.activity == Activity::Roaming
    }

    /// Resets non-finite kinematics so one bad soul cannot poison the tick.
    pub fn sanitize(&mut self) {
        if !self.x.is_finite() || !self.y.is_finite() {
            self.x = WORLD_SIZE / 2.0;
            self.y = WORLD_SIZE / 2.0;
        }
        if !self.vx.is_finite() || !self.vy.is_finite() {
            self.vx = 0.0;
            self.vy = 0.0;
        }
        self.x = self.x.clamp(WORLD_MARGIN, WORLD_SIZE - WORLD_MARGIN);
        self.y = self.y.clamp(WORLD_MARGIN, WORLD_SIZE - WORLD_MARGIN);
        self.set_energy(self.energy);
    }

    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }

    pub fn view(&self) -> SoulView {
        SoulView {
            id: self.id.clone(),
            team: self.team,
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            energy: self.energy,
            max_energy: self.max_energy,
            mature: self.mature,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SoulSpec {
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub energy: f32,
    pub max_energy: f32,
    pub search_radius: f32,
    pub movement_speed: f32,
    pub attack_cooldown_ms: u64,
    pub attack_range: f32,
    pub mature: bool,
    pub born_at_ms: u64,
}

#[derive(Clone, Debug)]
pub struct EnergyOrb {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub energy: f32,
    pub respawn_at_ms: u64,
}

impl EnergyOrb {
    pub fn is_available(&self, now_ms: u64) -> bool {
        self.respawn_at_ms <= now_ms
    }

    pub fn view(&self) -> OrbView {
        OrbView {
            id: self.id.clone(),
            x: self.x,
            y: self.y,
            energy: self.energy,
            respawn_time: self.respawn_at_ms,
        }
    }
}

/// Canonical souls and orbs, keyed by id. Only the simulator mutates it.
#[derive(Clone, Debug, Default)]
pub struct EntityStore {
    souls: BTreeMap<String, Soul>,
    orbs: BTreeMap<String, EnergyOrb>,
    next_id_counter: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            next_id_counter: 1,
            ..Self::default()
        }
    }

    pub fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{}_{}", prefix, self.next_id_counter.max(1));
        self.next_id_counter = self.next_id_counter.max(1).saturating_add(1);
        id
    }

    pub fn spawn_soul(&mut self, spec: SoulSpec) -> String {
        let id = self.next_id("soul");
        let mut soul = Soul {
            id: id.clone(),
            team: spec.team,
            x: spec.x,
            y: spec.y,
            vx: 0.0,
            vy: 0.0,
            energy: 0.0,
            max_energy: spec.max_energy,
            search_radius: spec.search_radius,
            movement_speed: spec.movement_speed,
            last_attack_ms: 0,
            attack_cooldown_ms: spec.attack_cooldown_ms,
            attack_range: spec.attack_range,
            mature: spec.mature,
            born_at_ms: spec.born_at_ms,
            activity: Activity::Roaming,
            last_attacker: None,
        };
        soul.set_energy(spec.energy);
        soul.sanitize();
        self.souls.insert(id.clone(), soul);
        id
    }

    pub fn spawn_orb(&mut self, x: f32, y: f32, energy: f32) -> String {
        let id = self.next_id("orb");
        self.orbs.insert(
            id.clone(),
            EnergyOrb {
                id: id.clone(),
                x,
                y,
                energy,
                respawn_at_ms: 0,
            },
        );
        id
    }

    pub fn soul(&self, id: &str) -> Option<&Soul> {
        self.souls.get(id)
    }

    pub fn soul_mut(&mut self, id: &str) -> Option<&mut Soul> {
        self.souls.get_mut(id)
    }

    pub fn remove_soul(&mut self, id: &str) -> Option<Soul> {
        self.souls.remove(id)
    }

    /// Reinserts a soul taken out with `remove_soul`.
    pub fn put_soul(&mut self, soul: Soul) {
        self.souls.insert(soul.id.clone(), soul);
    }

    pub fn souls(&self) -> impl Iterator<Item = &Soul> {
        self.souls.values()
    }

    pub fn souls_mut(&mut self) -> impl Iterator<Item = &mut Soul> {
        self.souls.values_mut()
    }

    /// Ids in stable iteration order.
    pub fn soul_ids(&self) -> Vec<String> {
        self.souls.keys().cloned().collect()
    }

    pub fn soul_count(&self) -> usize {
        self.souls.len()
    }

    pub fn team_population(&self, team: Team) -> usize {
        self.souls.values().filter(|soul| soul.team == team).count()
    }

    pub fn orb(&self, id: &str) -> Option<&EnergyOrb> {
        self.orbs.get(id)
    }

    pub fn orb_mut(&mut self, id: &str) -> Option<&mut EnergyOrb> {
        self.orbs.get_mut(id)
    }

    pub fn orbs(&self) -> impl Iterator<Item = &EnergyOrb> {
        self.orbs.values()
    }

    pub fn orb_ids(&self) -> Vec<String> {
        self.orbs.keys().cloned().collect()
    }

    pub fn available_orbs(&self, now_ms: u64) -> impl Iterator<Item = &EnergyOrb> {
        self.orbs
            .values()
            .filter(move |orb| orb.is_available(now_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(energy: f32) -> SoulSpec {
        SoulSpec {
            team: Team::Light,
            x: 100.0,
            y: 100.0,
            energy,
            max_energy: 100.0,
            search_radius: 200.0,
            movement_speed: 2.0,
            attack_cooldown_ms: 1_000,
            attack_range: 40.0,
            mature: true,
            born_at_ms: 0,
        }
    }

    #[test]
    fn energy_is_clamped_on_every_write() {
        let mut store = EntityStore::new();
        let id = store.spawn_soul(spec(250.0));
        let soul = store.soul_mut(&id).expect("spawned");
        assert_eq!(soul.energy(), 100.0);
        soul.add_energy(-500.0);
        assert_eq!(soul.energy(), 0.0);
        soul.set_energy(f32::NAN);
        assert_eq!(soul.energy(), 0.0);
        soul.set_energy(f32::INFINITY);
        assert_eq!(soul.energy(), 100.0);
    }

    #[test]
    fn sanitize_recovers_nan_position() {
        let mut store = EntityStore::new();
        let id = store.spawn_soul(spec(50.0));
        let soul = store.soul_mut(&id).expect("spawned");
        soul.x = f32::NAN;
        soul.vy = f32::INFINITY;
        soul.sanitize();
        assert!(soul.x.is_finite());
        assert_eq!(soul.vx, 0.0);
        assert_eq!(soul.vy, 0.0);
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let mut store = EntityStore::new();
        let a = store.spawn_soul(spec(10.0));
        let b = store.spawn_orb(5.0, 5.0, 10.0);
        let c = store.spawn_soul(spec(10.0));
        assert_eq!(a, "soul_1");
        assert_eq!(b, "orb_2");
        assert_eq!(c, "soul_3");
    }

    #[test]
    fn available_orbs_respects_respawn_time() {
        let mut store = EntityStore::new();
        let id = store.spawn_orb(5.0, 5.0, 10.0);
        store.orb_mut(&id).expect("orb").respawn_at_ms = 500;
        assert_eq!(store.available_orbs(499).count(), 0);
        assert_eq!(store.available_orbs(500).count(), 1);
    }
}
