use super::*;
use crate::constants::{
    ATTACK_COOLDOWN_MS, ATTACK_RANGE, CHILD_MOVEMENT_SPEED, CHILD_START_ENERGY, MATING_CHANCE,
    MATING_DURATION_MS, MATING_ENERGY_COST, MATING_ENERGY_THRESHOLD, MATING_RANGE,
    MAX_SOULS_PER_TEAM, SOUL_MATURE_MS, SOUL_MAX_ENERGY, SOUL_MOVEMENT_SPEED,
    SOUL_SEARCH_RADIUS, SOUL_START_ENERGY,
};
use crate::store::SoulSpec;

impl WorldSimulator {
    pub(super) fn adult_spec(&self, team: Team, x: f32, y: f32) -> SoulSpec {
        SoulSpec {
            team,
            x,
            y,
            energy: SOUL_START_ENERGY,
            max_energy: SOUL_MAX_ENERGY,
            search_radius: SOUL_SEARCH_RADIUS,
            movement_speed: SOUL_MOVEMENT_SPEED,
            attack_cooldown_ms: ATTACK_COOLDOWN_MS,
            attack_range: ATTACK_RANGE,
            mature: true,
            born_at_ms: self.now_ms(),
        }
    }

    fn child_spec(&self, team: Team, x: f32, y: f32) -> SoulSpec {
        SoulSpec {
            energy: CHILD_START_ENERGY,
            movement_speed: CHILD_MOVEMENT_SPEED,
            mature: false,
            ..self.adult_spec(team, x, y)
        }
    }

    fn can_mate(&self, soul_id: &str) -> bool {
        self.store
            .soul(soul_id)
            .map(|soul| {
                soul.mature && soul.is_roaming() && soul.energy() >= MATING_ENERGY_THRESHOLD
            })
            .unwrap_or(false)
    }

    pub(super) fn start_matings(&mut self, now_ms: u64) {
        let ids = self.store.soul_ids();
        for (idx, a_id) in ids.iter().enumerate() {
            for b_id in ids.iter().skip(idx + 1) {
                if !self.can_mate(a_id) {
                    break;
                }
                if !self.can_mate(b_id) {
                    continue;
                }
                let (Some(a), Some(b)) = (self.store.soul(a_id), self.store.soul(b_id)) else {
                    continue;
                };
                if a.team != b.team
                    || self.store.team_population(a.team) >= MAX_SOULS_PER_TEAM
                    || distance(a.x, a.y, b.x, b.y) > MATING_RANGE
                {
                    continue;
                }
                if self.rng.chance(MATING_CHANCE) {
                    self.begin_mating(a_id, b_id, now_ms);
                }
            }
        }
    }

    pub(super) fn begin_mating(&mut self, parent_a: &str, parent_b: &str, now_ms: u64) -> String {
        let id = self.store.next_id("mating");
        for parent in [parent_a, parent_b] {
            if let Some(soul) = self.store.soul_mut(parent) {
                soul.activity = Activity::Mating(id.clone());
                soul.vx = 0.0;
                soul.vy = 0.0;
            }
        }
        self.matings.insert(
            id.clone(),
            Mating {
                id: id.clone(),
                parent_a: parent_a.to_string(),
                parent_b: parent_b.to_string(),
                started_at_ms: now_ms,
                duration_ms: MATING_DURATION_MS,
            },
        );
        self.events.push(ServerMessage::MatingStarted {
            mating_id: id.clone(),
            parent_a: parent_a.to_string(),
            parent_b: parent_b.to_string(),
            duration_ms: MATING_DURATION_MS,
        });
        id
    }

    pub(super) fn update_matings(&mut self, now_ms: u64) {
        let ids: Vec<String> = self.matings.keys().cloned().collect();
        for id in ids {
            let Some(mating) = self.matings.get(&id).cloned() else {
                continue;
            };
            let (Some(a), Some(b)) = (
                self.store.soul(&mating.parent_a),
                self.store.soul(&mating.parent_b),
            ) else {
                self.cancel_mating(&id, CancelReason::ParentDied);
                continue;
            };
            if distance(a.x, a.y, b.x, b.y) > MATING_RANGE * 2.0 {
                self.cancel_mating(&id, CancelReason::Separated);
                continue;
            }
            let (team, mid_x, mid_y) = (a.team, (a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
            if now_ms < mating.started_at_ms.saturating_add(mating.duration_ms) {
                continue;
            }
            if self.store.team_population(team) >= MAX_SOULS_PER_TEAM {
                self.cancel_mating(&id, CancelReason::PopulationCap);
                continue;
            }

            self.matings.remove(&id);
            for parent in [&mating.parent_a, &mating.parent_b] {
                if let Some(soul) = self.store.soul_mut(parent) {
                    soul.add_energy(-MATING_ENERGY_COST);
                    soul.activity = Activity::Roaming;
                }
            }
            let spec = self.child_spec(team, mid_x, mid_y);
            let child_id = self.store.spawn_soul(spec);
            self.counters.births += 1;
            debug!(child = %child_id, mating = %id, "soul born");
            if let Some(child) = self.store.soul(&child_id) {
                self.events.push(ServerMessage::CharacterSpawn {
                    character: child.view(),
                });
            }
            self.events.push(ServerMessage::MatingCompleted {
                mating_id: mating.id,
                parent_a: mating.parent_a,
                parent_b: mating.parent_b,
                child_id,
            });
        }
    }

    pub(super) fn cancel_mating(&mut self, mating_id: &str, reason: CancelReason) {
        let Some(mating) = self.matings.remove(mating_id) else {
            return;
        };
        self.release(&mating.parent_a);
        self.release(&mating.parent_b);
        self.events.push(ServerMessage::MatingCancelled {
            mating_id: mating.id,
            reason,
        });
    }

    pub(super) fn mature_souls(&mut self, now_ms: u64) {
        let mut matured = Vec::new();
        for soul in self.store.souls_mut() {
            if !soul.mature && now_ms.saturating_sub(soul.born_at_ms) >= SOUL_MATURE_MS {
                soul.mature = true;
                soul.movement_speed = SOUL_MOVEMENT_SPEED;
                matured.push(soul.id.clone());
            }
        }
        for character_id in matured {
            self.events.push(ServerMessage::SoulMatured { character_id });
        }
    }

    /// One fresh soul per starved team, placed next to its nexus.
    pub(super) fn reinforce_teams(&mut self) {
        for team in Team::ALL {
            if self.store.team_population(team) >= self.config.min_population {
                continue;
            }
            let (nx, ny) = nexus_position(team);
            let x = nx + self.rng.range(-30.0, 30.0);
            let y = ny + self.rng.range(-30.0, 30.0);
            let spec = self.adult_spec(team, x, y);
            let id = self.store.spawn_soul(spec);
            debug!(soul = %id, team = ?team, "nexus reinforcement");
            if let Some(soul) = self.store.soul(&id) {
                self.events.push(ServerMessage::CharacterSpawn {
                    character: soul.view(),
                });
            }
        }
    }
}
