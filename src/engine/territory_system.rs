use super::*;
use crate::constants::{
    team_tile, SPELL_CHANCE, SPELL_DURATION_MS, SPELL_ENERGY_COST, SPELL_MIN_RESERVE,
};

impl WorldSimulator {
    fn tile_has_spell(&self, tile_x: i32, tile_y: i32) -> bool {
        self.spells
            .values()
            .any(|spell| spell.tile_x == tile_x && spell.tile_y == tile_y)
    }

    /// Mature roaming souls standing on enemy ground may begin channelling a
    /// conquest of that tile.
    pub(super) fn start_spells(&mut self, now_ms: u64) {
        for id in self.store.soul_ids() {
            let Some(soul) = self.store.soul(&id) else {
                continue;
            };
            if !soul.mature
                || !soul.is_roaming()
                || soul.energy() < SPELL_ENERGY_COST + SPELL_MIN_RESERVE
            {
                continue;
            }
            let Some((tile_x, tile_y)) = self.tiles.tile_at_world(soul.x, soul.y) else {
                continue;
            };
            let team = soul.team;
            if self.tiles.get(tile_x, tile_y) == Some(team_tile(team)) {
                continue;
            }
            if self.tile_has_spell(tile_x, tile_y) || !self.rng.chance(SPELL_CHANCE) {
                continue;
            }
            self.begin_spell(&id, tile_x, tile_y, now_ms);
        }
    }

    pub(super) fn begin_spell(
        &mut self,
        caster_id: &str,
        tile_x: i32,
        tile_y: i32,
        now_ms: u64,
    ) -> Option<String> {
        let spell_id = self.store.next_id("spell");
        let soul = self.store.soul_mut(caster_id)?;
        soul.add_energy(-SPELL_ENERGY_COST);
        soul.activity = Activity::Casting(spell_id.clone());
        soul.vx = 0.0;
        soul.vy = 0.0;
        let spell = SpellView {
            id: spell_id.clone(),
            caster_id: caster_id.to_string(),
            team: soul.team,
            tile_x,
            tile_y,
            started_at: now_ms,
            duration_ms: SPELL_DURATION_MS,
        };
        self.spells.insert(spell_id.clone(), spell.clone());
        self.events.push(ServerMessage::SpellStarted { spell });
        Some(spell_id)
    }

    pub(super) fn complete_spells(&mut self, now_ms: u64) {
        let due: Vec<String> = self
            .spells
            .values()
            .filter(|spell| now_ms >= spell.started_at.saturating_add(spell.duration_ms))
            .map(|spell| spell.id.clone())
            .collect();
        for spell_id in due {
            let Some(spell) = self.spells.remove(&spell_id) else {
                continue;
            };
            self.release(&spell.caster_id);
            let new_type = team_tile(spell.team);
            if self.tiles.set(spell.tile_x, spell.tile_y, new_type) {
                self.counters.conquests += 1;
                debug!(
                    tile_x = spell.tile_x,
                    tile_y = spell.tile_y,
                    team = ?spell.team,
                    "tile conquered"
                );
                self.events.push(ServerMessage::TileUpdated {
                    tile_x: spell.tile_x,
                    tile_y: spell.tile_y,
                    new_type,
                });
            }
            self.events.push(ServerMessage::SpellCompleted {
                spell_id,
                caster_id: spell.caster_id,
                tile_x: spell.tile_x,
                tile_y: spell.tile_y,
            });
        }
    }

    pub(super) fn interrupt_spell(&mut self, spell_id: &str, reason: InterruptReason) {
        let Some(spell) = self.spells.remove(spell_id) else {
            return;
        };
        self.release(&spell.caster_id);
        self.events.push(ServerMessage::SpellInterrupted {
            spell_id: spell.id,
            caster_id: spell.caster_id,
            reason,
        });
    }

    /// Returns a casting or mating soul to roaming.
    pub(super) fn release(&mut self, soul_id: &str) {
        if let Some(soul) = self.store.soul_mut(soul_id) {
            soul.activity = Activity::Roaming;
        }
    }
}
