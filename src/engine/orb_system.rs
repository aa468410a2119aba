use super::utils::random_world_point;
use super::*;
use crate::constants::{ORB_ENERGY_MAX, ORB_ENERGY_MIN, ORB_RESPAWN_MAX_MS, ORB_RESPAWN_MIN_MS};

impl WorldSimulator {
    pub(super) fn spawn_orb(&mut self) -> String {
        let (x, y) = random_world_point(&mut self.rng);
        let energy = self.rng.int(ORB_ENERGY_MIN, ORB_ENERGY_MAX) as f32;
        self.store.spawn_orb(x, y, energy)
    }

    /// Marks an available orb collected and schedules its respawn. Returns
    /// the energy it grants, or `None` if it was not collectible.
    pub(super) fn collect_orb(
        &mut self,
        orb_id: &str,
        collector_id: &str,
        now_ms: u64,
    ) -> Option<f32> {
        let respawn_at = now_ms + self.rng.millis(ORB_RESPAWN_MIN_MS, ORB_RESPAWN_MAX_MS);
        let orb = self.store.orb_mut(orb_id)?;
        if !orb.is_available(now_ms) {
            return None;
        }
        orb.respawn_at_ms = respawn_at;
        let energy = orb.energy;
        self.counters.orbs_collected += 1;
        self.events.push(ServerMessage::OrbCollected {
            orb_id: orb_id.to_string(),
            collector_id: collector_id.to_string(),
            respawn_time: respawn_at,
        });
        Some(energy)
    }

    pub(super) fn respawn_orbs(&mut self, now_ms: u64) {
        for orb_id in self.store.orb_ids() {
            let due = self
                .store
                .orb(&orb_id)
                .map(|orb| orb.respawn_at_ms > 0 && orb.respawn_at_ms <= now_ms)
                .unwrap_or(false);
            if !due {
                continue;
            }
            let (x, y) = random_world_point(&mut self.rng);
            let energy = self.rng.int(ORB_ENERGY_MIN, ORB_ENERGY_MAX) as f32;
            let Some(orb) = self.store.orb_mut(&orb_id) else {
                continue;
            };
            orb.x = x;
            orb.y = y;
            orb.energy = energy;
            orb.respawn_at_ms = 0;
            let view = orb.view();
            self.events.push(ServerMessage::OrbSpawned { orb: view });
        }
    }
}
