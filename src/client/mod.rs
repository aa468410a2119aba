//! Viewer-side replica of the world. Authoritative state arrives as
//! `ServerMessage`s; local-only state (interpolated positions, dying flags,
//! pending removals) lives next to it and is never sent anywhere.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use crate::constants::{
    INTERPOLATION_SMOOTHING, REMOVE_DELAY_MS, SNAP_DISTANCE, SPELL_CLEANUP_GRACE_MS,
};
use crate::protocol::{CancelReason, InterruptReason, ServerMessage};
use crate::territory::{ClassifiedMap, TileGrid};
use crate::types::{DayNightPhase, DayNightState, Statistics, Vec2, WorldState};

pub mod connection;
pub mod managers;

pub use self::managers::{
    CharacterEntity, EntityKind, EntityManager, NexusEntity, OrbEntity, ReconcileStats,
    Replicated, SpellEntity,
};

/// Frame length the smoothing constant is tuned for.
const REFERENCE_FRAME_MS: f32 = 1000.0 / 60.0;

/// What a renderer needs to hear about: cache lifecycle plus one-shot
/// effect notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewEvent {
    Created {
        kind: EntityKind,
        id: String,
    },
    Removed {
        kind: EntityKind,
        id: String,
    },
    Died {
        id: String,
        killer_id: Option<String>,
        position: Vec2,
    },
    OrbCollected {
        orb_id: String,
        collector_id: String,
    },
    Attack {
        attacker_id: String,
        target_id: String,
        damage: f32,
        from: Vec2,
        to: Vec2,
    },
    TileChanged {
        tile_x: i32,
        tile_y: i32,
        reclassified: usize,
    },
    SpellInterrupted {
        spell_id: String,
        reason: InterruptReason,
    },
    MatingStarted {
        mating_id: String,
        parent_a: String,
        parent_b: String,
    },
    MatingCompleted {
        mating_id: String,
        child_id: String,
    },
    MatingCancelled {
        mating_id: String,
        reason: CancelReason,
    },
    SoulMatured {
        id: String,
    },
    PhaseChanged(DayNightPhase),
    Cleared,
}

#[derive(Debug, Default)]
pub struct ClientReconciler {
    characters: EntityManager<CharacterEntity>,
    orbs: EntityManager<OrbEntity>,
    spells: EntityManager<SpellEntity>,
    nexuses: EntityManager<NexusEntity>,
    tiles: Option<ClassifiedMap>,
    /// Character id to the client time its removal fires.
    pending_removals: BTreeMap<String, u64>,
    day_night: Option<DayNightState>,
    statistics: Option<Statistics>,
    stats: ReconcileStats,
    events: Vec<ViewEvent>,
}

impl ClientReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn characters(&self) -> &EntityManager<CharacterEntity> {
        &self.characters
    }

    pub fn orbs(&self) -> &EntityManager<OrbEntity> {
        &self.orbs
    }

    pub fn spells(&self) -> &EntityManager<SpellEntity> {
        &self.spells
    }

    pub fn nexuses(&self) -> &EntityManager<NexusEntity> {
        &self.nexuses
    }

    pub fn tiles(&self) -> Option<&ClassifiedMap> {
        self.tiles.as_ref()
    }

    pub fn day_night(&self) -> Option<DayNightState> {
        self.day_night
    }

    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    pub fn pending_removal(&self, id: &str) -> Option<u64> {
        self.pending_removals.get(id).copied()
    }

    pub fn drain_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn apply(&mut self, message: ServerMessage, now_ms: u64) {
        match message {
            ServerMessage::WorldState(state) => self.apply_snapshot(state, now_ms),
            ServerMessage::CharacterUpdate { character } => {
                let Some(entity) = self.characters.get_mut(&character.id) else {
                    trace!(id = %character.id, "update for unknown character");
                    return;
                };
                entity.record.apply_patch(&character);
                entity.retarget();
                self.stats.updated += 1;
            }
            ServerMessage::CharacterSpawn { character } => {
                self.pending_removals.remove(&character.id);
                let stats = self.characters.upsert(character, now_ms, &mut self.events);
                self.stats.absorb(stats);
            }
            ServerMessage::CharacterRemove { character_id } => {
                if !self.characters.contains(&character_id) {
                    trace!(id = %character_id, "remove for unknown character");
                    return;
                }
                self.pending_removals
                    .entry(character_id)
                    .or_insert(now_ms.saturating_add(REMOVE_DELAY_MS));
            }
            ServerMessage::CharacterDeath {
                character_id,
                killer_id,
                x,
                y,
                ..
            } => {
                if let Some(entity) = self.characters.get_mut(&character_id) {
                    entity.dying = true;
                }
                self.events.push(ViewEvent::Died {
                    id: character_id,
                    killer_id,
                    position: Vec2 { x, y },
                });
            }
            ServerMessage::OrbSpawned { orb } => {
                let stats = self.orbs.upsert(orb, now_ms, &mut self.events);
                self.stats.absorb(stats);
            }
            ServerMessage::OrbCollected {
                orb_id,
                collector_id,
                ..
            } => {
                if self.orbs.remove(&orb_id, &mut self.events).is_some() {
                    self.stats.removed += 1;
                }
                self.events.push(ViewEvent::OrbCollected {
                    orb_id,
                    collector_id,
                });
            }
            ServerMessage::Attack {
                attacker_id,
                target_id,
                damage,
                attacker_pos,
                target_pos,
            } => {
                if let Some(target) = self.characters.get_mut(&target_id) {
                    target.record.energy = (target.record.energy - damage).max(0.0);
                }
                self.events.push(ViewEvent::Attack {
                    attacker_id,
                    target_id,
                    damage,
                    from: attacker_pos,
                    to: target_pos,
                });
            }
            ServerMessage::TileUpdated {
                tile_x,
                tile_y,
                new_type,
            } => {
                let Some(tiles) = self.tiles.as_mut() else {
                    trace!(tile_x, tile_y, "tile update before any tile map");
                    return;
                };
                let reclassified = tiles.set_tile(tile_x, tile_y, new_type);
                self.events.push(ViewEvent::TileChanged {
                    tile_x,
                    tile_y,
                    reclassified,
                });
            }
            ServerMessage::SpellStarted { spell } => {
                let stats = self.spells.upsert(spell, now_ms, &mut self.events);
                self.stats.absorb(stats);
            }
            ServerMessage::SpellCompleted { spell_id, .. } => {
                self.remove_spell(&spell_id);
            }
            ServerMessage::SpellInterrupted {
                spell_id, reason, ..
            } => {
                self.remove_spell(&spell_id);
                self.events.push(ViewEvent::SpellInterrupted { spell_id, reason });
            }
            ServerMessage::MatingStarted {
                mating_id,
                parent_a,
                parent_b,
                ..
            } => {
                self.events.push(ViewEvent::MatingStarted {
                    mating_id,
                    parent_a,
                    parent_b,
                });
            }
            ServerMessage::MatingCompleted {
                mating_id,
                child_id,
                ..
            } => {
                self.events.push(ViewEvent::MatingCompleted { mating_id, child_id });
            }
            ServerMessage::MatingCancelled { mating_id, reason } => {
                self.events.push(ViewEvent::MatingCancelled { mating_id, reason });
            }
            ServerMessage::SoulMatured { character_id } => {
                if let Some(entity) = self.characters.get_mut(&character_id) {
                    entity.record.mature = true;
                    entity.retarget();
                }
                self.events.push(ViewEvent::SoulMatured { id: character_id });
            }
            ServerMessage::DayNightPhaseChange { day_night_state } => {
                self.day_night = Some(day_night_state);
                self.events.push(ViewEvent::PhaseChanged(day_night_state.phase));
            }
            ServerMessage::StatisticsUpdate { statistics } => {
                self.statistics = Some(statistics);
            }
            ServerMessage::Disconnected {} => self.clear(),
        }
    }

    fn apply_snapshot(&mut self, state: WorldState, now_ms: u64) {
        for character in &state.characters {
            self.pending_removals.remove(&character.id);
        }
        let mut stats = ReconcileStats::default();
        stats.absorb(
            self.characters
                .reconcile(state.characters, now_ms, &mut self.events),
        );
        stats.absorb(self.orbs.reconcile(state.energy_orbs, now_ms, &mut self.events));
        stats.absorb(self.nexuses.reconcile(state.nexuses, now_ms, &mut self.events));
        stats.absorb(
            self.spells
                .reconcile(state.active_spells, now_ms, &mut self.events),
        );
        let characters = &self.characters;
        self.pending_removals.retain(|id, _| characters.contains(id));

        if let Some(view) = state.tile_map.as_ref() {
            match TileGrid::from_view(view) {
                Ok(grid) => self.tiles = Some(ClassifiedMap::new(grid)),
                Err(error) => warn!(%error, "ignoring tile map"),
            }
        }
        if state.day_night_state.is_some() {
            self.day_night = state.day_night_state;
        }
        if state.statistics.is_some() {
            self.statistics = state.statistics;
        }
        debug!(
            created = stats.created,
            updated = stats.updated,
            removed = stats.removed,
            "world_state reconciled"
        );
        self.stats.absorb(stats);
        self.cleanup_spells(now_ms);
    }

    fn remove_spell(&mut self, spell_id: &str) {
        if self.spells.remove(spell_id, &mut self.events).is_some() {
            self.stats.removed += 1;
        } else {
            trace!(id = spell_id, "end of unknown spell");
        }
    }

    /// Spells whose end message never arrived are dropped once they have
    /// outlived their duration plus a grace period.
    fn cleanup_spells(&mut self, now_ms: u64) {
        let expired: Vec<String> = self
            .spells
            .iter()
            .filter(|(_, spell)| {
                now_ms.saturating_sub(spell.local_started_ms)
                    > spell.record.duration_ms + SPELL_CLEANUP_GRACE_MS
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            debug!(id = %id, "forced spell cleanup");
            self.remove_spell(&id);
        }
    }

    /// Fires due delayed removals and the spell cleanup pass.
    pub fn advance(&mut self, now_ms: u64) {
        let due: Vec<String> = self
            .pending_removals
            .iter()
            .filter(|(_, deadline)| **deadline <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in due {
            self.pending_removals.remove(&id);
            if self.characters.remove(&id, &mut self.events).is_some() {
                self.stats.removed += 1;
            }
        }
        self.cleanup_spells(now_ms);
    }

    /// Moves rendered positions towards their targets. Only local state is
    /// written.
    pub fn interpolate(&mut self, dt_ms: f32) {
        let frames = (dt_ms.max(0.0) / REFERENCE_FRAME_MS).min(60.0);
        let factor = 1.0 - (1.0 - INTERPOLATION_SMOOTHING).powf(frames);
        for (_, entity) in self.characters.iter_mut() {
            let dx = entity.target.x - entity.current.x;
            let dy = entity.target.y - entity.current.y;
            if (dx * dx + dy * dy).sqrt() > SNAP_DISTANCE {
                entity.current = entity.target;
                continue;
            }
            entity.current.x += dx * factor;
            entity.current.y += dy * factor;
        }
    }

    /// Forgets everything; the next `world_state` rebuilds the cache.
    pub fn clear(&mut self) {
        let dropped = self.characters.clear()
            + self.orbs.clear()
            + self.spells.clear()
            + self.nexuses.clear();
        self.pending_removals.clear();
        self.tiles = None;
        self.day_night = None;
        self.statistics = None;
        debug!(dropped, "client caches cleared");
        self.events.push(ViewEvent::Cleared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::territory::TileVariant;
    use crate::types::{CharacterPatch, OrbView, SoulView, SpellView, Team, TileType};

    fn soul(id: &str, x: f32) -> SoulView {
        SoulView {
            id: id.to_string(),
            team: Team::Light,
            x,
            y: 300.0,
            vx: 0.0,
            vy: 0.0,
            energy: 60.0,
            max_energy: 100.0,
            mature: true,
        }
    }

    fn orb(id: &str) -> OrbView {
        OrbView {
            id: id.to_string(),
            x: 50.0,
            y: 60.0,
            energy: 15.0,
            respawn_time: 0,
        }
    }

    fn spell(id: &str) -> SpellView {
        SpellView {
            id: id.to_string(),
            caster_id: "soul_1".to_string(),
            team: Team::Dark,
            tile_x: 2,
            tile_y: 2,
            started_at: 0,
            duration_ms: 3_000,
        }
    }

    fn snapshot(characters: Vec<SoulView>, orbs: Vec<OrbView>) -> ServerMessage {
        ServerMessage::WorldState(WorldState {
            characters,
            energy_orbs: orbs,
            ..WorldState::default()
        })
    }

    fn patch_x(id: &str, x: f32) -> ServerMessage {
        ServerMessage::CharacterUpdate {
            character: CharacterPatch {
                id: id.to_string(),
                x: Some(x),
                ..CharacterPatch::default()
            },
        }
    }

    #[test]
    fn snapshot_makes_local_ids_equal_server_ids() {
        let mut client = ClientReconciler::new();
        client.apply(snapshot(vec![soul("a", 1.0), soul("b", 2.0)], vec![orb("o")]), 0);
        client.apply(snapshot(vec![soul("b", 3.0), soul("c", 4.0)], vec![]), 10);

        let ids: Vec<String> = client.characters().ids().into_iter().collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
        assert!(client.orbs().is_empty());
    }

    #[test]
    fn same_snapshot_twice_is_idempotent() {
        let mut client = ClientReconciler::new();
        let state = snapshot(vec![soul("a", 1.0), soul("b", 2.0)], vec![orb("o")]);
        client.apply(state.clone(), 0);
        let first = client.stats();
        client.drain_events();

        client.apply(state, 5);
        let second = client.stats();
        assert_eq!(second.created, first.created);
        assert_eq!(second.removed, first.removed);
        assert!(client.drain_events().is_empty());
    }

    #[test]
    fn unknown_ids_are_silent_noops() {
        let mut client = ClientReconciler::new();
        client.apply(patch_x("ghost", 10.0), 0);
        client.apply(
            ServerMessage::CharacterRemove {
                character_id: "ghost".to_string(),
            },
            0,
        );
        client.apply(
            ServerMessage::SpellCompleted {
                spell_id: "spell_9".to_string(),
                caster_id: "ghost".to_string(),
                tile_x: 0,
                tile_y: 0,
            },
            0,
        );
        assert!(client.characters().is_empty());
        assert_eq!(client.pending_removal("ghost"), None);
        assert_eq!(client.stats(), ReconcileStats::default());
    }

    #[test]
    fn partial_update_leaves_absent_fields() {
        let mut client = ClientReconciler::new();
        client.apply(snapshot(vec![soul("a", 100.0)], vec![]), 0);
        client.apply(patch_x("a", 120.0), 1);

        let entity = client.characters().get("a").expect("cached");
        assert_eq!(entity.record.x, 120.0);
        assert_eq!(entity.record.y, 300.0);
        assert_eq!(entity.record.energy, 60.0);
        assert_eq!(entity.target, Vec2 { x: 120.0, y: 300.0 });
        assert_eq!(entity.current, Vec2 { x: 100.0, y: 300.0 });
    }

    #[test]
    fn update_inside_removal_window_applies_then_removal_fires() {
        let mut client = ClientReconciler::new();
        client.apply(snapshot(vec![soul("x", 100.0)], vec![]), 0);

        client.apply(
            ServerMessage::CharacterRemove {
                character_id: "x".to_string(),
            },
            1_000,
        );
        assert_eq!(client.pending_removal("x"), Some(1_000 + REMOVE_DELAY_MS));

        client.apply(patch_x("x", 150.0), 1_200);
        assert_eq!(
            client.characters().get("x").map(|entity| entity.record.x),
            Some(150.0)
        );

        client.advance(1_000 + REMOVE_DELAY_MS - 1);
        assert!(client.characters().contains("x"));
        client.advance(1_000 + REMOVE_DELAY_MS);
        assert!(!client.characters().contains("x"));
    }

    fn death(id: &str) -> ServerMessage {
        ServerMessage::CharacterDeath {
            character_id: id.to_string(),
            killer_id: None,
            x: 100.0,
            y: 300.0,
            team: Team::Light,
        }
    }

    fn dying(client: &ClientReconciler, id: &str) -> Option<bool> {
        client.characters().get(id).map(|entity| entity.dying)
    }

    #[test]
    fn spawn_cancels_pending_removal_and_death() {
        let mut client = ClientReconciler::new();
        client.apply(snapshot(vec![soul("x", 100.0)], vec![]), 0);
        client.apply(death("x"), 90);
        client.apply(
            ServerMessage::CharacterRemove {
                character_id: "x".to_string(),
            },
            100,
        );
        assert_eq!(dying(&client, "x"), Some(true));
        client.apply(
            ServerMessage::CharacterSpawn {
                character: soul("x", 200.0),
            },
            200,
        );
        client.advance(10_000);
        assert!(client.characters().contains("x"));
        assert_eq!(client.pending_removal("x"), None);
        assert_eq!(dying(&client, "x"), Some(false));
    }

    #[test]
    fn snapshot_listing_a_dying_id_revives_it() {
        let mut client = ClientReconciler::new();
        client.apply(snapshot(vec![soul("x", 100.0)], vec![]), 0);
        client.apply(death("x"), 50);
        client.apply(patch_x("x", 110.0), 60);
        assert_eq!(dying(&client, "x"), Some(true));

        client.apply(snapshot(vec![soul("x", 120.0)], vec![]), 70);
        assert_eq!(dying(&client, "x"), Some(false));
    }

    #[test]
    fn interpolation_converges_and_snaps_far_targets() {
        let mut client = ClientReconciler::new();
        client.apply(snapshot(vec![soul("a", 100.0), soul("b", 100.0)], vec![]), 0);
        client.apply(patch_x("a", 140.0), 0);
        client.apply(patch_x("b", 100.0 + SNAP_DISTANCE + 50.0), 0);

        client.interpolate(REFERENCE_FRAME_MS);
        let a = client.characters().get("a").expect("a").current.x;
        assert!(a > 100.0 && a < 140.0);
        let b = client.characters().get("b").expect("b");
        assert_eq!(b.current, b.target);

        for _ in 0..200 {
            client.interpolate(REFERENCE_FRAME_MS);
        }
        let a = client.characters().get("a").expect("a");
        assert!((a.current.x - 140.0).abs() < 0.01);
        assert_eq!(a.record.x, 140.0);
    }

    #[test]
    fn stale_spells_are_cleaned_after_grace() {
        let mut client = ClientReconciler::new();
        client.apply(
            ServerMessage::SpellStarted {
                spell: spell("spell_1"),
            },
            1_000,
        );
        client.advance(1_000 + 3_000 + SPELL_CLEANUP_GRACE_MS);
        assert!(client.spells().contains("spell_1"));
        client.advance(1_000 + 3_000 + SPELL_CLEANUP_GRACE_MS + 1);
        assert!(client.spells().is_empty());
    }

    #[test]
    fn orb_collected_removes_and_notifies() {
        let mut client = ClientReconciler::new();
        client.apply(snapshot(vec![], vec![orb("orb_1")]), 0);
        client.drain_events();
        client.apply(
            ServerMessage::OrbCollected {
                orb_id: "orb_1".to_string(),
                collector_id: "soul_1".to_string(),
                respawn_time: 20_000,
            },
            5,
        );
        assert!(client.orbs().is_empty());
        assert_eq!(
            client.drain_events(),
            vec![
                ViewEvent::Removed {
                    kind: EntityKind::Orb,
                    id: "orb_1".to_string(),
                },
                ViewEvent::OrbCollected {
                    orb_id: "orb_1".to_string(),
                    collector_id: "soul_1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn tile_update_reclassifies_neighbourhood() {
        let mut client = ClientReconciler::new();
        let grid = TileGrid::new(10, 10, |_, _| TileType::Green);
        client.apply(
            ServerMessage::WorldState(WorldState {
                tile_map: Some(grid.to_view()),
                ..WorldState::default()
            }),
            0,
        );
        client.apply(
            ServerMessage::TileUpdated {
                tile_x: 5,
                tile_y: 4,
                new_type: TileType::Gray,
            },
            1,
        );
        let tiles = client.tiles().expect("tile map");
        assert_eq!(tiles.grid().get(5, 4), Some(TileType::Gray));
        assert_eq!(
            tiles.variant(5, 5),
            Some(TileVariant::Edge {
                side: crate::territory::Side::Top
            })
        );
    }

    #[test]
    fn malformed_tile_map_keeps_previous_map() {
        let mut client = ClientReconciler::new();
        let grid = TileGrid::new(4, 4, |_, _| TileType::Green);
        client.apply(
            ServerMessage::WorldState(WorldState {
                tile_map: Some(grid.to_view()),
                ..WorldState::default()
            }),
            0,
        );

        let raw = r#"{"type":"world_state","characters":[],"energyOrbs":[],
            "tileMap":{"width":100000,"height":100000,"tiles":[]}}"#;
        let message = crate::protocol::decode_server_message(raw).expect("decodes");
        client.apply(message, 1);
        assert_eq!(client.tiles().map(|tiles| tiles.grid()), Some(&grid));

        let fresh = r#"{"type":"world_state","characters":[],"energyOrbs":[],
            "tileMap":{"width":2,"height":1,"tiles":[]}}"#;
        let mut late = ClientReconciler::new();
        late.apply(crate::protocol::decode_server_message(fresh).expect("decodes"), 1);
        assert!(late.tiles().is_none());
    }

    #[test]
    fn disconnect_clears_everything() {
        let mut client = ClientReconciler::new();
        client.apply(snapshot(vec![soul("x", 1.0)], vec![orb("o")]), 0);
        client.apply(
            ServerMessage::CharacterRemove {
                character_id: "x".to_string(),
            },
            10,
        );
        client.apply(ServerMessage::Disconnected {}, 20);
        assert!(client.characters().is_empty());
        assert!(client.orbs().is_empty());
        assert_eq!(client.pending_removal("x"), None);
        assert!(client.tiles().is_none());
    }
}
