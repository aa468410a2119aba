use std::collections::{BTreeMap, BTreeSet};

use crate::types::{NexusView, OrbView, SoulView, SpellView, Team, Vec2};

use super::ViewEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Character,
    Orb,
    Spell,
    Nexus,
}

/// Tally of cache mutations; what a renderer would count as sprite churn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

impl ReconcileStats {
    pub fn absorb(&mut self, other: ReconcileStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.removed += other.removed;
    }
}

/// A locally cached entity mirrored from an authoritative record. `update`
/// overwrites the authoritative part and must leave local-only state alone,
/// except for state the record itself contradicts.
pub trait Replicated {
    type Record;
    const KIND: EntityKind;

    fn record_id(record: &Self::Record) -> &str;
    fn create(record: Self::Record, now_ms: u64) -> Self;
    fn update(&mut self, record: Self::Record);
}

#[derive(Clone, Debug)]
pub struct CharacterEntity {
    pub record: SoulView,
    pub current: Vec2,
    pub target: Vec2,
    pub dying: bool,
    pub tint: u32,
}

impl CharacterEntity {
    pub fn retarget(&mut self) {
        self.target = Vec2 {
            x: self.record.x,
            y: self.record.y,
        };
        self.tint = tint_for(self.record.team, self.record.mature);
    }
}

pub fn tint_for(team: Team, mature: bool) -> u32 {
    match (team, mature) {
        (Team::Dark, true) => 0x5b_2c_83,
        (Team::Dark, false) => 0x9a_7b_c0,
        (Team::Light, true) => 0xf2_d3_5b,
        (Team::Light, false) => 0xf8_ea_b0,
    }
}

impl Replicated for CharacterEntity {
    type Record = SoulView;
    const KIND: EntityKind = EntityKind::Character;

    fn record_id(record: &SoulView) -> &str {
        &record.id
    }

    fn create(record: SoulView, _now_ms: u64) -> Self {
        let position = Vec2 {
            x: record.x,
            y: record.y,
        };
        let tint = tint_for(record.team, record.mature);
        Self {
            record,
            current: position,
            target: position,
            dying: false,
            tint,
        }
    }

    /// A full record only arrives for a live soul, so it ends any death effect.
    fn update(&mut self, record: SoulView) {
        self.record = record;
        self.dying = false;
        self.retarget();
    }
}

#[derive(Clone, Debug)]
pub struct OrbEntity {
    pub record: OrbView,
}

impl Replicated for OrbEntity {
    type Record = OrbView;
    const KIND: EntityKind = EntityKind::Orb;

    fn record_id(record: &OrbView) -> &str {
        &record.id
    }

    fn create(record: OrbView, _now_ms: u64) -> Self {
        Self { record }
    }

    fn update(&mut self, record: OrbView) {
        self.record = record;
    }
}

#[derive(Clone, Debug)]
pub struct SpellEntity {
    pub record: SpellView,
    /// Client clock at first sight; the server's `startedAt` is not
    /// comparable with it.
    pub local_started_ms: u64,
}

impl Replicated for SpellEntity {
    type Record = SpellView;
    const KIND: EntityKind = EntityKind::Spell;

    fn record_id(record: &SpellView) -> &str {
        &record.id
    }

    fn create(record: SpellView, now_ms: u64) -> Self {
        Self {
            record,
            local_started_ms: now_ms,
        }
    }

    fn update(&mut self, record: SpellView) {
        self.record = record;
    }
}

#[derive(Clone, Debug)]
pub struct NexusEntity {
    pub record: NexusView,
}

impl Replicated for NexusEntity {
    type Record = NexusView;
    const KIND: EntityKind = EntityKind::Nexus;

    fn record_id(record: &NexusView) -> &str {
        &record.id
    }

    fn create(record: NexusView, _now_ms: u64) -> Self {
        Self { record }
    }

    fn update(&mut self, record: NexusView) {
        self.record = record;
    }
}

/// Id-keyed cache for one entity kind.
#[derive(Clone, Debug)]
pub struct EntityManager<E> {
    entities: BTreeMap<String, E>,
}

impl<E> Default for EntityManager<E> {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }
}

impl<E: Replicated> EntityManager<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut E> {
        self.entities.get_mut(id)
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &E)> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut E)> {
        self.entities.iter_mut()
    }

    /// Updates in place when the id is cached, creates otherwise.
    pub fn upsert(
        &mut self,
        record: E::Record,
        now_ms: u64,
        events: &mut Vec<ViewEvent>,
    ) -> ReconcileStats {
        let id = E::record_id(&record).to_string();
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.update(record);
            return ReconcileStats {
                updated: 1,
                ..ReconcileStats::default()
            };
        }
        self.entities.insert(id.clone(), E::create(record, now_ms));
        events.push(ViewEvent::Created { kind: E::KIND, id });
        ReconcileStats {
            created: 1,
            ..ReconcileStats::default()
        }
    }

    pub fn remove(&mut self, id: &str, events: &mut Vec<ViewEvent>) -> Option<E> {
        let entity = self.entities.remove(id)?;
        events.push(ViewEvent::Removed {
            kind: E::KIND,
            id: id.to_string(),
        });
        Some(entity)
    }

    /// Makes the cached id set equal to the id set of `records`: stale ids
    /// are removed, known ids updated in place, new ids created.
    pub fn reconcile(
        &mut self,
        records: Vec<E::Record>,
        now_ms: u64,
        events: &mut Vec<ViewEvent>,
    ) -> ReconcileStats {
        let server_ids: BTreeSet<String> = records
            .iter()
            .map(|record| E::record_id(record).to_string())
            .collect();
        let mut stats = ReconcileStats::default();
        for id in self.ids().difference(&server_ids) {
            if self.remove(id, events).is_some() {
                stats.removed += 1;
            }
        }
        for record in records {
            stats.absorb(self.upsert(record, now_ms, events));
        }
        stats
    }

    /// Drops every entity without lifecycle events. Returns how many went.
    pub fn clear(&mut self) -> usize {
        let count = self.entities.len();
        self.entities.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orb(id: &str, x: f32) -> OrbView {
        OrbView {
            id: id.to_string(),
            x,
            y: 10.0,
            energy: 12.0,
            respawn_time: 0,
        }
    }

    #[test]
    fn reconcile_matches_server_id_set() {
        let mut manager = EntityManager::<OrbEntity>::new();
        let mut events = Vec::new();
        manager.reconcile(vec![orb("orb_1", 1.0), orb("orb_2", 2.0)], 0, &mut events);

        let stats = manager.reconcile(vec![orb("orb_2", 5.0), orb("orb_3", 3.0)], 0, &mut events);
        assert_eq!(
            stats,
            ReconcileStats {
                created: 1,
                updated: 1,
                removed: 1,
            }
        );
        let ids: Vec<String> = manager.ids().into_iter().collect();
        assert_eq!(ids, vec!["orb_2".to_string(), "orb_3".to_string()]);
        assert_eq!(manager.get("orb_2").map(|orb| orb.record.x), Some(5.0));
    }

    #[test]
    fn reconciling_twice_creates_nothing_new() {
        let mut manager = EntityManager::<OrbEntity>::new();
        let mut events = Vec::new();
        let records = vec![orb("orb_1", 1.0), orb("orb_2", 2.0)];
        manager.reconcile(records.clone(), 0, &mut events);
        events.clear();

        let stats = manager.reconcile(records, 0, &mut events);
        assert_eq!(stats.created, 0);
        assert_eq!(stats.removed, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn character_update_keeps_interpolation_state() {
        let mut manager = EntityManager::<CharacterEntity>::new();
        let mut events = Vec::new();
        let mut soul = SoulView {
            id: "soul_1".to_string(),
            team: Team::Dark,
            x: 100.0,
            y: 100.0,
            vx: 0.0,
            vy: 0.0,
            energy: 50.0,
            max_energy: 100.0,
            mature: false,
        };
        manager.upsert(soul.clone(), 0, &mut events);
        soul.x = 140.0;
        soul.mature = true;
        manager.upsert(soul, 0, &mut events);

        let entity = manager.get("soul_1").expect("cached");
        assert_eq!(entity.current, Vec2 { x: 100.0, y: 100.0 });
        assert_eq!(entity.target, Vec2 { x: 140.0, y: 100.0 });
        assert_eq!(entity.tint, tint_for(Team::Dark, true));
    }

    #[test]
    fn spell_keeps_first_local_start() {
        let mut manager = EntityManager::<SpellEntity>::new();
        let mut events = Vec::new();
        let spell = SpellView {
            id: "spell_4".to_string(),
            caster_id: "soul_1".to_string(),
            team: Team::Light,
            tile_x: 3,
            tile_y: 4,
            started_at: 99_999,
            duration_ms: 3_000,
        };
        manager.upsert(spell.clone(), 500, &mut events);
        manager.upsert(spell, 900, &mut events);
        assert_eq!(manager.get("spell_4").map(|s| s.local_started_ms), Some(500));
    }
}
