use std::collections::BTreeSet;

use soul_arena::client::ClientReconciler;
use soul_arena::constants::{REMOVE_DELAY_MS, TICK_MS};
use soul_arena::engine::{SimulationConfig, WorldSimulator};
use soul_arena::protocol::{decode_server_message, ServerMessage};

fn relay(client: &mut ClientReconciler, message: &ServerMessage, now_ms: u64) {
    let raw = message.encode().expect("encodes");
    let decoded = decode_server_message(&raw).expect("decodes");
    client.apply(decoded, now_ms);
}

fn server_soul_ids(world: &WorldSimulator) -> BTreeSet<String> {
    world.store().soul_ids().into_iter().collect()
}

#[test]
fn replica_tracks_world_through_the_wire() {
    let mut world = WorldSimulator::with_start(
        SimulationConfig {
            seed: 2024,
            ..SimulationConfig::default()
        },
        10_000,
    );
    let mut client = ClientReconciler::new();
    relay(
        &mut client,
        &ServerMessage::WorldState(world.snapshot()),
        world.now_ms(),
    );
    assert_eq!(client.characters().ids(), server_soul_ids(&world));

    for _ in 0..1_800 {
        world.step(TICK_MS);
        for event in world.drain_events() {
            relay(&mut client, &event, world.now_ms());
        }
        client.advance(world.now_ms());
        client.interpolate(TICK_MS as f32);
    }
    client.advance(world.now_ms() + REMOVE_DELAY_MS);

    let snapshot = world.snapshot();
    assert_eq!(client.characters().ids(), server_soul_ids(&world));
    let server_orbs: BTreeSet<String> = snapshot
        .energy_orbs
        .iter()
        .map(|orb| orb.id.clone())
        .collect();
    assert_eq!(client.orbs().ids(), server_orbs);
    let tiles = client.tiles().expect("tile map");
    assert_eq!(Some(tiles.grid().to_view()), snapshot.tile_map);

    for soul in &snapshot.characters {
        let entity = client.characters().get(&soul.id).expect("replicated");
        assert_eq!(entity.record.team, soul.team);
        assert_eq!(entity.record.mature, soul.mature);
        assert!(entity.record.energy >= 0.0 && entity.record.energy <= entity.record.max_energy);
    }
}

#[test]
fn late_joiner_snapshot_matches_running_replica() {
    let mut world = WorldSimulator::with_start(SimulationConfig::default(), 0);
    let mut early = ClientReconciler::new();
    relay(&mut early, &ServerMessage::WorldState(world.snapshot()), 0);
    for _ in 0..600 {
        world.step(TICK_MS);
        for event in world.drain_events() {
            relay(&mut early, &event, world.now_ms());
        }
    }
    early.advance(world.now_ms() + REMOVE_DELAY_MS);

    let mut late = ClientReconciler::new();
    relay(
        &mut late,
        &ServerMessage::WorldState(world.snapshot()),
        world.now_ms(),
    );
    assert_eq!(late.characters().ids(), early.characters().ids());
    assert_eq!(late.orbs().ids(), early.orbs().ids());

    relay(&mut early, &ServerMessage::Disconnected {}, world.now_ms());
    assert!(early.characters().is_empty());
    relay(
        &mut early,
        &ServerMessage::WorldState(world.snapshot()),
        world.now_ms(),
    );
    assert_eq!(early.characters().ids(), late.characters().ids());
}
