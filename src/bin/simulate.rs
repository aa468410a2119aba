use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use soul_arena::client::ClientReconciler;
use soul_arena::config::{init_tracing, SimulateArgs};
use soul_arena::constants::{TICK_MS, TICK_RATE, WORLD_MARGIN, WORLD_SIZE};
use soul_arena::engine::{now_ms, SimulationConfig, WorldSimulator};
use soul_arena::protocol::{decode_server_message, ServerMessage};
use soul_arena::types::WorldState;
use tracing::{info, warn};

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    seed: u32,
    #[serde(rename = "soulsPerTeam")]
    souls_per_team: usize,
    #[serde(rename = "orbCount")]
    orb_count: usize,
    minutes: u32,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "eventCounts")]
    event_counts: BTreeMap<String, u64>,
    #[serde(rename = "finalDarkSouls")]
    final_dark_souls: usize,
    #[serde(rename = "finalLightSouls")]
    final_light_souls: usize,
    #[serde(rename = "finalGreenTiles")]
    final_green_tiles: usize,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Default)]
struct AnomalyLog {
    summary: Vec<String>,
    records: Vec<AnomalyRecord>,
    seen: HashSet<String>,
}

impl AnomalyLog {
    /// Every occurrence is recorded; the summary keeps each message once.
    fn push(&mut self, tick: u64, message: String) {
        self.records.push(AnomalyRecord {
            tick,
            message: message.clone(),
        });
        if self.seen.insert(message.clone()) {
            self.summary.push(message);
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = SimulateArgs::parse();
    let scenarios = resolve_scenarios(&args);
    let started_at_ms = now_ms();
    let mut results = Vec::new();
    let mut anomaly_count = 0;

    for scenario in &scenarios {
        info!(scenario = %scenario.name, seed = scenario.seed, "scenario started");
        let (result, records) = run_scenario(scenario);
        for record in &records {
            warn!(
                scenario = %scenario.name,
                tick = record.tick,
                message = %record.message,
                "anomaly"
            );
        }
        anomaly_count += records.len();
        info!(
            scenario = %scenario.name,
            anomalies = records.len(),
            dark = result.final_dark_souls,
            light = result.final_light_souls,
            "scenario finished"
        );
        println!("{}", serde_json::to_string(&result)?);
        results.push(result);
    }

    let summary = RunSummary {
        started_at_ms,
        finished_at_ms: now_ms(),
        scenario_count: results.len(),
        anomaly_count,
        scenarios: results,
    };
    if let Some(path) = args.summary_out.as_ref() {
        write_summary(path, &summary)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }

    if anomaly_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn resolve_scenarios(args: &SimulateArgs) -> Vec<Scenario> {
    let config = args.world.simulation_config();
    let minutes = args.minutes.clamp(1, 30);
    if args.single {
        return vec![Scenario {
            name: format!("custom-{}x2", config.souls_per_team),
            seed: config.seed,
            souls_per_team: config.souls_per_team,
            orb_count: config.orb_count,
            minutes,
        }];
    }
    vec![
        Scenario {
            name: "default".to_string(),
            seed: config.seed,
            souls_per_team: 12,
            orb_count: config.orb_count,
            minutes,
        },
        Scenario {
            name: "crowded".to_string(),
            seed: config.seed.wrapping_add(1),
            souls_per_team: 30,
            orb_count: config.orb_count / 2,
            minutes,
        },
        Scenario {
            name: "starved".to_string(),
            seed: config.seed.wrapping_add(2),
            souls_per_team: 4,
            orb_count: 4,
            minutes,
        },
    ]
}

/// Steps the world for the scenario's duration, checking world invariants
/// every tick and pushing every event through the wire codec into a
/// reconciler whose id sets must match the server at the end.
fn run_scenario(scenario: &Scenario) -> (ScenarioResultLine, Vec<AnomalyRecord>) {
    let mut world = WorldSimulator::new(SimulationConfig {
        seed: scenario.seed,
        souls_per_team: scenario.souls_per_team,
        orb_count: scenario.orb_count,
        ..SimulationConfig::default()
    });
    let mut client = ClientReconciler::new();
    let mut anomalies = AnomalyLog::default();
    let mut event_counts: BTreeMap<String, u64> = BTreeMap::new();

    let initial = ServerMessage::WorldState(world.snapshot());
    relay(&mut client, initial, world.now_ms(), &mut anomalies, 0);
    let ticks = u64::from(scenario.minutes) * 60 * TICK_RATE as u64;
    for _ in 0..ticks {
        world.step(TICK_MS);
        let tick = world.tick();
        for event in world.drain_events() {
            *event_counts.entry(event.kind().to_string()).or_insert(0) += 1;
            relay(&mut client, event, world.now_ms(), &mut anomalies, tick);
        }
        client.advance(world.now_ms());
        for message in collect_world_anomalies(&world.snapshot()) {
            anomalies.push(tick, message);
        }
    }

    client.advance(world.now_ms().saturating_add(60_000));
    let snapshot = world.snapshot();
    for message in compare_replica(&snapshot, &client) {
        anomalies.push(world.tick(), message);
    }

    let stats = world.statistics();
    let result = ScenarioResultLine {
        scenario: scenario.name.clone(),
        seed: scenario.seed,
        duration_ms: ticks * TICK_MS,
        event_counts,
        final_dark_souls: stats.dark_souls,
        final_light_souls: stats.light_souls,
        final_green_tiles: stats.green_tiles,
        anomalies: anomalies.summary,
    };
    (result, anomalies.records)
}

fn relay(
    client: &mut ClientReconciler,
    message: ServerMessage,
    now_ms: u64,
    anomalies: &mut AnomalyLog,
    tick: u64,
) {
    let decoded = message
        .encode()
        .and_then(|raw| decode_server_message(&raw));
    match decoded {
        Ok(decoded) => client.apply(decoded, now_ms),
        Err(error) => {
            anomalies.push(tick, format!("codec failure on {}: {error}", message.kind()));
        }
    }
}

fn collect_world_anomalies(snapshot: &WorldState) -> Vec<String> {
    let mut anomalies = Vec::new();
    let bounds = WORLD_MARGIN..=WORLD_SIZE - WORLD_MARGIN;
    let mut ids = BTreeSet::new();
    for soul in &snapshot.characters {
        if !ids.insert(soul.id.as_str()) {
            anomalies.push(format!("duplicate soul id: {}", soul.id));
        }
        if !(0.0..=soul.max_energy).contains(&soul.energy) {
            anomalies.push(format!(
                "soul energy out of range: {} {}/{}",
                soul.id, soul.energy, soul.max_energy
            ));
        }
        if !bounds.contains(&soul.x) || !bounds.contains(&soul.y) {
            anomalies.push(format!("soul outside world: {}", soul.id));
        }
    }
    for orb in &snapshot.energy_orbs {
        if !bounds.contains(&orb.x) || !bounds.contains(&orb.y) {
            anomalies.push(format!("orb outside world: {}", orb.id));
        }
    }
    if let (Some(map), Some(stats)) = (&snapshot.tile_map, &snapshot.statistics) {
        let total = (map.width * map.height) as usize;
        if stats.gray_tiles + stats.green_tiles != total {
            anomalies.push("tile counts do not cover the map".to_string());
        }
    }
    anomalies
}

fn compare_replica(snapshot: &WorldState, client: &ClientReconciler) -> Vec<String> {
    let mut anomalies = Vec::new();
    let server_souls: BTreeSet<String> = snapshot
        .characters
        .iter()
        .map(|soul| soul.id.clone())
        .collect();
    if server_souls != client.characters().ids() {
        anomalies.push("replica soul ids diverged".to_string());
    }
    let server_orbs: BTreeSet<String> = snapshot
        .energy_orbs
        .iter()
        .map(|orb| orb.id.clone())
        .collect();
    if server_orbs != client.orbs().ids() {
        anomalies.push("replica orb ids diverged".to_string());
    }
    if let (Some(map), Some(tiles)) = (&snapshot.tile_map, client.tiles()) {
        if *map != tiles.grid().to_view() {
            anomalies.push("replica tile map diverged".to_string());
        }
    }
    anomalies
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, summary_text)
}
