use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use soul_arena::client::connection::{Connection, ConnectionConfig};
use soul_arena::client::{ClientReconciler, ViewEvent};
use soul_arena::config::{init_tracing, ViewerArgs};
use soul_arena::engine::now_ms;
use soul_arena::types::Team;
use tracing::{debug, info};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = ViewerArgs::parse();
    info!(url = %args.url, "viewer starting");

    let connection = Connection::spawn(ConnectionConfig {
        url: args.url.clone(),
        reconnect_delay: args.reconnect_delay(),
    });
    let mut client = ClientReconciler::new();
    let frame = args.frame_interval();
    let report_every = Duration::from_secs(args.report_every.max(1));
    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let mut last_frame = Instant::now();
    let mut last_report = Instant::now();
    loop {
        for message in connection.drain() {
            client.apply(message, now_ms());
        }
        client.advance(now_ms());
        let dt = last_frame.elapsed();
        last_frame = Instant::now();
        client.interpolate(dt.as_secs_f32() * 1000.0);

        for event in client.drain_events() {
            log_view_event(&event);
        }

        if last_report.elapsed() >= report_every {
            report(&client);
            last_report = Instant::now();
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        thread::sleep(frame.saturating_sub(last_frame.elapsed()));
    }

    report(&client);
    connection.shutdown();
    Ok(())
}

fn log_view_event(event: &ViewEvent) {
    match event {
        ViewEvent::Created { .. } | ViewEvent::Removed { .. } => {}
        ViewEvent::Cleared => info!("caches cleared, waiting for world_state"),
        other => debug!(?other, "view event"),
    }
}

fn report(client: &ClientReconciler) {
    let population = |team: Team| {
        client
            .characters()
            .iter()
            .filter(|(_, entity)| entity.record.team == team)
            .count()
    };
    let stats = client.stats();
    info!(
        dark = population(Team::Dark),
        light = population(Team::Light),
        orbs = client.orbs().len(),
        spells = client.spells().len(),
        phase = ?client.day_night().map(|state| state.phase),
        created = stats.created,
        updated = stats.updated,
        removed = stats.removed,
        "viewer status"
    );
}
