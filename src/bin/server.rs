use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use soul_arena::broadcast::{BroadcastHub, OutboundMessage, CLIENT_QUEUE_CAPACITY};
use soul_arena::config::{init_tracing, ServerArgs};
use soul_arena::constants::{TICK_MS, TICK_RATE};
use soul_arena::engine::WorldSimulator;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

struct ServerState {
    world: WorldSimulator,
    hub: BroadcastHub,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = ServerArgs::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(serve(args))
}

async fn serve(args: ServerArgs) -> anyhow::Result<()> {
    let config = args.world.simulation_config();
    info!(
        seed = config.seed,
        souls_per_team = config.souls_per_team,
        orbs = config.orb_count,
        "world created"
    );
    let state = Arc::new(Mutex::new(ServerState {
        world: WorldSimulator::new(config),
        hub: BroadcastHub::new(),
    }));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/state", get(state_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir(args.static_dir.as_deref()) {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        app
    };

    let bind_addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

fn resolve_static_dir(configured: Option<&Path>) -> Option<PathBuf> {
    let path = configured?;
    if path.join("index.html").is_file() {
        Some(path.to_path_buf())
    } else {
        warn!(root = %path.display(), "static dir has no index.html, ignoring");
        None
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn state_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(guard.world.snapshot())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(CLIENT_QUEUE_CAPACITY);

    {
        let mut guard = state.lock().await;
        let snapshot = guard.world.snapshot();
        if !guard.hub.register(&client_id, tx, snapshot) {
            warn!(client = %client_id, "could not queue initial world_state");
            return;
        }
        info!(client = %client_id, clients = guard.hub.len(), "client connected");
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    // Viewers never send commands; only a close or a broken socket matters.
    let mut reader = tokio::spawn(async move {
        while let Some(received) = ws_receiver.next().await {
            match received {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    let mut guard = state.lock().await;
    guard.hub.unregister(&client_id);
    info!(client = %client_id, clients = guard.hub.len(), "client disconnected");
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_world(&mut guard);
        }
    });
}

fn tick_world(state: &mut ServerState) {
    state.world.step(TICK_MS);
    let events = state.world.drain_events();
    debug!(tick = state.world.tick(), events = events.len(), "tick");
    state.hub.broadcast_all(&events);

    if state.world.tick().is_multiple_of(TICK_RATE as u64 * 60) {
        let stats = state.world.statistics();
        info!(
            tick = state.world.tick(),
            dark = stats.dark_souls,
            light = stats.light_souls,
            green_tiles = stats.green_tiles,
            clients = state.hub.len(),
            "world heartbeat"
        );
    }
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}
