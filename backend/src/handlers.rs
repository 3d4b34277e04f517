//! HTTP + WebSocket surface for operator dashboards.
//!
//! `GET /ws` upgrades to the dashboard protocol: the server immediately
//! sends the current config and one world snapshot, then relays the
//! broadcast channel while accepting `set_config` / `action` JSON frames.
//! The REST endpoints mirror the WS actions for tooling that does not hold
//! a socket open.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::coordinator::{handle_control_message, now_ms, RecordingState, SharedCore};

// ── App state ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub core: SharedCore,
    pub events: broadcast::Sender<String>,
    pub started_ms: u64,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/recording/start", post(recording_start))
        .route("/api/recording/stop", post(recording_stop))
        .route("/api/sim/add", post(sim_add))
        .route("/api/sim/remove", post(sim_remove))
        .route("/api/aar/list", get(aar_list))
        .route("/api/replay/start", post(replay_stub))
        .route("/api/replay/stop", post(replay_stub))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

// ── WebSocket ─────────────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let mut events_rx = state.events.subscribe();

    // Greet with config plus one snapshot so the dashboard can paint
    // before the first broadcast tick lands.
    let (config_msg, world_msg) = {
        let mut core = state.core.write().await;
        (
            core.config_message().to_string(),
            core.world_state_message(now_ms()).to_string(),
        )
    };
    if socket.send(Message::Text(config_msg)).await.is_err() {
        return;
    }
    if socket.send(Message::Text(world_msg)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                match event {
                    Ok(msg) => {
                        // A failed send evicts the session.
                        if socket.send(Message::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("dashboard session lagged, skipped {skipped} frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(raw))) => {
                        handle_control_message(&state.core, &state.events, &raw).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong ignored
                    Some(Err(err)) => {
                        warn!("dashboard socket error: {err}");
                        break;
                    }
                }
            }
        }
    }
}

// ── REST endpoints ────────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "server_time_ms": now_ms(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let core = state.core.read().await;
    Json(json!({
        "status": "ok",
        "system": "fdw-coordinator",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_ms": now_ms().saturating_sub(state.started_ms),
        "players_online": core.registry.online_count(),
        "players_total": core.registry.players().len(),
        "ws_clients": state.events.receiver_count(),
        "recording": core.recording.active,
        "config": serde_json::to_value(&core.config).unwrap_or_default(),
    }))
}

async fn recording_start(State(state): State<AppState>) -> Json<serde_json::Value> {
    let session_id = {
        let mut core = state.core.write().await;
        core.apply_action("start_recording", now_ms());
        core.recording.session_id.clone().unwrap_or_default()
    };
    rebroadcast(&state).await;
    Json(json!({
        "status": "ok",
        "session_id": session_id,
        "files": RecordingState::session_files(&session_id),
    }))
}

async fn recording_stop(State(state): State<AppState>) -> Json<serde_json::Value> {
    let session_id = {
        let mut core = state.core.write().await;
        core.apply_action("stop_recording", now_ms());
        core.recording.session_id.clone()
    };
    rebroadcast(&state).await;
    match session_id {
        Some(session_id) => Json(json!({
            "status": "ok",
            "session_id": session_id,
            "files": RecordingState::session_files(&session_id),
        })),
        None => Json(json!({ "status": "ok", "session_id": null, "files": [] })),
    }
}

async fn sim_add(State(state): State<AppState>) -> Response {
    let added = {
        let mut core = state.core.write().await;
        let core = &mut *core;
        core.registry.add_sim_player(&mut core.world)
    };
    rebroadcast(&state).await;
    match added {
        Some(player_id) => Json(json!({ "status": "ok", "player_id": player_id })).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "error", "error": "no free player id" })),
        )
            .into_response(),
    }
}

async fn sim_remove(State(state): State<AppState>) -> Response {
    let removed = {
        let mut core = state.core.write().await;
        let core = &mut *core;
        core.registry.remove_sim_player(&mut core.world)
    };
    rebroadcast(&state).await;
    match removed {
        Some(player_id) => Json(json!({ "status": "ok", "player_id": player_id })).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "error", "error": "no removable sim player" })),
        )
            .into_response(),
    }
}

async fn aar_list() -> Json<serde_json::Value> {
    Json(json!({ "status": "not enabled", "sessions": [] }))
}

async fn replay_stub() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({ "status": "not enabled" })),
    )
        .into_response()
}

/// Push fresh config + world state to every dashboard after a REST-driven
/// mutation, matching the WS action path.
async fn rebroadcast(state: &AppState) {
    let (config_msg, world_msg) = {
        let mut core = state.core.write().await;
        (
            core.config_message().to_string(),
            core.world_state_message(now_ms()).to_string(),
        )
    };
    let _ = state.events.send(config_msg);
    let _ = state.events.send(world_msg);
}
