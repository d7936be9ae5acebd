//! # routes::monitor
//!
//! ## Endpoints
//!
//! | Method    | Path                   | Description                           |
//! |-----------|------------------------|---------------------------------------|
//! | GET (WS)  | `/ws/monitor`          | WebSocket real-time event stream      |
//! | GET       | `/api/engine/status`   | detector states + day classification  |
//! | GET       | `/api/signals/history` | signals delivered by this process     |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info};

use crate::{session::now_ist, state::SharedState};

// ─── WebSocket Handler ────────────────────────────────────────────────────────

/// Upgrade HTTP → WebSocket แล้ว subscribe broadcast channel
///
/// ทุก WsEvent จะถูกส่งมาเป็น JSON text frame
pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    // ── ส่ง Snapshot ปัจจุบันทันทีที่ต่อ ─────────────────────────────────────
    let snapshot = json!({
        "event":          "SNAPSHOT",
        "session_date":   state.pipeline.session_date().await,
        "classification": state.pipeline.classification().await,
        "safety":         state.pipeline.safety().status().await,
        "signals":        state.pipeline.session_signals().await,
    })
    .to_string();

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return; // Client ปิดก่อน snapshot ส่งได้
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break; // Client disconnect
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break, // Channel closed
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST ─────────────────────────────────────────────────────────────────────

/// GET /api/engine/status
pub async fn engine_status(State(state): State<SharedState>) -> impl IntoResponse {
    let now = now_ist();
    Json(json!({
        "ok":             true,
        "now":            now,
        "classification": state.pipeline.classification().await,
        "engine":         state.pipeline.engine_status(now).await,
    }))
}

/// GET /api/signals/history
pub async fn signal_history(State(state): State<SharedState>) -> impl IntoResponse {
    let history = state.pipeline.history().await;
    Json(json!({
        "ok":      true,
        "count":   history.len(),
        "signals": history,
    }))
}
