//! # routes::health
//!
//! | Method | Path          | Description                          |
//! |--------|---------------|--------------------------------------|
//! | GET    | `/api/health` | liveness + mode (full / health-only) |

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::state::SharedState;

/// GET /api/health — full mode
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let uptime = Utc::now().signed_duration_since(state.started_at).num_seconds();
    Json(json!({
        "ok":             true,
        "mode":           "full",
        "symbol":         state.pipeline.symbol(),
        "delivery":       state.delivery_channel,
        "scheduler":      state.config.scheduler_enabled,
        "session_date":   state.pipeline.session_date().await,
        "tick_count":     state.tick_count.load(Ordering::Relaxed),
        "uptime_secs":    uptime,
        "version":        env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/health — health-check-only mode (configuration invalid)
pub async fn health_only(State(problem): State<Arc<String>>) -> impl IntoResponse {
    Json(json!({
        "ok":      false,
        "mode":    "health-only",
        "error":   problem.as_str(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
