//! # routes::session — Trigger interface for an external scheduler
//!
//! | Method | Path                  | Description                 |
//! |--------|-----------------------|-----------------------------|
//! | POST   | `/api/session/start`  | reset + classify prior day  |
//! | POST   | `/api/session/tick`   | one evaluation tick         |
//! | POST   | `/api/session/end`    | session summary             |
//!
//! Body is optional: `{ "at": "2024-03-07T10:05:00+05:30" }` overrides the
//! clock (defaults to now, IST).

use std::sync::atomic::Ordering;

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, session::{ist, now_ist}, state::SharedState};

#[derive(Deserialize, Default)]
pub struct TriggerBody {
    pub at: Option<DateTime<FixedOffset>>,
}

fn resolve(body: Option<Json<TriggerBody>>) -> DateTime<FixedOffset> {
    body.and_then(|Json(b)| b.at)
        .map(|t| t.with_timezone(&ist()))
        .unwrap_or_else(now_ist)
}

/// POST /api/session/start
pub async fn session_start(
    State(state): State<SharedState>,
    body: Option<Json<TriggerBody>>,
) -> Result<impl IntoResponse, AppError> {
    let now = resolve(body);
    let classification = state.pipeline.on_session_start(now).await?;
    Ok(Json(json!({
        "ok":             true,
        "date":           now.date_naive(),
        "classification": classification,
    })))
}

/// POST /api/session/tick
pub async fn session_tick(
    State(state): State<SharedState>,
    body: Option<Json<TriggerBody>>,
) -> Result<impl IntoResponse, AppError> {
    let now = resolve(body);
    state.tick_count.fetch_add(1, Ordering::Relaxed);
    let report = state.pipeline.on_tick(now).await?;
    Ok(Json(json!({ "ok": true, "tick": report })))
}

/// POST /api/session/end
pub async fn session_end(
    State(state): State<SharedState>,
    body: Option<Json<TriggerBody>>,
) -> impl IntoResponse {
    let summary = state.pipeline.on_session_end(resolve(body)).await;
    Json(json!({ "ok": true, "summary": summary }))
}
