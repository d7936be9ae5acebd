//! # routes::safety
//!
//! | Method | Path                 | Description                   |
//! |--------|----------------------|-------------------------------|
//! | GET    | `/api/safety/status` | SafetyState snapshot          |
//! | POST   | `/api/safety/lock`   | เปิด Kill Switch              |
//! | POST   | `/api/safety/unlock` | ปลดล็อก                        |
//! | POST   | `/api/safety/trade`  | บันทึกกำไร/ขาดทุนที่เกิดขึ้นจริง |

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, events::WsEvent, state::SharedState};

#[derive(Deserialize)]
pub struct LockBody {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct TradeBody {
    pub pnl: f64,
}

/// GET /api/safety/status
pub async fn safety_status(State(state): State<SharedState>) -> impl IntoResponse {
    let status = state.pipeline.safety().status().await;
    Json(json!({ "ok": true, "safety": status }))
}

/// POST /api/safety/lock — หยุดส่งสัญญาณทันที
pub async fn lock(
    State(state): State<SharedState>,
    body: Option<Json<LockBody>>,
) -> impl IntoResponse {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "Manual lock via API".to_string());

    state.pipeline.safety().lock(&reason).await;
    state.broadcast(&WsEvent::SafetyLocked { reason: reason.clone() });

    Json(json!({
        "ok":      true,
        "message": format!("Safety lock activated: {reason}"),
    }))
}

/// POST /api/safety/unlock — วิธีเดียวที่ปลดล็อกได้ (รวมถึงล็อกจากขาดทุน)
pub async fn unlock(State(state): State<SharedState>) -> impl IntoResponse {
    state.pipeline.safety().unlock().await;
    state.broadcast(&WsEvent::SafetyUnlocked);

    Json(json!({
        "ok":      true,
        "message": "Safety lock released — signals enabled",
    }))
}

/// POST /api/safety/trade — `{ "pnl": -1250.0 }`
pub async fn record_trade(
    State(state): State<SharedState>,
    Json(body): Json<TradeBody>,
) -> Result<impl IntoResponse, AppError> {
    if !body.pnl.is_finite() {
        return Err(AppError::BadRequest("pnl must be a finite number".into()));
    }
    let safety = state.pipeline.safety();
    let was_locked = safety.status().await.state == "LOCKED";
    let locked = safety.record_trade(body.pnl).await;

    if locked && !was_locked {
        let reason = safety.status().await.lock_reason.unwrap_or_default();
        state.broadcast(&WsEvent::SafetyLocked { reason });
    }

    Ok(Json(json!({ "ok": true, "locked": locked })))
}
