//! # routes::simulate
//!
//! **Simulation** — replay วันในอดีตผ่าน detector ชุดเดิม เพื่อตรวจสอบ
//! ไม่ใช่ backtest: ไม่มี P&L
//!
//! ## Endpoint
//! POST /api/simulate `{ "date": "2024-03-07", "step_minutes": 1 }`

use axum::{extract::State, response::IntoResponse, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::{
    engine::simulate::{simulate, SimulationConfig},
    error::AppError,
    session::{is_trading_day, now_ist},
    state::SharedState,
};

#[derive(Deserialize)]
pub struct SimulateRequest {
    pub date: NaiveDate,
    /// Replay step, default 1 minute (same cadence as live)
    pub step_minutes: Option<i64>,
    /// Override MIN_CONFIDENCE for this run
    pub min_confidence: Option<f64>,
}

/// POST /api/simulate
pub async fn run_simulation(
    State(state): State<SharedState>,
    Json(req): Json<SimulateRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.date >= now_ist().date_naive() {
        return Err(AppError::BadRequest("date must be a past session".into()));
    }
    if !is_trading_day(req.date) {
        return Err(AppError::BadRequest(format!("{} is not a trading day", req.date)));
    }
    let step_minutes = req.step_minutes.unwrap_or(1);
    if !(1..=60).contains(&step_minutes) {
        return Err(AppError::BadRequest("step_minutes must be within 1..=60".into()));
    }

    let mut scorer = state.config.scorer.clone();
    if let Some(min) = req.min_confidence {
        if !(0.0..=100.0).contains(&min) {
            return Err(AppError::BadRequest("min_confidence must be within 0..=100".into()));
        }
        scorer.min_confidence = min;
    }

    let config = SimulationConfig {
        engine: state.config.engine.clone(),
        scorer,
        safety: state.config.safety.clone(),
        step_minutes,
    };
    let report = simulate(state.market.as_ref(), &state.config.symbol, req.date, config).await?;

    Ok(Json(json!({ "ok": true, "report": report })))
}
