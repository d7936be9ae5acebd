//! # Confluence — Intraday Index Signal Service
//!
//! ```text
//!  ┌─────────────┐  GET /candles, /option-chain  ┌──────────────────────────────┐
//!  │ Market-data │ ◀──────────────────────────── │ Pipeline                     │
//!  │   bridge    │                               │ ├─ DayClassifier  (A-Day)    │
//!  └─────────────┘                               │ ├─ StrategyEngine (6 det.)   │
//!                                                │ ├─ SignalAggregator + Scorer │
//!  ┌─────────────┐  every 60s / POST /session/*  │ ├─ SafetyFilter  🛡️          │
//!  │  Scheduler  │ ────────────────────────────▶ │ └─ broadcast_tx ───────────┐ │
//!  └─────────────┘                               └──────────────┬─────────────┘ │
//!                                                               ▼               │
//!  ┌─────────────┐  ws://host/ws/monitor  ◀────────────── Telegram / log        │
//!  │  Dashboard  │ ◀─────────────────────────────────────────────────────────── ┘
//!  └─────────────┘  POST /api/simulate  📊   POST /api/safety/lock  ⛔
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod config;
mod engine;
mod error;
mod events;
mod market;
mod models;
mod notify;
mod routes;
mod scheduler;
mod session;
mod state;

use auth::require_api_key;
use config::AppConfig;
use routes::{
    health::{health, health_only},
    monitor::{engine_status, signal_history, ws_monitor},
    safety::{lock, record_trade, safety_status, unlock},
    session::{session_end, session_start, session_tick},
    simulate::run_simulation,
};
use state::{build_state, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("confluence=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║          CONFLUENCE — Intraday Signal Service         ║
  ║  Classify · Detect · Score · Aggregate · Safety       ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config (invalid → health-check-only) ───────────────────────────────
    let (app, bind_addr) = match AppConfig::from_env() {
        Ok(config) => {
            info!(symbol = %config.symbol, min_confidence = config.scorer.min_confidence, "⚙️ Config loaded");
            let scheduler_enabled = config.scheduler_enabled;
            let bind_addr = config.bind_addr.clone();
            let state = build_state(config);
            if scheduler_enabled {
                scheduler::spawn(Arc::clone(&state));
            } else {
                info!("⏱️ Internal scheduler disabled, waiting for /api/session/* triggers");
            }
            (full_router(state), bind_addr)
        }
        Err(e) => {
            warn!(error = %e, "⚠️ Configuration invalid, serving health check only");
            let router = Router::new()
                .route("/api/health", get(health_only))
                .with_state(Arc::new(e.to_string()));
            // config ใช้ไม่ได้ ยังต้อง bind ได้เพื่อให้ health check ตอบ
            let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
            (router, bind_addr)
        }
    };

    // ── 4. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = bind_addr.parse()?;

    info!(?addr, "🚀 Confluence server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn full_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health",           get(health))
        // ── Session triggers ──────────────────────────────────────────────────
        .route("/api/session/start",    post(session_start))
        .route("/api/session/tick",     post(session_tick))
        .route("/api/session/end",      post(session_end))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/ws/monitor",           get(ws_monitor))
        .route("/api/engine/status",    get(engine_status))
        .route("/api/signals/history",  get(signal_history))
        // ── Safety ────────────────────────────────────────────────────────────
        .route("/api/safety/status",    get(safety_status))
        .route("/api/safety/lock",      post(lock))
        .route("/api/safety/unlock",    post(unlock))
        .route("/api/safety/trade",     post(record_trade))
        // ── Simulation ────────────────────────────────────────────────────────
        .route("/api/simulate",         post(run_simulation))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::middleware::from_fn(require_api_key)),
        )
        .with_state(state)
}
