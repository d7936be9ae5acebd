//! # state
//!
//! AppState — shared by every Axum handler and the internal scheduler.
//!
//! * `Arc<AppState>` is cloned cheaply into handlers via `axum::extract::State`.
//! * Day-scoped mutable state lives inside the [`Pipeline`] (engine mutex,
//!   safety `RwLock`, classifier cache); this struct only wires things up.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

use crate::config::AppConfig;
use crate::engine::aggregator::SignalAggregator;
use crate::engine::pipeline::Pipeline;
use crate::engine::safety::SafetyFilter;
use crate::engine::scorer::ConfidenceScorer;
use crate::engine::strategy_engine::StrategyEngine;
use crate::events::WsEvent;
use crate::market::{HttpMarketData, SharedMarket};
use crate::notify::{LogNotifier, SharedNotifier, TelegramNotifier};

// ─── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    pub config: Arc<AppConfig>,

    // ── Pipeline ──────────────────────────────────────────────────────────────
    pub pipeline: Arc<Pipeline>,
    /// Market-data source, also used by the simulation endpoint
    pub market: SharedMarket,
    /// "telegram" | "log"
    pub delivery_channel: String,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    /// Broadcast channel สำหรับส่ง Event ไปยัง WebSocket clients
    /// ใช้ String (pre-serialized JSON) เพื่อหลีกเลี่ยง Clone constraints
    pub broadcast_tx: broadcast::Sender<String>,

    // ── Metrics ───────────────────────────────────────────────────────────────
    pub tick_count: AtomicU64,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);

        // reqwest Client ที่ share กันทั้งระบบ (connection pooling)
        let http_client = reqwest::Client::new();

        let market: SharedMarket = Arc::new(HttpMarketData::new(
            http_client.clone(),
            config.market_url.clone(),
            config.market_timeout,
        ));
        let notifier: SharedNotifier = match &config.telegram {
            Some(tg) => Arc::new(TelegramNotifier::new(http_client.clone(), tg.clone())),
            None => {
                info!("TELEGRAM_* not set, signals go to the log only");
                Arc::new(LogNotifier)
            }
        };
        let delivery_channel = notifier.channel().to_string();

        let pipeline = Pipeline::new(
            config.symbol.clone(),
            Arc::clone(&market),
            StrategyEngine::new(config.engine.clone()),
            SignalAggregator::new(ConfidenceScorer::new(config.scorer.clone())),
            SafetyFilter::new(config.safety.clone()),
            notifier,
            broadcast_tx.clone(),
        );

        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            market,
            delivery_channel,
            broadcast_tx,
            tick_count: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Broadcast WsEvent ไปยัง WebSocket clients ทั้งหมด
    /// ไม่ panic ถ้าไม่มี listener
    pub fn broadcast(&self, event: &WsEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

pub fn build_state(config: AppConfig) -> SharedState {
    Arc::new(AppState::new(config))
}
