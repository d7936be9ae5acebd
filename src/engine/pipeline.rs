//! # engine::pipeline — Trigger interface
//!
//! ```text
//! on_session_start ──▶ reset engine · safety · classifier ──▶ classify prior day
//! on_tick          ──▶ analyzers ──▶ engine ──▶ aggregator ──▶ safety ──▶ deliver
//! on_session_end   ──▶ summary report
//! ```
//!
//! Ticks are serialised by the engine mutex; a tick that overruns simply
//! delays the next one.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::engine::aggregator::{Aggregation, SignalAggregator};
use crate::engine::analyzers;
use crate::engine::day_classifier::DayClassifier;
use crate::engine::detectors::DetectorContext;
use crate::engine::safety::{SafetyDecision, SafetyFilter};
use crate::engine::strategy_engine::{EngineStatus, StrategyEngine};
use crate::error::SignalError;
use crate::events::WsEvent;
use crate::market::SharedMarket;
use crate::models::{AggregatedSignal, DayClassification, DetectorResult, SignalKind};
use crate::notify::{format_session_summary, format_signal, SharedNotifier};

// ─── Reports ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    NoSignal,
    BelowThreshold { direction: SignalKind, score: f64 },
    Blocked { direction: SignalKind, strategy: String, reason: String },
    Sent { signal: Box<AggregatedSignal> },
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub at: DateTime<FixedOffset>,
    pub results: Vec<DetectorResult>,
    #[serde(flatten)]
    pub outcome: TickOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub date: Option<NaiveDate>,
    pub ticks: u64,
    pub signals_sent: usize,
    pub blocked: u32,
}

#[derive(Debug, Default)]
struct SessionStats {
    date: Option<NaiveDate>,
    classification: Option<DayClassification>,
    ticks: u64,
    signals: Vec<AggregatedSignal>,
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

pub struct Pipeline {
    symbol: String,
    market: SharedMarket,
    classifier: Mutex<DayClassifier>,
    engine: Mutex<StrategyEngine>,
    aggregator: SignalAggregator,
    safety: SafetyFilter,
    notifier: SharedNotifier,
    events: broadcast::Sender<String>,
    session: RwLock<SessionStats>,
    history: RwLock<Vec<AggregatedSignal>>,
    /// Simulation: no delivery, no broadcasts.
    dry_run: bool,
}

impl Pipeline {
    pub fn new(
        symbol: impl Into<String>,
        market: SharedMarket,
        engine: StrategyEngine,
        aggregator: SignalAggregator,
        safety: SafetyFilter,
        notifier: SharedNotifier,
        events: broadcast::Sender<String>,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            classifier: Mutex::new(DayClassifier::new(symbol.clone())),
            symbol,
            market,
            engine: Mutex::new(engine),
            aggregator,
            safety,
            notifier,
            events,
            session: RwLock::new(SessionStats::default()),
            history: RwLock::new(Vec::new()),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn safety(&self) -> &SafetyFilter {
        &self.safety
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn broadcast(&self, event: WsEvent) {
        if !self.dry_run {
            // Err = no receivers
            let _ = self.events.send(event.to_json());
        }
    }

    /// Fire-and-forget delivery.
    fn deliver(&self, message: String) {
        if self.dry_run {
            return;
        }
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&message).await {
                warn!(channel = notifier.channel(), error = %e, "⚠️ Delivery failed, not retried");
            }
        });
    }

    // ─── Session start ────────────────────────────────────────────────────────

    pub async fn on_session_start(
        &self,
        now: DateTime<FixedOffset>,
    ) -> Result<Option<DayClassification>, SignalError> {
        self.start_with(&self.market, now).await
    }

    pub(crate) async fn start_with(
        &self,
        market: &SharedMarket,
        now: DateTime<FixedOffset>,
    ) -> Result<Option<DayClassification>, SignalError> {
        let date = now.date_naive();
        {
            let session = self.session.read().await;
            if session.date == Some(date) {
                debug!(%date, "session already started, keeping day state");
                return Ok(session.classification.clone());
            }
        }
        self.engine.lock().await.reset_for_session(date);
        self.safety.reset(date).await;

        let classification = {
            let mut classifier = self.classifier.lock().await;
            classifier.invalidate();
            match classifier.classify(market.as_ref(), date).await {
                Ok(c) => Some(c),
                Err(SignalError::DataUnavailable(msg)) => {
                    warn!(%date, %msg, "⚠️ No prior-day data, running without classification");
                    None
                }
                Err(e) => return Err(e),
            }
        };

        *self.session.write().await = SessionStats {
            date: Some(date),
            classification: classification.clone(),
            ..SessionStats::default()
        };
        info!(%date, trend_day = classification.as_ref().map(|c| c.is_trend_day), "🌅 Session started");
        self.broadcast(WsEvent::SessionStarted {
            date,
            classification: classification.clone().map(Box::new),
        });
        Ok(classification)
    }

    // ─── Tick ─────────────────────────────────────────────────────────────────

    pub async fn on_tick(&self, now: DateTime<FixedOffset>) -> Result<TickReport, SignalError> {
        self.tick_with(&self.market, now).await
    }

    pub(crate) async fn tick_with(
        &self,
        market: &SharedMarket,
        now: DateTime<FixedOffset>,
    ) -> Result<TickReport, SignalError> {
        if self.session.read().await.date != Some(now.date_naive()) {
            info!("session not started for today, starting now");
            self.start_with(market, now).await?;
        }
        let classification = {
            let mut session = self.session.write().await;
            session.ticks += 1;
            session.classification.clone()
        };

        let snapshot = analyzers::collect(market.as_ref(), &self.symbol, now).await;
        let ctx = DetectorContext {
            now,
            symbol: self.symbol.clone(),
            classification,
            analyzers: snapshot,
            market: Arc::clone(market),
        };
        let results = self.engine.lock().await.evaluate(&ctx).await;
        self.broadcast(WsEvent::TickEvaluated {
            at: now,
            evaluated: results.len(),
            fired: results.iter().filter(|r| r.is_signal()).map(|r| r.strategy_name.clone()).collect(),
        });

        let aggregation = self
            .aggregator
            .aggregate(&results, ctx.classification.as_ref(), &ctx.analyzers, now)
            .map_err(|e| {
                error!(error = %e, "❌ Aggregation failed, tick skipped");
                e
            })?;

        let outcome = match aggregation {
            Aggregation::NoSignals => {
                debug!("no detector fired");
                TickOutcome::NoSignal
            }
            Aggregation::BelowThreshold { direction, score } => {
                self.broadcast(WsEvent::BelowThreshold {
                    direction,
                    score: score.total,
                    min: self.aggregator.scorer().min_confidence(),
                });
                TickOutcome::BelowThreshold { direction, score: score.total }
            }
            Aggregation::Signal(signal) => self.gate_and_send(market, signal, now).await,
        };

        Ok(TickReport { at: now, results, outcome })
    }

    async fn gate_and_send(
        &self,
        market: &SharedMarket,
        mut signal: AggregatedSignal,
        now: DateTime<FixedOffset>,
    ) -> TickOutcome {
        let decision = self
            .safety
            .validate_signal(signal.direction, &signal.primary_strategy, now)
            .await;
        if let SafetyDecision::Blocked(block) = decision {
            let reason = block.to_string();
            self.broadcast(WsEvent::SignalBlocked {
                direction: signal.direction,
                strategy: signal.primary_strategy.clone(),
                reason: reason.clone(),
            });
            return TickOutcome::Blocked {
                direction: signal.direction,
                strategy: signal.primary_strategy,
                reason,
            };
        }

        if signal.spot_price_hint.is_none() {
            match market.fetch_spot_price(&self.symbol).await {
                Ok(spot) => signal.spot_price_hint = Some(spot),
                Err(e) => warn!(error = %e, "spot price unavailable for hint"),
            }
        }

        self.safety.mark_signal_sent(signal.direction, now).await;
        self.deliver(format_signal(&signal, &self.symbol));
        self.session.write().await.signals.push(signal.clone());
        if !self.dry_run {
            self.history.write().await.push(signal.clone());
        }
        info!(id = %signal.id, direction = %signal.direction, confidence = signal.confidence_score, "🚀 Signal sent");
        self.broadcast(WsEvent::SignalSent { signal: Box::new(signal.clone()) });

        TickOutcome::Sent { signal: Box::new(signal) }
    }

    // ─── Session end ──────────────────────────────────────────────────────────

    pub async fn on_session_end(&self, _now: DateTime<FixedOffset>) -> SessionSummary {
        let blocked = self.safety.status().await.blocked;
        let session = self.session.read().await;
        let summary = SessionSummary {
            date: session.date,
            ticks: session.ticks,
            signals_sent: session.signals.len(),
            blocked,
        };
        if let Some(date) = session.date {
            self.deliver(format_session_summary(date, session.ticks, &session.signals, blocked));
            self.broadcast(WsEvent::SessionEnded {
                date,
                ticks: session.ticks,
                signals_sent: session.signals.len(),
                blocked,
            });
        }
        info!(ticks = summary.ticks, sent = summary.signals_sent, blocked, "🌇 Session ended");
        summary
    }

    // ─── Read side ────────────────────────────────────────────────────────────

    pub async fn history(&self) -> Vec<AggregatedSignal> {
        self.history.read().await.clone()
    }

    pub async fn session_signals(&self) -> Vec<AggregatedSignal> {
        self.session.read().await.signals.clone()
    }

    pub async fn classification(&self) -> Option<DayClassification> {
        self.session.read().await.classification.clone()
    }

    pub async fn session_date(&self) -> Option<NaiveDate> {
        self.session.read().await.date
    }

    pub async fn engine_status(&self, now: DateTime<FixedOffset>) -> EngineStatus {
        self.engine.lock().await.status(now)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
