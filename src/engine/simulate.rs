//! # engine::simulate — Replay a past session
//!
//! ดึงข้อมูลทั้งวันมาครั้งเดียว แล้ว replay ทีละ step ผ่าน detector ชุดเดิม
//! โดยเห็นเฉพาะแท่งที่ปิดแล้ว ณ เวลานั้น (ไม่มี look-ahead)
//!
//! Fresh engine / classifier / safety instances per run; nothing is
//! delivered or broadcast.  No P&L attribution.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::engine::aggregator::SignalAggregator;
use crate::engine::pipeline::{Pipeline, TickOutcome};
use crate::engine::safety::{SafetyConfig, SafetyFilter};
use crate::engine::scorer::{ConfidenceScorer, ScorerConfig};
use crate::engine::strategy_engine::{EngineConfig, StrategyEngine};
use crate::error::SignalError;
use crate::market::{InMemoryMarketData, MarketData, SharedMarket};
use crate::models::{AggregatedSignal, DayClassification, Interval};
use crate::notify::LogNotifier;
use crate::session::{at, market_close, market_open};

/// Calendar days of 5-min history kept for the expiry baseline.
const FIVE_MIN_HISTORY_DAYS: i64 = 10;
const FIFTEEN_MIN_HISTORY_DAYS: i64 = 7;
const DAILY_HISTORY_DAYS: i64 = 40;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub engine: EngineConfig,
    pub scorer: ScorerConfig,
    pub safety: SafetyConfig,
    pub step_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub date: NaiveDate,
    pub classification: Option<DayClassification>,
    pub ticks: u64,
    pub signals: Vec<AggregatedSignal>,
    pub below_threshold: u32,
    pub blocked: u32,
    /// How many ticks each detector fired on.
    pub detector_hits: BTreeMap<String, u32>,
}

/// Prefetch everything the detectors will ask for on `date`.
async fn prefetch(
    source: &dyn MarketData,
    symbol: &str,
    date: NaiveDate,
) -> Result<InMemoryMarketData, SignalError> {
    let upstream = |e: anyhow::Error| SignalError::Upstream(format!("{e:#}"));

    let (five, fifteen, daily) = tokio::join!(
        source.fetch_candles(symbol, Interval::FiveMinute, date - Duration::days(FIVE_MIN_HISTORY_DAYS), date),
        source.fetch_candles(symbol, Interval::FifteenMinute, date - Duration::days(FIFTEEN_MIN_HISTORY_DAYS), date),
        source.fetch_candles(symbol, Interval::Day, date - Duration::days(DAILY_HISTORY_DAYS), date),
    );
    let five = five.map_err(upstream)?;
    if !five.iter().any(|c| c.timestamp.date_naive() == date) {
        return Err(SignalError::DataUnavailable(format!("no 5-minute candles for {date}")));
    }

    Ok(InMemoryMarketData::new()
        .with_candles(Interval::FiveMinute, five)
        .with_candles(Interval::FifteenMinute, fifteen.map_err(upstream)?)
        .with_candles(Interval::Day, daily.map_err(upstream)?))
}

pub async fn simulate(
    source: &dyn MarketData,
    symbol: &str,
    date: NaiveDate,
    config: SimulationConfig,
) -> Result<SimulationReport, SignalError> {
    let replay = prefetch(source, symbol, date).await?;
    let step = Duration::minutes(config.step_minutes.max(1));

    let (events, _) = broadcast::channel(1);
    let pipeline = Pipeline::new(
        symbol,
        Arc::new(replay.clone()),
        StrategyEngine::new(config.engine),
        SignalAggregator::new(ConfidenceScorer::new(config.scorer)),
        SafetyFilter::new(config.safety),
        Arc::new(LogNotifier),
        events,
    )
    .dry_run();

    let open = at(date, market_open());
    let close = at(date, market_close());
    let classification = pipeline.start_with(&(Arc::new(replay.at(open)) as SharedMarket), open).await?;

    let mut report = SimulationReport {
        date,
        classification,
        ticks: 0,
        signals: Vec::new(),
        below_threshold: 0,
        blocked: 0,
        detector_hits: BTreeMap::new(),
    };

    let mut cursor = open + step;
    while cursor <= close {
        let view: SharedMarket = Arc::new(replay.at(cursor));
        let tick = pipeline.tick_with(&view, cursor).await?;
        report.ticks += 1;
        for r in tick.results.iter().filter(|r| r.is_signal()) {
            *report.detector_hits.entry(r.strategy_name.clone()).or_default() += 1;
        }
        match tick.outcome {
            TickOutcome::Sent { signal } => report.signals.push(*signal),
            TickOutcome::BelowThreshold { .. } => report.below_threshold += 1,
            TickOutcome::Blocked { .. } => report.blocked += 1,
            TickOutcome::NoSignal => {}
        }
        cursor += step;
    }

    info!(
        %date,
        ticks = report.ticks,
        signals = report.signals.len(),
        blocked = report.blocked,
        "🧪 Simulation finished"
    );
    Ok(report)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detectors::fixtures::{bar, test_date};
    use crate::models::{Candle, SignalKind};
    use crate::session::hm;

    fn make_config() -> SimulationConfig {
        SimulationConfig {
            engine: EngineConfig::default(),
            scorer: ScorerConfig { min_confidence: 30.0, ..ScorerConfig::default() },
            safety: SafetyConfig::default(),
            step_minutes: 5,
        }
    }

    /// Bullish A-Day yesterday, flat doji open, then the 09:45 candle
    /// breaks the 22195–22240 opening range.
    fn make_source() -> InMemoryMarketData {
        let d = test_date();
        let mut daily: Vec<Candle> = (2..=22)
            .map(|back| {
                Candle::new(at(d - Duration::days(back), hm(9, 15)), 22000.0, 22050.0, 21950.0, 22010.0, 1.0e6)
            })
            .collect();
        daily.push(Candle::new(at(d - Duration::days(1), hm(9, 15)), 22000.0, 22190.0, 21990.0, 22180.0, 3.0e6));

        let fifteen = vec![Candle::new(at(d, hm(9, 15)), 22200.0, 22240.0, 22195.0, 22230.0, 3.0e5)];
        let mut five: Vec<Candle> = (0..6)
            .map(|i| bar(d, i, 22220.0, 22235.0, 22200.0, 22220.0, 1.0e5))
            .collect();
        five.push(bar(d, 6, 22220.0, 22270.0, 22218.0, 22262.0, 3.0e5));
        five.extend((7..20).map(|i| bar(d, i, 22262.0, 22275.0, 22255.0, 22268.0, 1.0e5)));

        InMemoryMarketData::new()
            .with_candles(Interval::Day, daily)
            .with_candles(Interval::FifteenMinute, fifteen)
            .with_candles(Interval::FiveMinute, five)
    }

    #[tokio::test]
    async fn test_replay_finds_orb_breakout_once() {
        let report = simulate(&make_source(), "NIFTY 50", test_date(), make_config()).await.unwrap();

        assert!(report.classification.as_ref().map(|c| c.is_trend_day).unwrap_or(false));
        assert_eq!(report.ticks, 75);
        assert_eq!(report.signals.len(), 1);
        let signal = &report.signals[0];
        assert_eq!(signal.direction, SignalKind::BuyCall);
        assert!(signal.contributing_strategies.contains(&"ORB Breakout".to_string()));
        // no look-ahead: the breakout candle closes at 09:50
        assert!(signal.timestamp >= at(test_date(), hm(9, 50)));
        assert_eq!(report.detector_hits.get("ORB Breakout"), Some(&1));
    }

    #[tokio::test]
    async fn test_missing_day_is_data_unavailable() {
        let empty = InMemoryMarketData::new();
        let err = simulate(&empty, "NIFTY 50", test_date(), make_config()).await.unwrap_err();
        assert!(matches!(err, SignalError::DataUnavailable(_)));
    }
}
