//! # detectors::vwap — VWAP Crossover
//!
//! Session VWAP = Σ(typical × volume) / Σvolume over today's 5-min candles.
//! A crossover inside the last three candles (prev close on one side, this
//! close on the other) is the trigger; volume confirmation decides whether
//! the score clears the minimum.
//!
//! | Component                         | Points |
//! |-----------------------------------|--------|
//! | Crossover                         | 5      |
//! | Recent volume ≥ 1.5× rest / ≥ 1.0× | 5 / 2  |
//! | Prior A-Day agrees                | 3      |
//! | 15-min trend agrees               | 2      |
//!
//! Below [`MIN_TOTAL`] the crossover is reported but no signal is emitted.

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::json;
use tracing::{debug, info};

use crate::engine::detectors::{day_alignment_bonus, trend_bonus, Detector, DetectorContext, DetectorSpec};
use crate::engine::indicators::{average_volume, vwap_series};
use crate::market::session_candles;
use crate::models::{Candle, DetectorResult, Interval, Reason, SignalKind};
use crate::session::TimeWindow;

pub const MIN_TOTAL: f64 = 10.0;
const LOOKBACK: usize = 3;
const CROSS_SCORE: f64 = 5.0;
const STRONG_VOLUME: f64 = 1.5;
const STRONG_VOLUME_SCORE: f64 = 5.0;
const WEAK_VOLUME: f64 = 1.0;
const WEAK_VOLUME_SCORE: f64 = 2.0;
const DAY_BONUS: f64 = 3.0;
const TREND_BONUS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossover {
    pub kind: SignalKind,
    /// Index of the candle that closed across VWAP.
    pub index: usize,
    pub vwap: f64,
}

/// Most recent crossover within the last `LOOKBACK` candles.
pub fn find_crossover(candles: &[Candle], vwap: &[f64]) -> Option<Crossover> {
    let n = candles.len().min(vwap.len());
    if n < 2 {
        return None;
    }
    let first = n.saturating_sub(LOOKBACK).max(1);
    (first..n).rev().find_map(|i| {
        let (prev, cur) = (candles[i - 1].close, candles[i].close);
        if prev < vwap[i - 1] && cur > vwap[i] {
            Some(Crossover { kind: SignalKind::BuyCall, index: i, vwap: vwap[i] })
        } else if prev > vwap[i - 1] && cur < vwap[i] {
            Some(Crossover { kind: SignalKind::BuyPut, index: i, vwap: vwap[i] })
        } else {
            None
        }
    })
}

/// Recent three-candle average volume ÷ average of everything before.
pub fn recent_volume_ratio(candles: &[Candle]) -> Option<f64> {
    if candles.len() <= LOOKBACK {
        return None;
    }
    let (rest, recent) = candles.split_at(candles.len() - LOOKBACK);
    let rest_avg = average_volume(rest).filter(|v| *v > 0.0)?;
    Some(average_volume(recent)? / rest_avg)
}

fn volume_points(ratio: Option<f64>) -> (f64, Reason) {
    match ratio {
        Some(r) if r >= STRONG_VOLUME => {
            (STRONG_VOLUME_SCORE, Reason::pass("Volume", format!("{r:.2}× session average")))
        }
        Some(r) if r >= WEAK_VOLUME => (
            WEAK_VOLUME_SCORE,
            Reason::neutral("Volume", format!("{r:.2}× session average, partial credit")),
        ),
        Some(r) => (0.0, Reason::fail("Volume", format!("{r:.2}× session average"))),
        None => (0.0, Reason::neutral("Volume", "not enough candles for a volume read")),
    }
}

pub struct VwapDetector {
    spec: DetectorSpec,
    last_vwap: Option<f64>,
    fired: bool,
}

impl VwapDetector {
    pub fn new() -> Self {
        Self {
            spec: DetectorSpec {
                name: "VWAP Crossover",
                window: TimeWindow::hm(9, 45, 15, 0),
                max_score: 15.0,
            },
            last_vwap: None,
            fired: false,
        }
    }

    async fn run(&mut self, ctx: &DetectorContext) -> anyhow::Result<DetectorResult> {
        if let Some(result) = self.precheck(ctx) {
            return Ok(result);
        }
        let spec = self.spec;

        let candles =
            session_candles(ctx.market.as_ref(), &ctx.symbol, Interval::FiveMinute, ctx.now).await?;
        if candles.len() <= LOOKBACK {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Candles", format!("{} candles, need {}", candles.len(), LOOKBACK + 1)),
            ));
        }

        let vwap = vwap_series(&candles);
        self.last_vwap = vwap.last().copied();
        let close = candles[candles.len() - 1].close;
        let ratio = recent_volume_ratio(&candles);
        let data = json!({ "vwap": self.last_vwap, "close": close, "volume_ratio": ratio });

        let Some(cross) = find_crossover(&candles, &vwap) else {
            return Ok(DetectorResult::rejected(
                spec.name,
                spec.max_score,
                vec![Reason::neutral("Crossover", "no VWAP cross in the last 3 candles")],
            )
            .with_prices(Some(close), None)
            .with_data(data));
        };

        let (vol_pts, vol_reason) = volume_points(ratio);
        let (day_pts, day_reason) = day_alignment_bonus(ctx, cross.kind, DAY_BONUS);
        let (trend_pts, trend_reason) = trend_bonus(ctx, cross.kind, TREND_BONUS);
        let side = if cross.kind == SignalKind::BuyCall { "above" } else { "below" };
        let mut reasons = vec![
            Reason::pass("Crossover", format!("closed {side} VWAP {:.2}", cross.vwap)),
            vol_reason,
            day_reason,
            trend_reason,
        ];
        let score = CROSS_SCORE + vol_pts + day_pts + trend_pts;

        if score < MIN_TOTAL {
            debug!(score, direction = %cross.kind, "VWAP cross below minimum score");
            reasons.push(Reason::fail("Score", format!("{score:.0} below minimum {MIN_TOTAL:.0}")));
            return Ok(DetectorResult::rejected(spec.name, spec.max_score, reasons)
                .with_prices(Some(close), None)
                .with_data(data));
        }

        let trigger = &candles[cross.index];
        let stop = match cross.kind {
            SignalKind::BuyCall => trigger.low,
            SignalKind::BuyPut => trigger.high,
        };
        self.fired = true;
        info!(direction = %cross.kind, close, vwap = cross.vwap, score, "📊 VWAP crossover");

        Ok(DetectorResult::fired(spec.name, spec.max_score, cross.kind, score, reasons)
            .with_prices(Some(close), Some(stop))
            .with_data(data))
    }
}

impl Default for VwapDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for VwapDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn has_fired(&self) -> bool {
        self.fired
    }

    fn analyze<'a>(
        &'a mut self,
        ctx: &'a DetectorContext,
    ) -> BoxFuture<'a, anyhow::Result<DetectorResult>> {
        self.run(ctx).boxed()
    }

    fn reset(&mut self) {
        self.last_vwap = None;
        self.fired = false;
    }

    fn state(&self) -> serde_json::Value {
        json!({ "vwap": self.last_vwap, "fired": self.fired })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detectors::fixtures::{bar, make_ctx, test_date, trend_day};
    use crate::market::InMemoryMarketData;
    use crate::models::{ReasonStatus, TrendDirection};

    /// Six flat candles, one dip under VWAP, then a close well above it.
    fn make_session(last_volume: f64) -> InMemoryMarketData {
        let d = test_date();
        let mut candles: Vec<Candle> =
            (0..6).map(|i| bar(d, i, 100.0, 101.0, 97.0, 98.0, 1000.0)).collect();
        candles.push(bar(d, 6, 98.0, 99.0, 96.0, 97.0, 1000.0));
        candles.push(bar(d, 7, 97.0, 106.0, 96.5, 105.0, last_volume));
        InMemoryMarketData::new().with_candles(Interval::FiveMinute, candles)
    }

    #[test]
    fn test_find_crossover_up() {
        let d = test_date();
        let candles = vec![
            bar(d, 0, 100.0, 101.0, 99.0, 100.0, 100.0),
            bar(d, 1, 100.0, 100.0, 95.0, 96.0, 100.0),
            bar(d, 2, 96.0, 104.0, 96.0, 103.0, 100.0),
        ];
        let vwap = vwap_series(&candles);
        let cross = find_crossover(&candles, &vwap).unwrap();
        assert_eq!(cross.kind, SignalKind::BuyCall);
        assert_eq!(cross.index, 2);
    }

    #[test]
    fn test_recent_volume_ratio() {
        let d = test_date();
        let mut candles: Vec<Candle> =
            (0..3).map(|i| bar(d, i, 1.0, 1.0, 1.0, 1.0, 100.0)).collect();
        candles.extend((3..6).map(|i| bar(d, i, 1.0, 1.0, 1.0, 1.0, 200.0)));
        assert_eq!(recent_volume_ratio(&candles), Some(2.0));
        assert_eq!(recent_volume_ratio(&candles[..3]), None);
    }

    #[tokio::test]
    async fn test_cross_with_volume_fires_call() {
        let mut detector = VwapDetector::new();
        let ctx = make_ctx(10, 0, Some(trend_day(TrendDirection::Bullish)), make_session(4000.0));
        let result = detector.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, Some(SignalKind::BuyCall));
        assert_eq!(result.score, 13.0);
        assert_eq!(result.stop_loss, Some(96.5));
        assert!(detector.has_fired());
    }

    #[tokio::test]
    async fn test_weak_cross_below_minimum_is_suppressed() {
        let mut detector = VwapDetector::new();
        let ctx = make_ctx(10, 0, None, make_session(1000.0));
        let result = detector.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, None);
        assert!(result
            .reasons
            .iter()
            .any(|r| r.factor == "Score" && r.status == ReasonStatus::Fail));
        assert!(!detector.has_fired());
    }

    #[tokio::test]
    async fn test_before_window_is_idle() {
        let mut detector = VwapDetector::new();
        let ctx = make_ctx(9, 40, None, make_session(4000.0));
        let result = detector.analyze(&ctx).await.unwrap();
        assert_eq!(result.reasons[0].factor, "Time Window");
    }
}
