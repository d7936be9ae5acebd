//! # detectors::orb — Opening-Range Breakout
//!
//! ```text
//! 09:15–09:30  first 15-min candle ──▶ range [low, high]   (captured once)
//! later 5-min candle CLOSE > high  ──▶ BUY_CALL  (stop = low)
//! later 5-min candle CLOSE < low   ──▶ BUY_PUT   (stop = high)
//! ```
//!
//! ใช้ราคาปิดเท่านั้น — ไส้เทียนทะลุแล้วปิดกลับเข้ามาไม่นับเป็น Breakout

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::engine::detectors::{
    day_alignment_bonus, volume_bonus, Detector, DetectorContext, DetectorSpec,
};
use crate::market::session_candles;
use crate::models::{Candle, DetectorResult, Interval, Reason, SignalKind};
use crate::session::{market_open, TimeWindow};

const BASE_SCORE: f64 = 10.0;
const DAY_BONUS: f64 = 3.0;
const VOLUME_BONUS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OpeningRange {
    pub high: f64,
    pub low: f64,
}

/// Close-based breakout check.  Returns the direction and the stop (the
/// opposite range boundary).
pub fn check_breakout(range: OpeningRange, candle: &Candle) -> Option<(SignalKind, f64)> {
    if candle.close > range.high {
        Some((SignalKind::BuyCall, range.low))
    } else if candle.close < range.low {
        Some((SignalKind::BuyPut, range.high))
    } else {
        None
    }
}

pub struct OrbDetector {
    spec: DetectorSpec,
    range: Option<OpeningRange>,
    fired: bool,
}

impl OrbDetector {
    pub fn new() -> Self {
        Self {
            spec: DetectorSpec {
                name: "ORB Breakout",
                window: TimeWindow::hm(9, 30, 11, 0),
                max_score: 15.0,
            },
            range: None,
            fired: false,
        }
    }

    /// Score a breakout of the captured range by `latest`.
    fn evaluate(&mut self, ctx: &DetectorContext, range: OpeningRange, latest: &Candle) -> DetectorResult {
        let spec = self.spec;
        let data = json!({ "range": range, "close": latest.close });

        let Some((kind, stop)) = check_breakout(range, latest) else {
            return DetectorResult::rejected(
                spec.name,
                spec.max_score,
                vec![Reason::neutral(
                    "Breakout",
                    format!(
                        "close {:.2} inside range {:.2}–{:.2}",
                        latest.close, range.low, range.high
                    ),
                )],
            )
            .with_prices(Some(latest.close), None)
            .with_data(data);
        };

        let (day_pts, day_reason) = day_alignment_bonus(ctx, kind, DAY_BONUS);
        let (vol_pts, vol_reason) = volume_bonus(ctx, VOLUME_BONUS);
        let boundary = if kind == SignalKind::BuyCall { range.high } else { range.low };
        let reasons = vec![
            Reason::pass(
                "Breakout",
                format!("close {:.2} beyond opening range {:.2}", latest.close, boundary),
            ),
            day_reason,
            vol_reason,
        ];

        self.fired = true;
        info!(direction = %kind, close = latest.close, stop, "📈 ORB breakout");

        DetectorResult::fired(spec.name, spec.max_score, kind, BASE_SCORE + day_pts + vol_pts, reasons)
            .with_prices(Some(latest.close), Some(stop))
            .with_data(data)
    }

    async fn run(&mut self, ctx: &DetectorContext) -> anyhow::Result<DetectorResult> {
        if let Some(result) = self.precheck(ctx) {
            return Ok(result);
        }
        let spec = self.spec;

        // ── 1. Capture the opening range once ─────────────────────────────────
        if self.range.is_none() {
            let fifteen =
                session_candles(ctx.market.as_ref(), &ctx.symbol, Interval::FifteenMinute, ctx.now)
                    .await?;
            match fifteen.iter().find(|c| c.timestamp.time() == market_open()) {
                Some(first) => {
                    let range = OpeningRange { high: first.high, low: first.low };
                    debug!(high = range.high, low = range.low, "opening range captured");
                    self.range = Some(range);
                }
                None => {
                    return Ok(DetectorResult::idle(
                        spec.name,
                        spec.max_score,
                        Reason::neutral("Opening Range", "first 15-minute candle not available"),
                    ));
                }
            }
        }
        let Some(range) = self.range else {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Opening Range", "not captured"),
            ));
        };

        // ── 2. Latest 5-min close after the range ─────────────────────────────
        let five =
            session_candles(ctx.market.as_ref(), &ctx.symbol, Interval::FiveMinute, ctx.now).await?;
        let range_end = spec.window.start;
        let Some(latest) = five.iter().rev().find(|c| c.timestamp.time() >= range_end) else {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Breakout", "no completed candle after the opening range"),
            ));
        };

        Ok(self.evaluate(ctx, range, latest))
    }
}

impl Default for OrbDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for OrbDetector {
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
        self.range = None;
        self.fired = false;
    }

    fn state(&self) -> serde_json::Value {
        json!({ "range": self.range, "fired": self.fired })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detectors::fixtures::{bar, make_ctx, test_date, trend_day};
    use crate::market::InMemoryMarketData;
    use crate::models::TrendDirection;
    use crate::session::{at, hm};

    fn make_market(closes_after_range: &[f64]) -> InMemoryMarketData {
        let d = test_date();
        let fifteen = vec![Candle::new(at(d, hm(9, 15)), 105.0, 110.0, 100.0, 106.0, 1000.0)];
        let mut five = vec![
            bar(d, 0, 105.0, 108.0, 100.0, 104.0, 300.0),
            bar(d, 1, 104.0, 110.0, 103.0, 107.0, 300.0),
            bar(d, 2, 107.0, 109.0, 105.0, 106.0, 300.0),
        ];
        for (i, &c) in closes_after_range.iter().enumerate() {
            five.push(bar(d, 3 + i as i64, c - 1.0, c + 1.0, c - 2.0, c, 400.0));
        }
        InMemoryMarketData::new()
            .with_candles(Interval::FifteenMinute, fifteen)
            .with_candles(Interval::FiveMinute, five)
    }

    #[test]
    fn test_close_above_range_is_call_with_low_stop() {
        let range = OpeningRange { high: 110.0, low: 100.0 };
        let d = test_date();
        let candle = bar(d, 4, 109.0, 113.0, 108.0, 112.0, 500.0);
        assert_eq!(check_breakout(range, &candle), Some((SignalKind::BuyCall, 100.0)));
    }

    #[test]
    fn test_wick_without_close_is_ignored() {
        let range = OpeningRange { high: 110.0, low: 100.0 };
        let candle = bar(test_date(), 4, 108.0, 115.0, 107.0, 109.5, 500.0);
        assert_eq!(check_breakout(range, &candle), None);
    }

    #[tokio::test]
    async fn test_analyze_fires_once_per_session() {
        let mut orb = OrbDetector::new();
        let ctx = make_ctx(9, 40, Some(trend_day(TrendDirection::Bullish)), make_market(&[108.0, 112.0]));

        let result = orb.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, Some(SignalKind::BuyCall));
        assert_eq!(result.stop_loss, Some(100.0));
        assert_eq!(result.score, BASE_SCORE + DAY_BONUS);

        let again = orb.analyze(&ctx).await.unwrap();
        assert_eq!(again.signal, None);
        assert_eq!(again.reasons[0].factor, "Already Signaled");

        orb.reset();
        assert!(!orb.has_fired());
    }

    #[tokio::test]
    async fn test_forming_bar_close_is_ignored() {
        // at 09:42 the 09:40 bar prints 112 above the range but has not closed
        let mut orb = OrbDetector::new();
        let ctx = make_ctx(9, 42, Some(trend_day(TrendDirection::Bullish)), make_market(&[108.0, 109.0, 112.0]));
        let result = orb.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, None);
        assert!(!orb.has_fired());

        let closed = make_ctx(9, 45, Some(trend_day(TrendDirection::Bullish)), make_market(&[108.0, 109.0, 112.0]));
        assert_eq!(orb.analyze(&closed).await.unwrap().signal, Some(SignalKind::BuyCall));
    }

    #[tokio::test]
    async fn test_outside_window_is_idle() {
        let mut orb = OrbDetector::new();
        let ctx = make_ctx(11, 5, None, make_market(&[112.0]));
        let result = orb.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, None);
        assert_eq!(result.reasons[0].factor, "Time Window");
    }
}
