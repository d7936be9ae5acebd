//! # detectors::day_behavior — Day-Behavior Alignment
//!
//! Only runs after an A-Day.  Asks whether today is behaving like a
//! continuation of the prior trend:
//!
//! | Check                                    | Points |
//! |------------------------------------------|--------|
//! | Today's move from open matches A-Day     | 3      |
//! | Gap in A-Day direction still unfilled    | 2      |
//! | Trading beyond PDH / PDL in A-Day dir    | 3      |
//! | Last 6 candles ≥ 70% in A-Day direction  | 2      |
//!
//! Fires at ≥ 7 of 10.  Range expansion is reported but not scored.

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::engine::detectors::{Detector, DetectorContext, DetectorSpec};
use crate::market::session_candles;
use crate::models::{Candle, DetectorResult, Interval, Reason, SignalKind, TrendDirection};
use crate::session::TimeWindow;

pub const FIRE_THRESHOLD: f64 = 7.0;
pub const MIN_GAP_POINTS: f64 = 10.0;
pub const MOMENTUM_CANDLES: usize = 6;
pub const MOMENTUM_RATIO: f64 = 0.70;

const DIRECTION_POINTS: f64 = 3.0;
const GAP_POINTS: f64 = 2.0;
const BEYOND_POINTS: f64 = 3.0;
const MOMENTUM_POINTS: f64 = 2.0;

/// Everything measured about today relative to the prior day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayBehavior {
    pub gap: f64,
    pub gap_filled: bool,
    pub range_expansion: f64,
    pub net_move: f64,
    pub momentum: Option<TrendDirection>,
    pub above_pdh: bool,
    pub below_pdl: bool,
}

impl DayBehavior {
    pub fn measure(previous_day: &Candle, today: &[Candle]) -> Option<Self> {
        let first = today.first()?;
        let last = today.last()?;
        let high = today.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = today.iter().map(|c| c.low).fold(f64::MAX, f64::min);

        let gap = first.open - previous_day.close;
        let gap_filled = if gap > 0.0 {
            low <= previous_day.close
        } else if gap < 0.0 {
            high >= previous_day.close
        } else {
            true
        };
        let prev_range = previous_day.range();
        let range_expansion = if prev_range > 0.0 { (high - low) / prev_range } else { 0.0 };

        Some(Self {
            gap,
            gap_filled,
            range_expansion,
            net_move: last.close - first.open,
            momentum: momentum(today),
            above_pdh: last.close > previous_day.high,
            below_pdl: last.close < previous_day.low,
        })
    }

    /// Score against the A-Day direction.
    pub fn score(&self, trend: TrendDirection) -> (f64, Vec<Reason>) {
        let bullish = trend == TrendDirection::Bullish;
        let mut score = 0.0;
        let mut reasons = Vec::with_capacity(5);

        let moving_with = if bullish { self.net_move > 0.0 } else { self.net_move < 0.0 };
        if moving_with {
            score += DIRECTION_POINTS;
            reasons.push(Reason::pass("Direction", format!("{:+.1} pts from open", self.net_move)));
        } else {
            reasons.push(Reason::fail("Direction", format!("{:+.1} pts from open", self.net_move)));
        }

        let gap_with = if bullish { self.gap >= MIN_GAP_POINTS } else { self.gap <= -MIN_GAP_POINTS };
        if gap_with && !self.gap_filled {
            score += GAP_POINTS;
            reasons.push(Reason::pass("Gap", format!("{:+.1} pts, unfilled", self.gap)));
        } else if gap_with {
            reasons.push(Reason::neutral("Gap", format!("{:+.1} pts, filled", self.gap)));
        } else {
            reasons.push(Reason::neutral("Gap", format!("{:+.1} pts", self.gap)));
        }

        let beyond = if bullish { self.above_pdh } else { self.below_pdl };
        if beyond {
            score += BEYOND_POINTS;
            let label = if bullish { "above PDH" } else { "below PDL" };
            reasons.push(Reason::pass("Prior Day Levels", label));
        } else {
            reasons.push(Reason::neutral("Prior Day Levels", "inside prior day range"));
        }

        match self.momentum {
            Some(m) if m == trend => {
                score += MOMENTUM_POINTS;
                reasons.push(Reason::pass("Momentum", format!("last {MOMENTUM_CANDLES} candles {m:?}")));
            }
            Some(m) => reasons.push(Reason::fail("Momentum", format!("last {MOMENTUM_CANDLES} candles {m:?}"))),
            None => reasons.push(Reason::neutral("Momentum", "no directional momentum")),
        }

        reasons.push(Reason::neutral(
            "Range Expansion",
            format!("{:.0}% of prior day range", self.range_expansion * 100.0),
        ));
        (score, reasons)
    }
}

/// Direction shared by ≥ 70% of the last six candles.
pub fn momentum(candles: &[Candle]) -> Option<TrendDirection> {
    if candles.len() < MOMENTUM_CANDLES {
        return None;
    }
    let recent = &candles[candles.len() - MOMENTUM_CANDLES..];
    let bulls = recent.iter().filter(|c| c.is_bullish()).count() as f64;
    let bears = recent.iter().filter(|c| c.is_bearish()).count() as f64;
    let n = MOMENTUM_CANDLES as f64;
    if bulls / n >= MOMENTUM_RATIO {
        Some(TrendDirection::Bullish)
    } else if bears / n >= MOMENTUM_RATIO {
        Some(TrendDirection::Bearish)
    } else {
        None
    }
}

pub struct DayBehaviorDetector {
    spec: DetectorSpec,
    last: Option<DayBehavior>,
    fired: bool,
}

impl DayBehaviorDetector {
    pub fn new() -> Self {
        Self {
            spec: DetectorSpec {
                name: "Day Behavior",
                window: TimeWindow::hm(9, 45, 14, 0),
                max_score: 10.0,
            },
            last: None,
            fired: false,
        }
    }

    async fn run(&mut self, ctx: &DetectorContext) -> anyhow::Result<DetectorResult> {
        if let Some(result) = self.precheck(ctx) {
            return Ok(result);
        }
        let spec = self.spec;

        let Some(classification) = ctx.classification.as_ref().filter(|c| c.is_trend_day) else {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("A-Day", "prior day was not a trend day"),
            ));
        };
        let Some(trend) = classification.direction else {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("A-Day", "trend day without a direction"),
            ));
        };

        let candles =
            session_candles(ctx.market.as_ref(), &ctx.symbol, Interval::FiveMinute, ctx.now).await?;
        let Some(behavior) = DayBehavior::measure(&classification.previous_day, &candles) else {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Candles", "no candles today"),
            ));
        };
        self.last = Some(behavior);

        let (score, reasons) = behavior.score(trend);
        let close = candles.last().map(|c| c.close);
        let data = json!({ "behavior": behavior, "score": score });

        if score < FIRE_THRESHOLD {
            return Ok(DetectorResult::rejected(spec.name, spec.max_score, reasons)
                .with_prices(close, None)
                .with_data(data));
        }

        let kind = SignalKind::from(trend);
        let stop = match kind {
            SignalKind::BuyCall => candles.iter().map(|c| c.low).fold(f64::MAX, f64::min),
            SignalKind::BuyPut => candles.iter().map(|c| c.high).fold(f64::MIN, f64::max),
        };
        self.fired = true;
        info!(direction = %kind, score, "🗓️ Day behaviour confirms A-Day");

        Ok(DetectorResult::fired(spec.name, spec.max_score, kind, score, reasons)
            .with_prices(close, Some(stop))
            .with_data(data))
    }
}

impl Default for DayBehaviorDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for DayBehaviorDetector {
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
        self.last = None;
        self.fired = false;
    }

    fn state(&self) -> serde_json::Value {
        json!({ "behavior": self.last, "fired": self.fired })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detectors::fixtures::{bar, make_ctx, test_date, trend_day};
    use crate::market::InMemoryMarketData;

    /// Gap up over the prior close (22180), six rising candles, ends above PDH.
    fn make_bullish_session() -> Vec<Candle> {
        let d = test_date();
        (0..6)
            .map(|i| {
                let o = 22200.0 + i as f64 * 10.0;
                bar(d, i, o, o + 12.0, o - 3.0, o + 10.0, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_momentum_threshold() {
        let d = test_date();
        let mut candles: Vec<Candle> =
            (0..4).map(|i| bar(d, i, 100.0, 102.0, 99.0, 101.0, 1.0)).collect();
        candles.extend((4..6).map(|i| bar(d, i, 101.0, 102.0, 99.0, 100.0, 1.0)));
        // 4 of 6 = 66%
        assert_eq!(momentum(&candles), None);
        candles[4] = bar(d, 4, 100.0, 102.0, 99.0, 101.0, 1.0);
        assert_eq!(momentum(&candles), Some(TrendDirection::Bullish));
    }

    #[test]
    fn test_measure_unfilled_gap() {
        let prev = trend_day(TrendDirection::Bullish).previous_day;
        let b = DayBehavior::measure(&prev, &make_bullish_session()).unwrap();
        assert_eq!(b.gap, 20.0);
        assert!(!b.gap_filled);
        assert!(b.above_pdh);
        assert_eq!(b.net_move, 60.0);
    }

    #[tokio::test]
    async fn test_full_alignment_fires_call() {
        let market = InMemoryMarketData::new().with_candles(Interval::FiveMinute, make_bullish_session());
        let mut detector = DayBehaviorDetector::new();
        let ctx = make_ctx(10, 0, Some(trend_day(TrendDirection::Bullish)), market);
        let result = detector.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, Some(SignalKind::BuyCall));
        assert_eq!(result.score, 10.0);
        assert_eq!(result.stop_loss, Some(22197.0));
    }

    #[tokio::test]
    async fn test_against_bearish_a_day_does_not_fire() {
        let market = InMemoryMarketData::new().with_candles(Interval::FiveMinute, make_bullish_session());
        let mut detector = DayBehaviorDetector::new();
        let ctx = make_ctx(10, 0, Some(trend_day(TrendDirection::Bearish)), market);
        let result = detector.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, None);
    }

    #[tokio::test]
    async fn test_requires_trend_day() {
        let market = InMemoryMarketData::new().with_candles(Interval::FiveMinute, make_bullish_session());
        let mut detector = DayBehaviorDetector::new();
        let result = detector.analyze(&make_ctx(10, 0, None, market)).await.unwrap();
        assert_eq!(result.signal, None);
        assert_eq!(result.reasons[0].factor, "A-Day");
    }
}
