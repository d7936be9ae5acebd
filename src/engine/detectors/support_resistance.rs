//! # detectors::support_resistance — Key-level interaction
//!
//! Levels are built once per session:
//!
//! - previous day high / low / close
//! - classic pivots P, R1–R3, S1–S3
//! - today's open
//! - round numbers (multiples of 100) around the first price seen
//!
//! Two events on the latest 5-min candle:
//!
//! ```text
//! Breakout   prev close on one side, close ≥ 5 pts through the level
//! Rejection  wick within 15 pts of the level, close ≥ 20 pts back away
//! ```
//!
//! Breakouts are checked before rejections.

use chrono::Duration;
use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::engine::detectors::{day_alignment_bonus, trend_bonus, Detector, DetectorContext, DetectorSpec};
use crate::engine::indicators::{round_levels, Pivots};
use crate::market::session_candles;
use crate::models::{Candle, DetectorResult, Interval, Reason, SignalKind};
use crate::session::TimeWindow;

pub const BREAKOUT_PENETRATION: f64 = 5.0;
pub const REJECTION_PROXIMITY: f64 = 15.0;
pub const REJECTION_DISTANCE: f64 = 20.0;
const ROUND_STEP: f64 = 100.0;

const BASE_SCORE: f64 = 8.0;
const DAY_BONUS: f64 = 4.0;
const TREND_BONUS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Level {
    pub name: String,
    pub price: f64,
}

impl Level {
    fn new(name: impl Into<String>, price: f64) -> Self {
        Self { name: name.into(), price }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelEvent {
    Breakout,
    Rejection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelHit {
    pub event: LevelEvent,
    pub kind: SignalKind,
    pub level: Level,
    pub stop: f64,
}

/// Every key level for the session, sorted by price.
pub fn build_levels(previous_day: &Candle, today_open: f64, first_price: f64) -> Vec<Level> {
    let pv = Pivots::from_hlc(previous_day.high, previous_day.low, previous_day.close);
    let mut levels = vec![
        Level::new("PDH", previous_day.high),
        Level::new("PDL", previous_day.low),
        Level::new("PDC", previous_day.close),
        Level::new("Pivot", pv.pivot),
        Level::new("R1", pv.r1),
        Level::new("R2", pv.r2),
        Level::new("R3", pv.r3),
        Level::new("S1", pv.s1),
        Level::new("S2", pv.s2),
        Level::new("S3", pv.s3),
        Level::new("Open", today_open),
    ];
    levels.extend(
        round_levels(first_price, ROUND_STEP)
            .into_iter()
            .map(|p| Level::new(format!("Round {p:.0}"), p)),
    );
    levels.sort_by(|a, b| a.price.total_cmp(&b.price));
    levels
}

fn check_breakout(levels: &[Level], prev: &Candle, latest: &Candle) -> Option<LevelHit> {
    // Nearest level to the close wins when several were crossed at once.
    let mut hits: Vec<LevelHit> = levels
        .iter()
        .filter_map(|lv| {
            if prev.close <= lv.price && latest.close >= lv.price + BREAKOUT_PENETRATION {
                Some(LevelHit {
                    event: LevelEvent::Breakout,
                    kind: SignalKind::BuyCall,
                    level: lv.clone(),
                    stop: lv.price.min(latest.low),
                })
            } else if prev.close >= lv.price && latest.close <= lv.price - BREAKOUT_PENETRATION {
                Some(LevelHit {
                    event: LevelEvent::Breakout,
                    kind: SignalKind::BuyPut,
                    level: lv.clone(),
                    stop: lv.price.max(latest.high),
                })
            } else {
                None
            }
        })
        .collect();
    hits.sort_by(|a, b| {
        (latest.close - a.level.price)
            .abs()
            .total_cmp(&(latest.close - b.level.price).abs())
    });
    hits.into_iter().next()
}

fn check_rejection(levels: &[Level], latest: &Candle) -> Option<LevelHit> {
    levels.iter().find_map(|lv| {
        let support_test = latest.is_bullish()
            && (latest.low - lv.price).abs() <= REJECTION_PROXIMITY
            && latest.close >= lv.price + REJECTION_DISTANCE;
        let resistance_test = latest.is_bearish()
            && (latest.high - lv.price).abs() <= REJECTION_PROXIMITY
            && latest.close <= lv.price - REJECTION_DISTANCE;

        if support_test {
            Some(LevelHit {
                event: LevelEvent::Rejection,
                kind: SignalKind::BuyCall,
                level: lv.clone(),
                stop: latest.low,
            })
        } else if resistance_test {
            Some(LevelHit {
                event: LevelEvent::Rejection,
                kind: SignalKind::BuyPut,
                level: lv.clone(),
                stop: latest.high,
            })
        } else {
            None
        }
    })
}

/// Breakout first, then rejection.
pub fn detect(levels: &[Level], prev: &Candle, latest: &Candle) -> Option<LevelHit> {
    check_breakout(levels, prev, latest).or_else(|| check_rejection(levels, latest))
}

pub struct SupportResistanceDetector {
    spec: DetectorSpec,
    levels: Option<Vec<Level>>,
    fired: bool,
}

impl SupportResistanceDetector {
    pub fn new() -> Self {
        Self {
            spec: DetectorSpec {
                name: "Support/Resistance",
                window: TimeWindow::hm(9, 30, 15, 0),
                max_score: 15.0,
            },
            levels: None,
            fired: false,
        }
    }

    async fn previous_day(&self, ctx: &DetectorContext) -> anyhow::Result<Option<Candle>> {
        if let Some(c) = &ctx.classification {
            return Ok(Some(c.previous_day));
        }
        let today = ctx.today();
        let daily = ctx
            .market
            .fetch_candles(&ctx.symbol, Interval::Day, today - Duration::days(10), today - Duration::days(1))
            .await?;
        Ok(daily.into_iter().filter(|c| c.timestamp.date_naive() < today).last())
    }

    async fn run(&mut self, ctx: &DetectorContext) -> anyhow::Result<DetectorResult> {
        if let Some(result) = self.precheck(ctx) {
            return Ok(result);
        }
        let spec = self.spec;

        let candles =
            session_candles(ctx.market.as_ref(), &ctx.symbol, Interval::FiveMinute, ctx.now).await?;
        if candles.len() < 2 {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Candles", "need at least 2 candles today"),
            ));
        }

        // ── 1. Levels, once per session ───────────────────────────────────────
        if self.levels.is_none() {
            let Some(prev_day) = self.previous_day(ctx).await? else {
                return Ok(DetectorResult::idle(
                    spec.name,
                    spec.max_score,
                    Reason::neutral("Levels", "previous day candle not available"),
                ));
            };
            let first = candles[0];
            let levels = build_levels(&prev_day, first.open, first.close);
            debug!(count = levels.len(), "key levels built");
            self.levels = Some(levels);
        }
        let levels = self.levels.as_deref().unwrap_or_default();

        // ── 2. Latest candle against the levels ───────────────────────────────
        let (prev, latest) = (&candles[candles.len() - 2], &candles[candles.len() - 1]);
        let Some(hit) = detect(levels, prev, latest) else {
            return Ok(DetectorResult::rejected(
                spec.name,
                spec.max_score,
                vec![Reason::neutral("Level", "no breakout or rejection at a key level")],
            )
            .with_prices(Some(latest.close), None));
        };

        let (day_pts, day_reason) = day_alignment_bonus(ctx, hit.kind, DAY_BONUS);
        let (trend_pts, trend_reason) = trend_bonus(ctx, hit.kind, TREND_BONUS);
        let label = match hit.event {
            LevelEvent::Breakout => "Breakout",
            LevelEvent::Rejection => "Rejection",
        };
        let reasons = vec![
            Reason::pass(
                label,
                format!("{} {:.2}, close {:.2}", hit.level.name, hit.level.price, latest.close),
            ),
            day_reason,
            trend_reason,
        ];

        self.fired = true;
        info!(direction = %hit.kind, level = %hit.level.name, event = label, "🧱 Key level signal");

        Ok(DetectorResult::fired(spec.name, spec.max_score, hit.kind, BASE_SCORE + day_pts + trend_pts, reasons)
            .with_prices(Some(latest.close), Some(hit.stop))
            .with_data(json!({ "event": hit.event, "level": hit.level })))
    }
}

impl Default for SupportResistanceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for SupportResistanceDetector {
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
        self.levels = None;
        self.fired = false;
    }

    fn state(&self) -> serde_json::Value {
        json!({ "levels": self.levels, "fired": self.fired })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detectors::fixtures::{bar, make_ctx, test_date, trend_day};
    use crate::market::InMemoryMarketData;
    use crate::models::TrendDirection;

    fn make_market(candles: Vec<Candle>) -> InMemoryMarketData {
        InMemoryMarketData::new().with_candles(Interval::FiveMinute, candles)
    }

    #[test]
    fn test_build_levels_contains_pivots_and_rounds() {
        let prev = trend_day(TrendDirection::Bullish).previous_day;
        let levels = build_levels(&prev, 22200.0, 22210.0);
        let price = |name: &str| levels.iter().find(|l| l.name == name).map(|l| l.price);
        assert_eq!(price("Pivot"), Some(22120.0));
        assert_eq!(price("R1"), Some(22250.0));
        assert_eq!(price("S1"), Some(22050.0));
        assert_eq!(price("R2"), Some(22320.0));
        assert_eq!(price("S2"), Some(21920.0));
        assert_eq!(price("Round 22300"), Some(22300.0));
        assert!(levels.windows(2).all(|w| w[0].price <= w[1].price));
    }

    #[tokio::test]
    async fn test_breakout_through_r1() {
        let d = test_date();
        let market = make_market(vec![
            bar(d, 0, 22200.0, 22240.0, 22195.0, 22235.0, 1000.0),
            bar(d, 1, 22235.0, 22262.0, 22230.0, 22258.0, 1000.0),
        ]);
        let mut detector = SupportResistanceDetector::new();
        let ctx = make_ctx(9, 30, Some(trend_day(TrendDirection::Bullish)), market);
        let result = detector.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, Some(SignalKind::BuyCall));
        assert_eq!(result.score, 12.0);
        assert_eq!(result.reasons[0].factor, "Breakout");
        assert!(result.reasons[0].detail.starts_with("R1"));
        assert_eq!(result.stop_loss, Some(22230.0));
    }

    #[tokio::test]
    async fn test_rejection_off_s1() {
        let d = test_date();
        let market = make_market(vec![
            bar(d, 0, 22100.0, 22110.0, 22080.0, 22090.0, 1000.0),
            bar(d, 1, 22070.0, 22082.0, 22052.0, 22080.0, 1000.0),
        ]);
        let mut detector = SupportResistanceDetector::new();
        let ctx = make_ctx(9, 30, Some(trend_day(TrendDirection::Bullish)), market);
        let result = detector.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, Some(SignalKind::BuyCall));
        assert_eq!(result.reasons[0].factor, "Rejection");
        assert_eq!(result.stop_loss, Some(22052.0));
    }

    #[tokio::test]
    async fn test_quiet_candle_no_signal() {
        let d = test_date();
        let market = make_market(vec![
            bar(d, 0, 22150.0, 22160.0, 22140.0, 22155.0, 1000.0),
            bar(d, 1, 22155.0, 22162.0, 22148.0, 22158.0, 1000.0),
        ]);
        let mut detector = SupportResistanceDetector::new();
        let ctx = make_ctx(9, 30, Some(trend_day(TrendDirection::Bullish)), market);
        let result = detector.analyze(&ctx).await.unwrap();
        assert_eq!(result.signal, None);
        assert!(detector.state()["levels"].is_array());
    }
}
