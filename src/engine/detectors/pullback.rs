//! # detectors::pullback — Pullback Continuation
//!
//! 1. **First-hour trend** — first 12 five-minute candles.  Net change beyond
//!    30% of the first-hour range sets BULLISH/BEARISH; anything else is
//!    NEUTRAL and switches the detector off for the day.
//! 2. **Pullback** — a candle touching EMA(20) within 0.2% after the trend
//!    leg starts the pullback; its extreme is tracked.
//! 3. **Continuation** — a later candle closing back beyond the pre-pullback
//!    swing extreme, with its own body pointing the trend's way, fires.
//!    Stop = pullback extreme.

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::engine::detectors::{
    day_alignment_bonus, trend_bonus, Detector, DetectorContext, DetectorSpec,
};
use crate::engine::indicators::ema_series;
use crate::market::session_candles;
use crate::models::{Bias, Candle, DetectorResult, Interval, Reason, SignalKind};
use crate::session::TimeWindow;

pub const FIRST_HOUR_CANDLES: usize = 12;
const TREND_THRESHOLD: f64 = 0.30;
const EMA_PERIOD: usize = 20;
const EMA_TOUCH_PCT: f64 = 0.002;

const BASE_SCORE: f64 = 10.0;
const DAY_BONUS: f64 = 3.0;
const TREND_BONUS: f64 = 2.0;

/// First-hour bias from the first 12 candles.
pub fn first_hour_trend(candles: &[Candle]) -> Option<Bias> {
    let first_hour = candles.get(..FIRST_HOUR_CANDLES)?;
    let open = first_hour.first()?.open;
    let close = first_hour.last()?.close;
    let high = first_hour.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = first_hour.iter().map(|c| c.low).fold(f64::MAX, f64::min);

    let net = close - open;
    let threshold = TREND_THRESHOLD * (high - low);
    Some(if net > threshold {
        Bias::Bullish
    } else if net < -threshold {
        Bias::Bearish
    } else {
        Bias::Neutral
    })
}

/// Candle touches the EMA: its pullback-side extreme is within 0.2% of it
/// (or through it).
fn touches_ema(candle: &Candle, ema: f64, trend: Bias) -> bool {
    match trend {
        Bias::Bullish => candle.low <= ema * (1.0 + EMA_TOUCH_PCT),
        Bias::Bearish => candle.high >= ema * (1.0 - EMA_TOUCH_PCT),
        Bias::Neutral => false,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct PullbackState {
    trend: Option<Bias>,
    /// Highest high (bull) / lowest low (bear) of the leg before the pullback.
    swing_extreme: Option<f64>,
    /// Lowest low (bull) / highest high (bear) while pulling back.
    pullback_extreme: Option<f64>,
    processed: usize,
    fired: bool,
}

pub struct PullbackDetector {
    spec: DetectorSpec,
    state: PullbackState,
}

/// Outcome of feeding new candles through the state machine.
#[derive(Debug, PartialEq)]
pub enum PullbackEvent {
    /// Continuation on the latest candle: `(direction, close, stop)`.
    Continuation(SignalKind, f64, f64),
    Waiting,
}

impl PullbackDetector {
    pub fn new() -> Self {
        Self {
            spec: DetectorSpec {
                name: "Pullback Continuation",
                window: TimeWindow::hm(10, 15, 14, 30),
                max_score: 15.0,
            },
            state: PullbackState::default(),
        }
    }

    /// Advance the state machine over candles not yet processed.
    /// Only a continuation on the **latest** candle produces an event; a
    /// breakout on an older candle was missed and restarts the leg.
    pub fn advance(&mut self, candles: &[Candle]) -> PullbackEvent {
        let Some(trend) = self.state.trend else {
            return PullbackEvent::Waiting;
        };
        let ema = ema_series(candles, EMA_PERIOD);
        let start = self.state.processed.max(FIRST_HOUR_CANDLES);
        let last_index = candles.len().saturating_sub(1);
        let bullish = trend == Bias::Bullish;

        for i in start..candles.len() {
            let c = &candles[i];
            let swing = self.state.swing_extreme.unwrap_or(if bullish { c.high } else { c.low });

            match self.state.pullback_extreme {
                None => {
                    if touches_ema(c, ema[i], trend) {
                        debug!(index = i, ema = ema[i], "pullback to EMA started");
                        self.state.pullback_extreme = Some(if bullish { c.low } else { c.high });
                    } else {
                        self.state.swing_extreme =
                            Some(if bullish { swing.max(c.high) } else { swing.min(c.low) });
                    }
                }
                Some(extreme) => {
                    let resumed = if bullish {
                        c.close > swing && c.is_bullish()
                    } else {
                        c.close < swing && c.is_bearish()
                    };

                    if resumed && i == last_index {
                        self.state.processed = candles.len();
                        let kind = if bullish { SignalKind::BuyCall } else { SignalKind::BuyPut };
                        return PullbackEvent::Continuation(kind, c.close, extreme);
                    }
                    if resumed {
                        debug!(index = i, "continuation on a stale candle — leg restarted");
                        self.state.pullback_extreme = None;
                        self.state.swing_extreme = Some(if bullish { c.high } else { c.low });
                    } else {
                        self.state.pullback_extreme =
                            Some(if bullish { extreme.min(c.low) } else { extreme.max(c.high) });
                    }
                }
            }
        }

        self.state.processed = candles.len();
        PullbackEvent::Waiting
    }

    /// Determine the first-hour trend and seed the swing extreme.
    fn establish_trend(&mut self, candles: &[Candle]) -> Option<Bias> {
        if let Some(trend) = self.state.trend {
            return Some(trend);
        }
        let trend = first_hour_trend(candles)?;
        let first_hour = &candles[..FIRST_HOUR_CANDLES];
        self.state.swing_extreme = match trend {
            Bias::Bullish => Some(first_hour.iter().map(|c| c.high).fold(f64::MIN, f64::max)),
            Bias::Bearish => Some(first_hour.iter().map(|c| c.low).fold(f64::MAX, f64::min)),
            Bias::Neutral => None,
        };
        self.state.trend = Some(trend);
        info!(trend = ?trend, "first-hour trend established");
        Some(trend)
    }

    async fn run(&mut self, ctx: &DetectorContext) -> anyhow::Result<DetectorResult> {
        if let Some(result) = self.precheck(ctx) {
            return Ok(result);
        }
        let spec = self.spec;

        let candles =
            session_candles(ctx.market.as_ref(), &ctx.symbol, Interval::FiveMinute, ctx.now).await?;

        let Some(trend) = self.establish_trend(&candles) else {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral(
                    "First Hour",
                    format!("{}/{} candles available", candles.len(), FIRST_HOUR_CANDLES),
                ),
            ));
        };
        if trend == Bias::Neutral {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::fail("First Hour Trend", "neutral first hour — disabled for today"),
            ));
        }

        match self.advance(&candles) {
            PullbackEvent::Waiting => Ok(DetectorResult::rejected(
                spec.name,
                spec.max_score,
                vec![
                    Reason::pass("First Hour Trend", format!("{trend:?}")),
                    Reason::neutral(
                        "Pullback",
                        match self.state.pullback_extreme {
                            Some(x) => format!("pullback in progress, extreme {x:.2}"),
                            None => "waiting for EMA(20) touch".to_string(),
                        },
                    ),
                ],
            )
            .with_data(self.state())),
            PullbackEvent::Continuation(kind, close, stop) => {
                let (day_pts, day_reason) = day_alignment_bonus(ctx, kind, DAY_BONUS);
                let (trend_pts, trend_reason) = trend_bonus(ctx, kind, TREND_BONUS);
                let reasons = vec![
                    Reason::pass("First Hour Trend", format!("{trend:?}")),
                    Reason::pass(
                        "Continuation",
                        format!("close {close:.2} broke the pre-pullback swing"),
                    ),
                    day_reason,
                    trend_reason,
                ];
                self.state.fired = true;
                info!(direction = %kind, close, stop, "📈 Pullback continuation");

                Ok(DetectorResult::fired(
                    spec.name,
                    spec.max_score,
                    kind,
                    BASE_SCORE + day_pts + trend_pts,
                    reasons,
                )
                .with_prices(Some(close), Some(stop))
                .with_data(self.state()))
            }
        }
    }
}

impl Default for PullbackDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for PullbackDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn has_fired(&self) -> bool {
        self.state.fired
    }

    fn analyze<'a>(
        &'a mut self,
        ctx: &'a DetectorContext,
    ) -> BoxFuture<'a, anyhow::Result<DetectorResult>> {
        self.run(ctx).boxed()
    }

    fn reset(&mut self) {
        self.state = PullbackState::default();
    }

    fn state(&self) -> serde_json::Value {
        json!(self.state)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detectors::fixtures::{bar, make_ctx, test_date};
    use crate::market::InMemoryMarketData;

    /// First hour rallies 100 → 160 in steady steps.
    fn make_first_hour() -> Vec<Candle> {
        let d = test_date();
        (0..12)
            .map(|i| {
                let o = 100.0 + i as f64 * 5.0;
                bar(d, i, o, o + 6.0, o - 1.0, o + 5.0, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_first_hour_trend_classification() {
        assert_eq!(first_hour_trend(&make_first_hour()), Some(Bias::Bullish));

        let d = test_date();
        let flat: Vec<Candle> =
            (0..12).map(|i| bar(d, i, 100.0, 105.0, 95.0, 100.5, 1000.0)).collect();
        assert_eq!(first_hour_trend(&flat), Some(Bias::Neutral));
        assert_eq!(first_hour_trend(&flat[..5]), None);
    }

    #[test]
    fn test_pullback_then_continuation_fires() {
        let d = test_date();
        let mut candles = make_first_hour();
        // swing high after the first hour = 161
        candles.push(bar(d, 12, 158.0, 159.0, 130.0, 135.0, 900.0)); // dips to the EMA
        candles.push(bar(d, 13, 135.0, 140.0, 128.0, 138.0, 900.0)); // pullback low 128

        let mut detector = PullbackDetector::new();
        assert_eq!(detector.establish_trend(&candles), Some(Bias::Bullish));
        assert_eq!(detector.advance(&candles), PullbackEvent::Waiting);
        assert_eq!(detector.state.pullback_extreme, Some(128.0));

        candles.push(bar(d, 14, 150.0, 165.0, 149.0, 163.0, 1500.0));
        assert_eq!(
            detector.advance(&candles),
            PullbackEvent::Continuation(SignalKind::BuyCall, 163.0, 128.0)
        );
    }

    #[tokio::test]
    async fn test_neutral_first_hour_disables_detector() {
        let d = test_date();
        let flat: Vec<Candle> =
            (0..14).map(|i| bar(d, i, 100.0, 105.0, 95.0, 100.5, 1000.0)).collect();
        let market = InMemoryMarketData::new().with_candles(Interval::FiveMinute, flat);
        let mut detector = PullbackDetector::new();

        let result = detector.analyze(&make_ctx(10, 30, None, market)).await.unwrap();
        assert_eq!(result.signal, None);
        assert_eq!(result.reasons[0].factor, "First Hour Trend");
    }
}
