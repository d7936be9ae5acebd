//! # detectors::expiry — Expiry-Day Momentum
//!
//! Active only on the weekly-expiry weekday.  Looks at the three most recent
//! 5-min candles and requires, **all at once**:
//!
//! 1. average volume ≥ 1.5× the 5-day average 5-min volume
//! 2. all three candles closing the same way (all bullish / all bearish)
//! 3. net move across the three ≥ 50 points
//!
//! Stop = the extreme of those three candles.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Weekday};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::engine::detectors::{day_alignment_bonus, Detector, DetectorContext, DetectorSpec};
use crate::engine::indicators::average_volume;
use crate::market::session_candles;
use crate::models::{Candle, DetectorResult, Interval, Reason, SignalKind};
use crate::session::TimeWindow;

pub const VOLUME_MULTIPLIER: f64 = 1.5;
pub const MIN_MOVE_POINTS: f64 = 50.0;
const BASELINE_DAYS: usize = 5;
const STRONG_VOLUME_MULTIPLIER: f64 = 2.0;

const BASE_SCORE: f64 = 10.0;
const STRONG_VOLUME_BONUS: f64 = 3.0;
const DAY_BONUS: f64 = 2.0;

/// Pure evaluation of the last three candles against the baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumCheck {
    pub signal: Option<SignalKind>,
    pub volume_ratio: f64,
    pub net_move: f64,
    pub stop: f64,
    pub reasons: Vec<Reason>,
}

pub fn check_momentum(last_three: &[Candle], baseline_volume: f64) -> Option<MomentumCheck> {
    if last_three.len() != 3 || baseline_volume <= 0.0 {
        return None;
    }
    let avg = average_volume(last_three)?;
    let volume_ratio = avg / baseline_volume;
    let volume_ok = volume_ratio >= VOLUME_MULTIPLIER;

    let all_bull = last_three.iter().all(Candle::is_bullish);
    let all_bear = last_three.iter().all(Candle::is_bearish);

    let net_move = last_three[2].close - last_three[0].open;
    let move_ok = (all_bull && net_move >= MIN_MOVE_POINTS) || (all_bear && net_move <= -MIN_MOVE_POINTS);

    let mut reasons = Vec::with_capacity(3);
    reasons.push(if volume_ok {
        Reason::pass("Volume", format!("{volume_ratio:.2}× the 5-day baseline"))
    } else {
        Reason::fail(
            "Volume",
            format!("{volume_ratio:.2}× baseline, needs {VOLUME_MULTIPLIER:.1}×"),
        )
    });
    reasons.push(if all_bull || all_bear {
        Reason::pass("Direction", if all_bull { "3 bullish candles" } else { "3 bearish candles" })
    } else {
        Reason::fail("Direction", "mixed candle directions")
    });
    reasons.push(if move_ok {
        Reason::pass("Move", format!("{net_move:+.1} pts over 3 candles"))
    } else {
        Reason::fail("Move", format!("{net_move:+.1} pts, needs {MIN_MOVE_POINTS:.0}"))
    });

    let signal = match (volume_ok, move_ok, all_bull) {
        (true, true, true) => Some(SignalKind::BuyCall),
        (true, true, false) => Some(SignalKind::BuyPut),
        _ => None,
    };
    let stop = if all_bull {
        last_three.iter().map(|c| c.low).fold(f64::MAX, f64::min)
    } else {
        last_three.iter().map(|c| c.high).fold(f64::MIN, f64::max)
    };

    Some(MomentumCheck { signal, volume_ratio, net_move, stop, reasons })
}

pub struct ExpiryMomentumDetector {
    spec: DetectorSpec,
    expiry_weekday: Weekday,
    baseline_volume: Option<f64>,
    fired: bool,
}

impl ExpiryMomentumDetector {
    pub fn new(expiry_weekday: Weekday) -> Self {
        Self {
            spec: DetectorSpec {
                name: "Expiry Momentum",
                window: TimeWindow::hm(9, 30, 15, 0),
                max_score: 15.0,
            },
            expiry_weekday,
            baseline_volume: None,
            fired: false,
        }
    }

    /// Average 5-min volume over the last five sessions before today.
    async fn load_baseline(&mut self, ctx: &DetectorContext) -> anyhow::Result<Option<f64>> {
        if let Some(b) = self.baseline_volume {
            return Ok(Some(b));
        }
        let today = ctx.today();
        let history = ctx
            .market
            .fetch_candles(&ctx.symbol, Interval::FiveMinute, today - Duration::days(10), today - Duration::days(1))
            .await?;

        let dates: BTreeSet<_> = history.iter().map(|c| c.timestamp.date_naive()).collect();
        let recent: BTreeSet<_> = dates.into_iter().rev().take(BASELINE_DAYS).collect();
        let window: Vec<Candle> = history
            .into_iter()
            .filter(|c| recent.contains(&c.timestamp.date_naive()))
            .collect();

        if recent.len() < BASELINE_DAYS {
            warn!(days = recent.len(), "expiry baseline built from fewer than 5 sessions");
        }
        self.baseline_volume = average_volume(&window).filter(|v| *v > 0.0);
        debug!(baseline = ?self.baseline_volume, "expiry volume baseline");
        Ok(self.baseline_volume)
    }

    async fn run(&mut self, ctx: &DetectorContext) -> anyhow::Result<DetectorResult> {
        let spec = self.spec;
        if ctx.today().weekday() != self.expiry_weekday {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Expiry Day", format!("expiry is {:?}", self.expiry_weekday)),
            ));
        }
        if let Some(result) = self.precheck(ctx) {
            return Ok(result);
        }

        let Some(baseline) = self.load_baseline(ctx).await? else {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Baseline", "no 5-day volume history"),
            ));
        };

        let candles =
            session_candles(ctx.market.as_ref(), &ctx.symbol, Interval::FiveMinute, ctx.now).await?;
        if candles.len() < 3 {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Candles", "fewer than 3 candles today"),
            ));
        }
        let last_three = &candles[candles.len() - 3..];
        let close = last_three[2].close;

        let Some(check) = check_momentum(last_three, baseline) else {
            return Ok(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Baseline", "zero baseline volume"),
            ));
        };
        let data = json!({
            "baseline_volume": baseline,
            "volume_ratio": check.volume_ratio,
            "net_move": check.net_move,
        });

        let Some(kind) = check.signal else {
            return Ok(DetectorResult::rejected(spec.name, spec.max_score, check.reasons)
                .with_prices(Some(close), None)
                .with_data(data));
        };

        let mut reasons = check.reasons;
        let mut score = BASE_SCORE;
        if check.volume_ratio >= STRONG_VOLUME_MULTIPLIER {
            score += STRONG_VOLUME_BONUS;
            reasons.push(Reason::pass("Strong Volume", format!("≥{STRONG_VOLUME_MULTIPLIER:.1}× baseline")));
        }
        let (day_pts, day_reason) = day_alignment_bonus(ctx, kind, DAY_BONUS);
        score += day_pts;
        reasons.push(day_reason);

        self.fired = true;
        info!(direction = %kind, close, net_move = check.net_move, "⚡ Expiry momentum");

        Ok(DetectorResult::fired(spec.name, spec.max_score, kind, score, reasons)
            .with_prices(Some(close), Some(check.stop))
            .with_data(data))
    }
}

impl Detector for ExpiryMomentumDetector {
    fn spec(&self) -> &DetectorSpec {
        &self.spec
    }

    fn is_active(&self, now: DateTime<FixedOffset>) -> bool {
        now.weekday() == self.expiry_weekday && self.spec.window.contains(now.time())
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
        self.baseline_volume = None;
        self.fired = false;
    }

    fn state(&self) -> serde_json::Value {
        json!({
            "expiry_weekday": format!("{:?}", self.expiry_weekday),
            "baseline_volume": self.baseline_volume,
            "fired": self.fired,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
