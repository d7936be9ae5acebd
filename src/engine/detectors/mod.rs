//! # engine::detectors
//!
//! The six independent pattern detectors and the capability set they share.
//!
//! A detector is a plain struct: a [`DetectorSpec`] (name, fixed daily
//! window, max score) plus its own day-scoped state.  The Strategy Engine
//! owns one instance of each and hands every `analyze` call a shared,
//! read-only [`DetectorContext`]; detectors never touch each other's state.
//!
//! | Detector                 | Window        | Max |
//! |--------------------------|---------------|-----|
//! | ORB Breakout             | 09:30–11:00   | 15  |
//! | Pullback Continuation    | 10:15–14:30   | 15  |
//! | Expiry Momentum          | 09:30–15:00 * | 15  |
//! | VWAP Crossover           | 09:45–15:00   | 15  |
//! | Support/Resistance       | 09:30–15:00   | 15  |
//! | Day Behavior             | 09:45–14:00   | 10  |
//!
//! `*` expiry weekday only.

pub mod day_behavior;
pub mod expiry;
pub mod orb;
pub mod pullback;
pub mod support_resistance;
pub mod vwap;

use chrono::{DateTime, FixedOffset, NaiveDate, Weekday};
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::engine::analyzers::AnalyzerSnapshot;
use crate::market::SharedMarket;
use crate::models::{Bias, DayClassification, DetectorResult, Reason, SignalKind, TrendDirection};
use crate::session::TimeWindow;

pub use day_behavior::DayBehaviorDetector;
pub use expiry::ExpiryMomentumDetector;
pub use orb::OrbDetector;
pub use pullback::PullbackDetector;
pub use support_resistance::SupportResistanceDetector;
pub use vwap::VwapDetector;

// ─── Spec & Context ───────────────────────────────────────────────────────────

/// Static identity of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectorSpec {
    pub name: &'static str,
    pub window: TimeWindow,
    pub max_score: f64,
}

/// Read-only inputs shared by every detector in one tick.
#[derive(Clone)]
pub struct DetectorContext {
    pub now: DateTime<FixedOffset>,
    pub symbol: String,
    pub classification: Option<DayClassification>,
    pub analyzers: AnalyzerSnapshot,
    pub market: SharedMarket,
}

impl DetectorContext {
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Prior-day trend direction, only if it was an A-Day.
    pub fn day_trend(&self) -> Option<TrendDirection> {
        self.classification.as_ref().and_then(|c| c.trend())
    }
}

// ─── Capability set ───────────────────────────────────────────────────────────

pub trait Detector: Send + Sync {
    fn spec(&self) -> &DetectorSpec;

    /// Inside the detector's window right now.
    fn is_active(&self, now: DateTime<FixedOffset>) -> bool {
        self.spec().window.contains(now.time())
    }

    /// Already produced its one signal for today.
    fn has_fired(&self) -> bool;

    fn analyze<'a>(
        &'a mut self,
        ctx: &'a DetectorContext,
    ) -> BoxFuture<'a, anyhow::Result<DetectorResult>>;

    /// Clear all day-scoped state.
    fn reset(&mut self);

    /// Day-scoped state for the status endpoint.
    fn state(&self) -> serde_json::Value;

    /// Standard early-outs every detector applies before looking at data.
    fn precheck(&self, ctx: &DetectorContext) -> Option<DetectorResult> {
        let spec = self.spec();
        if !self.is_active(ctx.now) {
            return Some(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Time Window", format!("outside {}", spec.window)),
            ));
        }
        if self.has_fired() {
            return Some(DetectorResult::idle(
                spec.name,
                spec.max_score,
                Reason::neutral("Already Signaled", "one signal per session"),
            ));
        }
        None
    }
}

/// The six detectors in their default configuration.
pub fn default_registry(expiry_weekday: Weekday) -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(OrbDetector::new()),
        Box::new(PullbackDetector::new()),
        Box::new(ExpiryMomentumDetector::new(expiry_weekday)),
        Box::new(VwapDetector::new()),
        Box::new(SupportResistanceDetector::new()),
        Box::new(DayBehaviorDetector::new()),
    ]
}

// ─── Shared scoring helpers ───────────────────────────────────────────────────

/// Bonus for agreeing with the prior A-Day direction.
pub(crate) fn day_alignment_bonus(
    ctx: &DetectorContext,
    kind: SignalKind,
    points: f64,
) -> (f64, Reason) {
    match ctx.day_trend() {
        Some(trend) if kind.aligns_with(trend) => (
            points,
            Reason::pass("Day Alignment", format!("matches prior {trend:?} A-Day")),
        ),
        Some(trend) => (
            0.0,
            Reason::fail("Day Alignment", format!("against prior {trend:?} A-Day")),
        ),
        None => (0.0, Reason::neutral("Day Alignment", "prior day was not a trend day")),
    }
}

/// Bonus for agreeing with the 15-min trend analyzer.
pub(crate) fn trend_bonus(ctx: &DetectorContext, kind: SignalKind, points: f64) -> (f64, Reason) {
    match ctx.analyzers.trend_bias() {
        Bias::Neutral => (0.0, Reason::neutral("Trend", "no clear 15-min trend")),
        bias if bias == Bias::from(kind.trend()) => {
            (points, Reason::pass("Trend", format!("15-min trend {bias:?}")))
        }
        bias => (0.0, Reason::fail("Trend", format!("15-min trend {bias:?}"))),
    }
}

/// Bonus when the volume analyzer reports a spike.
pub(crate) fn volume_bonus(ctx: &DetectorContext, points: f64) -> (f64, Reason) {
    match ctx.analyzers.volume {
        Some(v) if v.is_spike => {
            (points, Reason::pass("Volume Spike", format!("{:.2}× average", v.ratio)))
        }
        Some(v) => (0.0, Reason::neutral("Volume Spike", format!("{:.2}× average", v.ratio))),
        None => (0.0, Reason::neutral("Volume Spike", "no volume read")),
    }
}

// ─── Test fixtures ────────────────────────────────────────────────────────────
