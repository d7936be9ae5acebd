//! # engine::strategy_engine — Detector registry + concurrent evaluation
//!
//! ```text
//! tick ──▶ filter is_active(now) ──▶ join_all(analyze + timeout) ──▶ Vec<DetectorResult>
//! ```
//!
//! Failure isolation: an `Err` or a timeout from one detector becomes a
//! single fail-reason result for that detector only.  Siblings keep running
//! and the tick continues.
//!
//! Reset is day-stamped — calling [`StrategyEngine::reset_for_session`] twice
//! on the same date clears state only once.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Weekday};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::env_or;
use crate::engine::detectors::{default_registry, Detector, DetectorContext};
use crate::error::SignalError;
use crate::models::{DetectorResult, Reason};
use crate::session::parse_weekday;

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// งบเวลาต่อ detector ต่อ tick
    pub detector_timeout: Duration,
    /// วันหมดอายุสัญญารายสัปดาห์
    pub expiry_weekday: Weekday,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, SignalError> {
        let expiry_weekday = match std::env::var("EXPIRY_WEEKDAY") {
            Ok(raw) => parse_weekday(&raw).ok_or_else(|| {
                SignalError::ConfigurationInvalid(format!("EXPIRY_WEEKDAY '{raw}' is not a weekday"))
            })?,
            Err(_) => Weekday::Thu,
        };
        Ok(Self {
            detector_timeout: Duration::from_secs(env_or("DETECTOR_TIMEOUT_SECS", 20)),
            expiry_weekday,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { detector_timeout: Duration::from_secs(20), expiry_weekday: Weekday::Thu }
    }
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DetectorStatus {
    pub name: &'static str,
    pub window: String,
    pub max_score: f64,
    pub active: bool,
    pub fired: bool,
    pub state: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub session_date: Option<NaiveDate>,
    pub detectors: Vec<DetectorStatus>,
}

// ─── Engine ───────────────────────────────────────────────────────────────────

pub struct StrategyEngine {
    detectors: Vec<Box<dyn Detector>>,
    config: EngineConfig,
    session_date: Option<NaiveDate>,
}

impl StrategyEngine {
    pub fn new(config: EngineConfig) -> Self {
        let detectors = default_registry(config.expiry_weekday);
        Self::with_detectors(config, detectors)
    }

    pub fn with_detectors(config: EngineConfig, detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors, config, session_date: None }
    }

    /// Reset every detector once for `date`.  Returns `false` when the
    /// engine was already reset for that date.
    pub fn reset_for_session(&mut self, date: NaiveDate) -> bool {
        if self.session_date == Some(date) {
            debug!(%date, "engine already reset for this session");
            return false;
        }
        for detector in self.detectors.iter_mut() {
            detector.reset();
        }
        self.session_date = Some(date);
        info!(%date, detectors = self.detectors.len(), "🔄 Strategy engine reset");
        true
    }

    /// Run every detector whose window contains `ctx.now`, concurrently.
    pub async fn evaluate(&mut self, ctx: &DetectorContext) -> Vec<DetectorResult> {
        let budget = self.config.detector_timeout;
        let now = ctx.now;

        let runs = self
            .detectors
            .iter_mut()
            .filter(|d| d.is_active(now))
            .map(|detector| run_isolated(detector.as_mut(), ctx, budget));

        let results = join_all(runs).await;
        debug!(
            evaluated = results.len(),
            signals = results.iter().filter(|r| r.is_signal()).count(),
            "engine tick evaluated"
        );
        results
    }

    pub fn status(&self, now: DateTime<FixedOffset>) -> EngineStatus {
        EngineStatus {
            session_date: self.session_date,
            detectors: self
                .detectors
                .iter()
                .map(|d| {
                    let spec = d.spec();
                    DetectorStatus {
                        name: spec.name,
                        window: spec.window.to_string(),
                        max_score: spec.max_score,
                        active: d.is_active(now),
                        fired: d.has_fired(),
                        state: d.state(),
                    }
                })
                .collect(),
        }
    }
}

/// analyze() with a timeout; any failure becomes a fail-reason result.
async fn run_isolated(
    detector: &mut dyn Detector,
    ctx: &DetectorContext,
    budget: Duration,
) -> DetectorResult {
    let spec = *detector.spec();

    let err = match tokio::time::timeout(budget, detector.analyze(ctx)).await {
        Ok(Ok(result)) => return result,
        Ok(Err(e)) => SignalError::Computation {
            strategy: spec.name.to_string(),
            message: format!("{e:#}"),
        },
        Err(_) => SignalError::Timeout { strategy: spec.name.to_string(), secs: budget.as_secs() },
    };

    warn!(strategy = spec.name, error = %err, "⚠️ Detector failed, isolated");
    DetectorResult::rejected(spec.name, spec.max_score, vec![Reason::fail("Error", err.to_string())])
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detectors::fixtures::make_ctx;
    use crate::engine::detectors::DetectorSpec;
    use crate::market::InMemoryMarketData;
    use crate::models::{ReasonStatus, SignalKind};
    use crate::session::TimeWindow;
    use futures_util::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Fire(SignalKind, f64),
        Fail,
        Hang,
    }

    struct StubDetector {
        spec: DetectorSpec,
        behaviour: Behaviour,
        resets: Arc<AtomicUsize>,
    }

    impl StubDetector {
        fn make(name: &'static str, window: TimeWindow, behaviour: Behaviour) -> Self {
            Self {
                spec: DetectorSpec { name, window, max_score: 15.0 },
                behaviour,
                resets: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Detector for StubDetector {
        fn spec(&self) -> &DetectorSpec {
            &self.spec
        }

        fn has_fired(&self) -> bool {
            false
        }

        fn analyze<'a>(
            &'a mut self,
            _ctx: &'a DetectorContext,
        ) -> BoxFuture<'a, anyhow::Result<DetectorResult>> {
            async move {
                match self.behaviour {
                    Behaviour::Fire(kind, score) => {
                        Ok(DetectorResult::fired(self.spec.name, 15.0, kind, score, vec![]))
                    }
                    Behaviour::Fail => Err(anyhow::anyhow!("boom")),
                    Behaviour::Hang => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(DetectorResult::idle(self.spec.name, 15.0, Reason::neutral("x", "x")))
                    }
                }
            }
            .boxed()
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn state(&self) -> serde_json::Value {
            serde_json::Value::Null
        }
    }

    fn make_engine(detectors: Vec<Box<dyn Detector>>) -> StrategyEngine {
        let config = EngineConfig { detector_timeout: Duration::from_millis(50), ..Default::default() };
        StrategyEngine::with_detectors(config, detectors)
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let all_day = TimeWindow::hm(9, 15, 15, 30);
        let mut engine = make_engine(vec![
            Box::new(StubDetector::make("Good", all_day, Behaviour::Fire(SignalKind::BuyCall, 10.0))),
            Box::new(StubDetector::make("Broken", all_day, Behaviour::Fail)),
            Box::new(StubDetector::make("Stuck", all_day, Behaviour::Hang)),
        ]);
        let ctx = make_ctx(10, 0, None, InMemoryMarketData::new());
        let results = engine.evaluate(&ctx).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].signal, Some(SignalKind::BuyCall));
        for failed in &results[1..] {
            assert_eq!(failed.signal, None);
            assert_eq!(failed.reasons.len(), 1);
            assert_eq!(failed.reasons[0].status, ReasonStatus::Fail);
        }
        assert!(results[2].reasons[0].detail.contains("timed out"));
    }

    #[tokio::test]
    async fn test_only_active_detectors_run() {
        let mut engine = make_engine(vec![
            Box::new(StubDetector::make(
                "Morning",
                TimeWindow::hm(9, 30, 11, 0),
                Behaviour::Fire(SignalKind::BuyPut, 8.0),
            )),
            Box::new(StubDetector::make(
                "Afternoon",
                TimeWindow::hm(13, 0, 15, 0),
                Behaviour::Fire(SignalKind::BuyCall, 8.0),
            )),
        ]);
        let results = engine.evaluate(&make_ctx(10, 0, None, InMemoryMarketData::new())).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].strategy_name, "Morning");

        let status = engine.status(make_ctx(10, 0, None, InMemoryMarketData::new()).now);
        assert!(status.detectors[0].active);
        assert!(!status.detectors[1].active);
    }

    #[test]
    fn test_reset_is_idempotent_per_day() {
        let stub = StubDetector::make("S", TimeWindow::hm(9, 15, 15, 30), Behaviour::Fail);
        let counter = Arc::clone(&stub.resets);
        let mut engine = make_engine(vec![Box::new(stub)]);

        let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert!(engine.reset_for_session(day));
        assert!(!engine.reset_for_session(day));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(engine.reset_for_session(day.succ_opt().unwrap()));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_registry_has_six() {
        let engine = StrategyEngine::new(EngineConfig::default());
        let now = make_ctx(10, 0, None, InMemoryMarketData::new()).now;
        let names: Vec<_> = engine.status(now).detectors.iter().map(|d| d.name).collect();
        assert_eq!(names.len(), 6);
        assert!(names.contains(&"ORB Breakout"));
        assert!(names.contains(&"Day Behavior"));
    }
}
