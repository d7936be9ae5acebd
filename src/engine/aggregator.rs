//! # engine::aggregator — Signal Aggregator
//!
//! ```text
//! results with a signal
//!     │
//!     ├─ [1] Tally per direction: Σscore, count
//!     ├─ [2] Dominant = max Σscore → max count → BUY_CALL
//!     ├─ [3] Drop everything not in the dominant direction
//!     ├─ [4] Confidence Scorer over the aligned set
//!     └─ [5] Below threshold → no signal this tick
//! ```
//!
//! ต้องมีหลาย detector เห็นตรงกันถึงจะผ่าน ไม่เชื่อ detector ตัวเดียว

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::analyzers::AnalyzerSnapshot;
use crate::engine::scorer::{ConfidenceScore, ConfidenceScorer};
use crate::error::SignalError;
use crate::models::{AggregatedSignal, DayClassification, DetectorResult, Reason, ReasonStatus, SignalKind};

// ─── Tally ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DirectionTally {
    pub score: f64,
    pub count: usize,
}

/// Pick the dominant direction.  `None` when nothing fired.
pub fn choose_direction(results: &[DetectorResult]) -> Option<SignalKind> {
    let mut call = DirectionTally::default();
    let mut put = DirectionTally::default();
    for r in results {
        let tally = match r.signal {
            Some(SignalKind::BuyCall) => &mut call,
            Some(SignalKind::BuyPut) => &mut put,
            None => continue,
        };
        tally.score += r.score;
        tally.count += 1;
    }

    if call.count == 0 && put.count == 0 {
        return None;
    }
    let direction = if put.score > call.score {
        SignalKind::BuyPut
    } else if call.score > put.score {
        SignalKind::BuyCall
    } else if put.count > call.count {
        SignalKind::BuyPut
    } else {
        // tie on score and count
        SignalKind::BuyCall
    };
    debug!(?call, ?put, chosen = %direction, "direction tally");
    Some(direction)
}

/// Keep the first occurrence of every (factor, status) pair.
pub fn dedupe_reasons(reasons: Vec<Reason>) -> Vec<Reason> {
    let mut seen: HashSet<(String, ReasonStatus)> = HashSet::new();
    reasons
        .into_iter()
        .filter(|r| seen.insert((r.factor.clone(), r.status)))
        .collect()
}

// ─── Outcome ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Aggregation {
    /// No detector fired this tick.
    NoSignals,
    /// A direction was chosen but confidence fell short.
    BelowThreshold { direction: SignalKind, score: ConfidenceScore },
    Signal(AggregatedSignal),
}

#[cfg(test)]
impl Aggregation {
    pub fn into_signal(self) -> Option<AggregatedSignal> {
        match self {
            Aggregation::Signal(s) => Some(s),
            _ => None,
        }
    }
}

// ─── Aggregator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SignalAggregator {
    scorer: ConfidenceScorer,
}

impl SignalAggregator {
    pub fn new(scorer: ConfidenceScorer) -> Self {
        Self { scorer }
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    /// Merge one tick's results.  Malformed input (non-finite scores) is an
    /// error for the whole tick.
    pub fn aggregate(
        &self,
        results: &[DetectorResult],
        classification: Option<&DayClassification>,
        analyzers: &AnalyzerSnapshot,
        now: DateTime<FixedOffset>,
    ) -> Result<Aggregation, SignalError> {
        if let Some(bad) = results.iter().find(|r| !r.score.is_finite() || !r.max_score.is_finite()) {
            return Err(SignalError::Computation {
                strategy: bad.strategy_name.clone(),
                message: format!("non-finite score {} / {}", bad.score, bad.max_score),
            });
        }

        let Some(direction) = choose_direction(results) else {
            return Ok(Aggregation::NoSignals);
        };
        let aligned: Vec<DetectorResult> =
            results.iter().filter(|r| r.signal == Some(direction)).cloned().collect();

        let score = self.scorer.score(direction, &aligned, classification, analyzers);
        if !score.meets_threshold {
            info!(
                direction = %direction,
                score = score.total,
                min = self.scorer.min_confidence(),
                "🔕 Confidence below threshold, no signal"
            );
            return Ok(Aggregation::BelowThreshold { direction, score });
        }

        // Highest native score; first registered wins a tie.
        let primary = aligned
            .iter()
            .reduce(|best, r| if r.score > best.score { r } else { best })
            .ok_or_else(|| SignalError::Computation {
                strategy: "aggregator".into(),
                message: "aligned set empty after direction choice".into(),
            })?;

        let signal = AggregatedSignal {
            id: Uuid::new_v4(),
            direction,
            primary_strategy: primary.strategy_name.clone(),
            contributing_strategies: aligned.iter().map(|r| r.strategy_name.clone()).collect(),
            confidence_score: score.total,
            confidence_breakdown: score.breakdown,
            reasons: dedupe_reasons(score.reasons),
            spot_price_hint: primary.spot_price.or_else(|| aligned.iter().find_map(|r| r.spot_price)),
            stop_loss_hint: primary.stop_loss,
            timestamp: now,
        };
        info!(
            direction = %signal.direction,
            confidence = signal.confidence_score,
            primary = %signal.primary_strategy,
            contributors = signal.contributing_strategies.len(),
            "🎯 Aggregated signal"
        );
        Ok(Aggregation::Signal(signal))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detectors::fixtures::{make_ctx, trend_day};
    use crate::engine::scorer::ScorerConfig;
    use crate::market::InMemoryMarketData;
    use crate::models::TrendDirection;

    fn make_result(name: &str, kind: SignalKind, score: f64) -> DetectorResult {
        DetectorResult::fired(
            name,
            20.0,
            kind,
            score,
            vec![
                Reason::pass(format!("{name} trigger"), "fired"),
                Reason::pass("Day Alignment", "matches prior A-Day"),
            ],
        )
        .with_prices(Some(22000.0), Some(21950.0))
    }

    fn make_aggregator(min: f64) -> SignalAggregator {
        SignalAggregator::new(ConfidenceScorer::new(ScorerConfig { min_confidence: min, ..ScorerConfig::default() }))
    }

    fn now() -> DateTime<FixedOffset> {
        make_ctx(10, 0, None, InMemoryMarketData::new()).now
    }

    #[test]
    fn test_summed_score_beats_count() {
        let results = vec![
            make_result("A", SignalKind::BuyCall, 8.0),
            make_result("B", SignalKind::BuyCall, 5.0),
            make_result("C", SignalKind::BuyPut, 20.0),
        ];
        assert_eq!(choose_direction(&results), Some(SignalKind::BuyPut));

        let bear = trend_day(TrendDirection::Bearish);
        let agg = make_aggregator(0.0)
            .aggregate(&results, Some(&bear), &AnalyzerSnapshot::default(), now())
            .unwrap()
            .into_signal()
            .unwrap();
        assert_eq!(agg.direction, SignalKind::BuyPut);
        assert_eq!(agg.contributing_strategies, vec!["C".to_string()]);
        assert!(!agg.confidence_breakdown.contains_key("A"));
    }

    #[test]
    fn test_tie_breaks() {
        let by_count = vec![
            make_result("A", SignalKind::BuyPut, 5.0),
            make_result("B", SignalKind::BuyPut, 5.0),
            make_result("C", SignalKind::BuyCall, 10.0),
        ];
        assert_eq!(choose_direction(&by_count), Some(SignalKind::BuyPut));

        let full_tie = vec![
            make_result("A", SignalKind::BuyPut, 10.0),
            make_result("B", SignalKind::BuyCall, 10.0),
        ];
        assert_eq!(choose_direction(&full_tie), Some(SignalKind::BuyCall));
        assert_eq!(choose_direction(&[]), None);
    }

    #[test]
    fn test_below_threshold_emits_nothing() {
        // day 20 + 15 + 10 = 45 < 60
        let results = vec![
            make_result("A", SignalKind::BuyCall, 15.0),
            make_result("B", SignalKind::BuyCall, 10.0),
        ];
        let bull = trend_day(TrendDirection::Bullish);
        let outcome = make_aggregator(60.0)
            .aggregate(&results, Some(&bull), &AnalyzerSnapshot::default(), now())
            .unwrap();
        match outcome {
            Aggregation::BelowThreshold { score, .. } => assert_eq!(score.total, 45.0),
            other => panic!("expected BelowThreshold, got {other:?}"),
        }
    }

    #[test]
    fn test_primary_and_reason_dedupe() {
        let results = vec![
            make_result("A", SignalKind::BuyCall, 12.0),
            make_result("B", SignalKind::BuyCall, 18.0),
            make_result("C", SignalKind::BuyCall, 15.0),
        ];
        let bull = trend_day(TrendDirection::Bullish);
        let agg = make_aggregator(60.0)
            .aggregate(&results, Some(&bull), &AnalyzerSnapshot::default(), now())
            .unwrap()
            .into_signal()
            .unwrap();
        assert_eq!(agg.primary_strategy, "B");
        assert_eq!(agg.confidence_score, 65.0);
        let day_pass = agg
            .reasons
            .iter()
            .filter(|r| r.factor == "Day Alignment" && r.status == ReasonStatus::Pass)
            .count();
        assert_eq!(day_pass, 1);
        assert_eq!(agg.stop_loss_hint, Some(21950.0));
    }

    #[test]
    fn test_confidence_never_exceeds_100() {
        let results: Vec<_> =
            (0..10).map(|i| make_result(&format!("D{i}"), SignalKind::BuyPut, 20.0)).collect();
        let bear = trend_day(TrendDirection::Bearish);
        let agg = make_aggregator(60.0)
            .aggregate(&results, Some(&bear), &AnalyzerSnapshot::default(), now())
            .unwrap()
            .into_signal()
            .unwrap();
        assert!(agg.confidence_score <= 100.0);
        assert_eq!(agg.confidence_score, 100.0);
    }

    #[test]
    fn test_non_finite_score_fails_the_tick() {
        let mut bad = make_result("A", SignalKind::BuyCall, 5.0);
        bad.score = f64::NAN;
        let err = make_aggregator(60.0)
            .aggregate(&[bad], None, &AnalyzerSnapshot::default(), now())
            .unwrap_err();
        assert!(matches!(err, SignalError::Computation { .. }));
    }
}
