//! # models::signal
//!
//! Types that flow out of the detectors and through aggregation:
//!
//! ```text
//! Detector ──▶ DetectorResult ──┐
//! Detector ──▶ DetectorResult ──┼──▶ Aggregator ──▶ AggregatedSignal ──▶ Safety ──▶ Delivery
//! Detector ──▶ DetectorResult ──┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::TrendDirection;

// ─── SignalKind ───────────────────────────────────────────────────────────────

/// Directional recommendation.  Never executed, only delivered to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    /// Bullish conviction.
    BuyCall,
    /// Bearish conviction.
    BuyPut,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::BuyCall => "BUY_CALL",
            SignalKind::BuyPut => "BUY_PUT",
        }
    }

    /// The trend direction this signal bets on.
    pub fn trend(&self) -> TrendDirection {
        match self {
            SignalKind::BuyCall => TrendDirection::Bullish,
            SignalKind::BuyPut => TrendDirection::Bearish,
        }
    }

    pub fn aligns_with(&self, trend: TrendDirection) -> bool {
        self.trend() == trend
    }
}

impl From<TrendDirection> for SignalKind {
    fn from(d: TrendDirection) -> Self {
        match d {
            TrendDirection::Bullish => SignalKind::BuyCall,
            TrendDirection::Bearish => SignalKind::BuyPut,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Reason ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasonStatus {
    Pass,
    Neutral,
    Fail,
}

/// One line of explanation attached to a result or a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub factor: String,
    pub status: ReasonStatus,
    pub detail: String,
}

impl Reason {
    pub fn new(factor: impl Into<String>, status: ReasonStatus, detail: impl Into<String>) -> Self {
        Self { factor: factor.into(), status, detail: detail.into() }
    }

    pub fn pass(factor: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(factor, ReasonStatus::Pass, detail)
    }

    pub fn fail(factor: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(factor, ReasonStatus::Fail, detail)
    }

    pub fn neutral(factor: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(factor, ReasonStatus::Neutral, detail)
    }
}

// ─── DetectorResult ───────────────────────────────────────────────────────────

/// Output of one detector for one engine tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorResult {
    pub strategy_name: String,
    pub signal: Option<SignalKind>,
    /// Native score, `0..=max_score`.
    pub score: f64,
    pub max_score: f64,
    pub reasons: Vec<Reason>,
    /// Latest close the detector looked at.
    pub spot_price: Option<f64>,
    pub stop_loss: Option<f64>,
    /// Free-form detector data (levels, ratios …) for dashboards.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl DetectorResult {
    /// A no-signal result carrying one explanatory reason.
    pub fn idle(strategy_name: &str, max_score: f64, reason: Reason) -> Self {
        Self {
            strategy_name: strategy_name.to_string(),
            signal: None,
            score: 0.0,
            max_score,
            reasons: vec![reason],
            spot_price: None,
            stop_loss: None,
            data: serde_json::Value::Null,
        }
    }

    /// A no-signal result with a full reason list (preconditions evaluated).
    pub fn rejected(strategy_name: &str, max_score: f64, reasons: Vec<Reason>) -> Self {
        Self {
            strategy_name: strategy_name.to_string(),
            signal: None,
            score: 0.0,
            max_score,
            reasons,
            spot_price: None,
            stop_loss: None,
            data: serde_json::Value::Null,
        }
    }

    /// A firing result.  The score is clamped to `0..=max_score`.
    pub fn fired(
        strategy_name: &str,
        max_score: f64,
        signal: SignalKind,
        score: f64,
        reasons: Vec<Reason>,
    ) -> Self {
        Self {
            strategy_name: strategy_name.to_string(),
            signal: Some(signal),
            score: score.clamp(0.0, max_score),
            max_score,
            reasons,
            spot_price: None,
            stop_loss: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_prices(mut self, spot: Option<f64>, stop_loss: Option<f64>) -> Self {
        self.spot_price = spot;
        self.stop_loss = stop_loss;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn is_signal(&self) -> bool {
        self.signal.is_some()
    }
}

// ─── AggregatedSignal ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: f64,
    pub max: f64,
}

/// The merged, scored recommendation that may be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSignal {
    pub id: Uuid,
    pub direction: SignalKind,
    pub primary_strategy: String,
    pub contributing_strategies: Vec<String>,
    /// Always within `0..=100`.
    pub confidence_score: f64,
    pub confidence_breakdown: BTreeMap<String, CategoryScore>,
    pub reasons: Vec<Reason>,
    pub spot_price_hint: Option<f64>,
    pub stop_loss_hint: Option<f64>,
    pub timestamp: DateTime<FixedOffset>,
}

impl AggregatedSignal {
    /// Reasons ordered pass → neutral → fail, stable within each group.
    pub fn ranked_reasons(&self) -> Vec<&Reason> {
        let mut ranked: Vec<&Reason> = self.reasons.iter().collect();
        ranked.sort_by_key(|r| r.status);
        ranked
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_kind_wire_format() {
        assert_eq!(serde_json::to_string(&SignalKind::BuyCall).unwrap(), "\"BUY_CALL\"");
        assert_eq!(serde_json::to_string(&SignalKind::BuyPut).unwrap(), "\"BUY_PUT\"");
        assert_eq!(serde_json::to_string(&ReasonStatus::Neutral).unwrap(), "\"neutral\"");
    }

    #[test]
    fn test_fired_score_is_clamped() {
        let r = DetectorResult::fired("ORB Breakout", 15.0, SignalKind::BuyCall, 22.0, vec![]);
        assert_eq!(r.score, 15.0);
        assert!(r.is_signal());
    }

    #[test]
    fn test_signal_alignment() {
        assert!(SignalKind::BuyCall.aligns_with(TrendDirection::Bullish));
        assert!(!SignalKind::BuyPut.aligns_with(TrendDirection::Bullish));
        assert_eq!(SignalKind::from(TrendDirection::Bearish), SignalKind::BuyPut);
    }
}
