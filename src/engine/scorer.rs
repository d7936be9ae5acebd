//! # engine::scorer — Confidence Scorer
//!
//! Turns the aligned detector results plus the analyzer snapshot into one
//! 0–100 number with a per-category breakdown.
//!
//! | Category         | Max          | Source                                   |
//! |------------------|--------------|------------------------------------------|
//! | `day_alignment`  | 20           | prior A-Day direction                    |
//! | `<detector>`     | detector max | each aligned detector's native score     |
//! | `open_interest`  | 15           | PCR skew 5 · near max pain 5 · build-up 5 |
//! | `volume`         | 15           | spike ratio tiers 2.0 / 1.5 / 1.0        |
//! | `greeks`         | 10           | not evaluated, always 0                  |
//!
//! Each category is capped on its own; the total is clamped to 100.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::env_or;
use crate::engine::analyzers::AnalyzerSnapshot;
use crate::models::{CategoryScore, DayClassification, DetectorResult, Reason, SignalKind};

pub const DAY_ALIGNMENT_MAX: f64 = 20.0;
pub const OPEN_INTEREST_MAX: f64 = 15.0;
pub const VOLUME_MAX: f64 = 15.0;
pub const GREEKS_MAX: f64 = 10.0;
pub const TOTAL_MAX: f64 = 100.0;

const OI_COMPONENT: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// คะแนนขั้นต่ำที่ยอมให้ส่งสัญญาณ
    pub min_confidence: f64,
    /// Spot within this percent of max pain earns the max-pain points.
    pub max_pain_band_pct: f64,
}

impl ScorerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            min_confidence: env_or("MIN_CONFIDENCE", default.min_confidence),
            max_pain_band_pct: env_or("MAX_PAIN_BAND_PCT", default.max_pain_band_pct),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self { min_confidence: 60.0, max_pain_band_pct: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceScore {
    pub total: f64,
    pub breakdown: BTreeMap<String, CategoryScore>,
    pub meets_threshold: bool,
    pub reasons: Vec<Reason>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ScorerConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn min_confidence(&self) -> f64 {
        self.config.min_confidence
    }

    pub fn score(
        &self,
        direction: SignalKind,
        aligned: &[DetectorResult],
        classification: Option<&DayClassification>,
        analyzers: &AnalyzerSnapshot,
    ) -> ConfidenceScore {
        let mut breakdown = BTreeMap::new();
        let mut reasons = Vec::new();

        let (day, mut day_reasons) = day_alignment(direction, classification);
        breakdown.insert("day_alignment".to_string(), CategoryScore { score: day, max: DAY_ALIGNMENT_MAX });
        reasons.append(&mut day_reasons);

        for result in aligned {
            let score = result.score.clamp(0.0, result.max_score);
            breakdown.insert(
                result.strategy_name.clone(),
                CategoryScore { score, max: result.max_score },
            );
            reasons.extend(result.reasons.iter().cloned());
        }

        let (oi, mut oi_reasons) = open_interest(direction, analyzers, self.config.max_pain_band_pct);
        breakdown.insert("open_interest".to_string(), CategoryScore { score: oi, max: OPEN_INTEREST_MAX });
        reasons.append(&mut oi_reasons);

        let (vol, vol_reason) = volume(analyzers);
        breakdown.insert("volume".to_string(), CategoryScore { score: vol, max: VOLUME_MAX });
        reasons.push(vol_reason);

        // Greeks are not computed; the category stays visible at zero.
        breakdown.insert("greeks".to_string(), CategoryScore { score: 0.0, max: GREEKS_MAX });
        reasons.push(Reason::neutral("Greeks", "not evaluated"));

        let raw: f64 = breakdown.values().map(|c| c.score.min(c.max)).sum();
        let total = raw.clamp(0.0, TOTAL_MAX);

        ConfidenceScore {
            total,
            breakdown,
            meets_threshold: total >= self.config.min_confidence,
            reasons,
        }
    }
}

// ─── Categories ───────────────────────────────────────────────────────────────

fn day_alignment(
    direction: SignalKind,
    classification: Option<&DayClassification>,
) -> (f64, Vec<Reason>) {
    let Some((c, trend)) = classification.and_then(|c| c.trend().map(|t| (c, t))) else {
        return (0.0, vec![Reason::neutral("Day Alignment", "prior day was not a trend day")]);
    };

    let (mut score, first) = if direction.aligns_with(trend) {
        (DAY_ALIGNMENT_MAX, Reason::pass("Day Alignment", format!("with prior {trend:?} A-Day")))
    } else {
        (
            DAY_ALIGNMENT_MAX / 2.0,
            Reason::fail("Day Alignment", format!("against prior {trend:?} A-Day, half credit")),
        )
    };
    let mut reasons = vec![first];
    if c.degraded {
        score /= 2.0;
        reasons.push(Reason::neutral(
            "Data Quality",
            format!("only {} days of volume history, day alignment halved", c.history_days),
        ));
    }
    (score, reasons)
}

fn open_interest(direction: SignalKind, analyzers: &AnalyzerSnapshot, band_pct: f64) -> (f64, Vec<Reason>) {
    let Some(oi) = analyzers.oi else {
        return (0.0, vec![Reason::neutral("Open Interest", "option chain unavailable")]);
    };
    let mut score = 0.0;
    let mut reasons = Vec::with_capacity(3);

    if oi.pcr_supports(direction) {
        score += OI_COMPONENT;
        reasons.push(Reason::pass("PCR", format!("{:.2} favours {direction}", oi.pcr)));
    } else {
        reasons.push(Reason::neutral("PCR", format!("{:.2}", oi.pcr)));
    }
    let detail = format!("{:.0} vs spot {:.2} (band {band_pct}%)", oi.max_pain, oi.spot);
    if oi.max_pain_near(band_pct) {
        score += OI_COMPONENT;
        reasons.push(Reason::pass("Max Pain", detail));
    } else {
        reasons.push(Reason::neutral("Max Pain", detail));
    }
    if oi.buildup_supports(direction) {
        score += OI_COMPONENT;
        reasons.push(Reason::pass("OI Build-up", format!("at ATM {:.0}", oi.atm_strike)));
    } else {
        reasons.push(Reason::neutral("OI Build-up", format!("none at ATM {:.0}", oi.atm_strike)));
    }
    (score.min(OPEN_INTEREST_MAX), reasons)
}

/// 2.0× → 100%, 1.5× → 70%, 1.0× → 30%.
fn volume(analyzers: &AnalyzerSnapshot) -> (f64, Reason) {
    let Some(v) = analyzers.volume else {
        return (0.0, Reason::neutral("Volume Ratio", "no volume read"));
    };
    let share = match v.ratio {
        r if r >= 2.0 => 1.0,
        r if r >= 1.5 => 0.7,
        r if r >= 1.0 => 0.3,
        _ => 0.0,
    };
    let detail = format!("{:.2}× average", v.ratio);
    let reason = if share >= 0.7 {
        Reason::pass("Volume Ratio", detail)
    } else if share > 0.0 {
        Reason::neutral("Volume Ratio", detail)
    } else {
        Reason::fail("Volume Ratio", detail)
    };
    (VOLUME_MAX * share, reason)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
