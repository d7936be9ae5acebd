//! # models::day
//!
//! [`DayClassification`] — the once-per-session verdict on whether the prior
//! completed trading day was an **A-Day** (strong trend day).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::Candle;

// ─── Direction types ──────────────────────────────────────────────────────────

/// Direction of a trend day.  Only reported when the day qualifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Bullish,
    Bearish,
}

/// Three-way bias used by analyzers and intraday trend reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl From<TrendDirection> for Bias {
    fn from(d: TrendDirection) -> Self {
        match d {
            TrendDirection::Bullish => Bias::Bullish,
            TrendDirection::Bearish => Bias::Bearish,
        }
    }
}

// ─── DayClassification ────────────────────────────────────────────────────────

/// Result of classifying the prior completed day.
///
/// `direction` is `Some` only when `is_trend_day` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayClassification {
    /// Session date this classification was computed for (cache key).
    pub session_date: NaiveDate,
    /// Date of the daily candle that was classified.
    pub reference_date: NaiveDate,
    pub is_trend_day: bool,
    pub direction: Option<TrendDirection>,
    pub body_ratio_pct: f64,
    pub range_points: f64,
    pub volume_ratio_pct: f64,
    /// How many prior days fed the average-volume baseline (target 20).
    pub history_days: usize,
    /// `true` when fewer than 20 days of volume history were available.
    pub degraded: bool,
    /// The classified candle itself; later stages read PDH/PDL/PDC from it.
    pub previous_day: Candle,
}

impl DayClassification {
    /// The trend direction, but only if the prior day really was an A-Day.
    pub fn trend(&self) -> Option<TrendDirection> {
        if self.is_trend_day {
            self.direction
        } else {
            None
        }
    }
}
