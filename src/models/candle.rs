//! # models::candle
//!
//! Defines [`Candle`] — one OHLCV bar as supplied by the market-data bridge.
//!
//! Candles are immutable once fetched.  Every detector works from slices of
//! them in chronological order (oldest first), so the helpers here are all
//! cheap `&self` accessors.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// ─── Interval ─────────────────────────────────────────────────────────────────

/// Candle granularity understood by the market-data bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "5minute")]
    FiveMinute,
    #[serde(rename = "15minute")]
    FifteenMinute,
    #[serde(rename = "day")]
    Day,
}

impl Interval {
    /// Wire name used in bridge query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::FiveMinute => "5minute",
            Interval::FifteenMinute => "15minute",
            Interval::Day => "day",
        }
    }

    /// Bar length in minutes (a trading day counts as the full session).
    pub fn minutes(&self) -> i64 {
        match self {
            Interval::FiveMinute => 5,
            Interval::FifteenMinute => 15,
            Interval::Day => 375,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Candle ───────────────────────────────────────────────────────────────────

/// A single OHLCV bar.  `timestamp` is the bar's *open* time in IST.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<FixedOffset>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }

    /// `high − low`
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// `|close − open|`
    #[inline]
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Body as a fraction of the range.  A zero-range bar has ratio 0.
    pub fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range <= 0.0 {
            return 0.0;
        }
        self.body() / range
    }

    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    #[inline]
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// `(high + low + close) / 3`, the VWAP input price.
    #[inline]
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ist;
    use chrono::TimeZone;

    fn make_candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        let ts = ist().with_ymd_and_hms(2024, 3, 5, 9, 15, 0).unwrap();
        Candle::new(ts, open, high, low, close, 1000.0)
    }

    #[test]
    fn test_body_ratio_zero_range() {
        let c = make_candle(100.0, 100.0, 100.0, 100.0);
        assert_eq!(c.range(), 0.0);
        assert_eq!(c.body_ratio(), 0.0);
    }

    #[test]
    fn test_body_ratio_and_direction() {
        let c = make_candle(18000.0, 18150.0, 17980.0, 18130.0);
        assert!((c.body_ratio() - 130.0 / 170.0).abs() < 1e-9);
        assert!(c.is_bullish());
        assert!(!c.is_bearish());
    }

    #[test]
    fn test_interval_wire_names() {
        assert_eq!(Interval::FiveMinute.as_str(), "5minute");
        assert_eq!(
            serde_json::to_string(&Interval::FifteenMinute).unwrap(),
            "\"15minute\""
        );
    }
}
