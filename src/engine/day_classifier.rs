//! # engine::day_classifier
//!
//! **Day Classifier** — decides once per session whether the prior completed
//! day was an **A-Day** (strong trend day).
//!
//! ## Criteria (ต้องผ่านครบทั้ง 3 ข้อ)
//!
//! ```text
//! bodyRatio = |close − open| / (high − low)   ≥ 0.60
//! range     =  high − low                     ≥ 100 pts
//! volume    /  avg(volume, prior 20 days)     ≥ 1.0×
//! ```
//!
//! Direction (BULLISH/BEARISH) is only reported when all three hold.
//! The verdict is cached for the calendar day it was computed for.

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::error::SignalError;
use crate::market::MarketData;
use crate::models::{Candle, DayClassification, Interval, TrendDirection};

pub const MIN_BODY_RATIO: f64 = 0.60;
pub const MIN_RANGE_POINTS: f64 = 100.0;
pub const MIN_VOLUME_RATIO: f64 = 1.0;
/// Trading days that make up the average-volume baseline.
pub const VOLUME_LOOKBACK_DAYS: usize = 20;
/// Calendar days fetched to cover the baseline plus weekends and holidays.
const FETCH_CALENDAR_DAYS: i64 = 35;

// ─── Pure classification ──────────────────────────────────────────────────────

/// Classify `previous` against the mean volume of (up to) the last 20
/// candles in `history`.  `history` must not contain `previous` itself.
pub fn classify_candle(
    session_date: NaiveDate,
    previous: &Candle,
    history: &[Candle],
) -> DayClassification {
    let baseline = &history[history.len().saturating_sub(VOLUME_LOOKBACK_DAYS)..];
    let history_days = baseline.len();
    let avg_volume = if history_days > 0 {
        baseline.iter().map(|c| c.volume).sum::<f64>() / history_days as f64
    } else {
        0.0
    };

    let body_ratio = previous.body_ratio();
    let range = previous.range();
    let volume_ratio = if avg_volume > 0.0 { previous.volume / avg_volume } else { 0.0 };

    let is_trend_day =
        body_ratio >= MIN_BODY_RATIO && range >= MIN_RANGE_POINTS && volume_ratio >= MIN_VOLUME_RATIO;

    let direction = if is_trend_day {
        Some(if previous.close > previous.open {
            TrendDirection::Bullish
        } else {
            TrendDirection::Bearish
        })
    } else {
        None
    };

    DayClassification {
        session_date,
        reference_date: previous.timestamp.date_naive(),
        is_trend_day,
        direction,
        body_ratio_pct: body_ratio * 100.0,
        range_points: range,
        volume_ratio_pct: volume_ratio * 100.0,
        history_days,
        degraded: history_days < VOLUME_LOOKBACK_DAYS,
        previous_day: *previous,
    }
}

// ─── Cached classifier ────────────────────────────────────────────────────────

/// Holds the per-day cache.  Owned by the pipeline; reset at session start.
#[derive(Debug)]
pub struct DayClassifier {
    symbol: String,
    cache: Option<DayClassification>,
    computations: u64,
}

impl DayClassifier {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), cache: None, computations: 0 }
    }

    /// Classify the last completed day before `today`.  Returns the cached
    /// value when one exists for `today`.
    pub async fn classify(
        &mut self,
        market: &dyn MarketData,
        today: NaiveDate,
    ) -> Result<DayClassification, SignalError> {
        if let Some(cached) = self.cache.as_ref().filter(|c| c.session_date == today) {
            debug!(%today, "day classification served from cache");
            return Ok(cached.clone());
        }

        let from = today - Duration::days(FETCH_CALENDAR_DAYS);
        let to = today - Duration::days(1);
        let mut daily = market
            .fetch_candles(&self.symbol, Interval::Day, from, to)
            .await
            .map_err(|e| SignalError::Upstream(format!("{e:#}")))?;
        daily.retain(|c| c.timestamp.date_naive() < today);

        let (previous, history) = daily
            .split_last()
            .ok_or_else(|| SignalError::DataUnavailable(format!("no daily candles before {today}")))?;

        if history.len() < VOLUME_LOOKBACK_DAYS {
            warn!(
                available = history.len(),
                required = VOLUME_LOOKBACK_DAYS,
                "⚠️ Day classifier running on partial volume history — degraded confidence"
            );
        }

        let result = classify_candle(today, previous, history);
        self.computations += 1;

        info!(
            reference   = %result.reference_date,
            trend_day   = result.is_trend_day,
            direction   = ?result.direction,
            body_pct    = result.body_ratio_pct,
            range       = result.range_points,
            volume_pct  = result.volume_ratio_pct,
            "📅 Day classified"
        );

        self.cache = Some(result.clone());
        Ok(result)
    }

    pub fn cached(&self) -> Option<&DayClassification> {
        self.cache.as_ref()
    }

    /// Drop the cache; the next `classify` recomputes.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// How many real (non-cached) computations have run.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::InMemoryMarketData;
    use crate::session::{at, hm, is_trading_day};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_daily(date: NaiveDate, o: f64, h: f64, l: f64, c: f64, v: f64) -> Candle {
        Candle::new(at(date, hm(9, 15)), o, h, l, c, v)
    }

    /// `n` flat history days with volume 1000 ending the day before `last`.
    fn make_history(last: NaiveDate, n: usize) -> Vec<Candle> {
        let mut out = Vec::new();
        let mut d = last;
        while out.len() < n {
            d -= Duration::days(1);
            if is_trading_day(d) {
                out.push(make_daily(d, 18000.0, 18050.0, 17950.0, 18010.0, 1000.0));
            }
        }
        out.reverse();
        out
    }

    #[test]
    fn test_trend_day_scenario() {
        let prev_date = day(2024, 3, 4);
        let prev = make_daily(prev_date, 18000.0, 18150.0, 17980.0, 18130.0, 2000.0);
        let result = classify_candle(day(2024, 3, 5), &prev, &make_history(prev_date, 20));

        assert!(result.is_trend_day);
        assert_eq!(result.direction, Some(TrendDirection::Bullish));
        assert!((result.body_ratio_pct - 130.0 / 170.0 * 100.0).abs() < 1e-6);
        assert_eq!(result.range_points, 170.0);
        assert!((result.volume_ratio_pct - 200.0).abs() < 1e-6);
        assert!(!result.degraded);
    }

    #[test]
    fn test_zero_range_is_never_trend_day() {
        let prev_date = day(2024, 3, 4);
        let prev = make_daily(prev_date, 18000.0, 18000.0, 18000.0, 18000.0, 5000.0);
        let result = classify_candle(day(2024, 3, 5), &prev, &make_history(prev_date, 20));

        assert_eq!(result.body_ratio_pct, 0.0);
        assert!(!result.is_trend_day);
        assert_eq!(result.direction, None);
    }

    #[test]
    fn test_low_volume_blocks_direction() {
        let prev_date = day(2024, 3, 4);
        let prev = make_daily(prev_date, 18130.0, 18150.0, 17980.0, 18000.0, 900.0);
        let result = classify_candle(day(2024, 3, 5), &prev, &make_history(prev_date, 20));

        assert!(!result.is_trend_day);
        assert_eq!(result.direction, None);
        assert!(result.body_ratio_pct >= 60.0);
    }

    #[test]
    fn test_partial_history_is_degraded_not_failed() {
        let prev_date = day(2024, 3, 4);
        let prev = make_daily(prev_date, 18130.0, 18150.0, 17980.0, 18000.0, 2000.0);
        let result = classify_candle(day(2024, 3, 5), &prev, &make_history(prev_date, 8));

        assert!(result.degraded);
        assert_eq!(result.history_days, 8);
        assert!(result.is_trend_day);
        assert_eq!(result.direction, Some(TrendDirection::Bearish));
    }

    #[tokio::test]
    async fn test_classify_is_cached_per_day() {
        let prev_date = day(2024, 3, 4);
        let mut daily = make_history(prev_date, 22);
        daily.push(make_daily(prev_date, 18000.0, 18150.0, 17980.0, 18130.0, 2000.0));
        let market = InMemoryMarketData::new().with_candles(Interval::Day, daily);

        let mut classifier = DayClassifier::new("NIFTY 50");
        let first = classifier.classify(&market, day(2024, 3, 5)).await.unwrap();
        let second = classifier.classify(&market, day(2024, 3, 5)).await.unwrap();

        assert_eq!(classifier.computations(), 1);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );

        classifier.classify(&market, day(2024, 3, 6)).await.unwrap();
        assert_eq!(classifier.computations(), 2);
    }

    #[tokio::test]
    async fn test_classify_without_data_is_unavailable() {
        let market = InMemoryMarketData::new();
        let mut classifier = DayClassifier::new("NIFTY 50");
        let err = classifier.classify(&market, day(2024, 3, 5)).await.unwrap_err();
        assert!(matches!(err, SignalError::DataUnavailable(_)));
    }
}
