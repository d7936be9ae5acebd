//! # engine::indicators
//!
//! Small, allocation-light indicator helpers shared by detectors and
//! analyzers.  All inputs are oldest-first candle slices.

use crate::models::Candle;

/// EMA series over closes, one value per candle.
///
/// Seeded with the SMA of the first `period` closes; before that the
/// series carries the running SMA so early candles still have a value.
pub fn ema_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if candles.is_empty() || period == 0 {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(candles.len());
    let mut sum = 0.0;
    let mut ema = 0.0;

    for (i, c) in candles.iter().enumerate() {
        if i < period {
            sum += c.close;
            ema = sum / (i + 1) as f64;
        } else {
            ema = (c.close - ema) * multiplier + ema;
        }
        out.push(ema);
    }
    out
}

/// Cumulative session VWAP after each candle:
/// `Σ(typical × volume) / Σ volume`.  Falls back to the typical price while
/// no volume has printed.
pub fn vwap_series(candles: &[Candle]) -> Vec<f64> {
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;
    candles
        .iter()
        .map(|c| {
            let tp = c.typical_price();
            cum_pv += tp * c.volume;
            cum_vol += c.volume;
            if cum_vol > 0.0 {
                cum_pv / cum_vol
            } else {
                tp
            }
        })
        .collect()
}

/// Mean volume, `None` for an empty slice.
pub fn average_volume(candles: &[Candle]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    Some(candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64)
}

// ─── Pivots ───────────────────────────────────────────────────────────────────

/// Classic floor pivots from the prior day's H/L/C.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Pivots {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

impl Pivots {
    pub fn from_hlc(high: f64, low: f64, close: f64) -> Self {
        let pivot = (high + low + close) / 3.0;
        let range = high - low;
        Self {
            pivot,
            r1: 2.0 * pivot - low,
            r2: pivot + range,
            r3: high + 2.0 * (pivot - low),
            s1: 2.0 * pivot - high,
            s2: pivot - range,
            s3: low - 2.0 * (high - pivot),
        }
    }
}

/// Round-number levels (multiples of `step`) bracketing `price`:
/// two below and two above.
pub fn round_levels(price: f64, step: f64) -> [f64; 4] {
    let below = (price / step).floor() * step;
    [below - step, below, below + step, below + 2.0 * step]
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{at, hm};
    use chrono::NaiveDate;

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let ts = at(d, hm(9, 15)) + chrono::Duration::minutes(5 * i as i64);
                Candle::new(ts, c, c + 1.0, c - 1.0, c, 100.0)
            })
            .collect()
    }

    #[test]
    fn test_ema_constant_series() {
        let candles = make_candles(&[100.0; 30]);
        let e = *ema_series(&candles, 20).last().unwrap();
        assert!((e - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_short_input_is_running_mean() {
        let candles = make_candles(&[100.0, 102.0, 104.0, 106.0, 108.0]);
        let series = ema_series(&candles, 20);
        assert_eq!(series.len(), 5);
        assert!((series[4] - 104.0).abs() < 1e-9);
    }

    #[test]
    fn test_vwap_weights_by_volume() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let t = at(d, hm(9, 15));
        let candles = vec![
            Candle::new(t, 100.0, 100.0, 100.0, 100.0, 100.0),
            Candle::new(t, 200.0, 200.0, 200.0, 200.0, 300.0),
        ];
        let v = vwap_series(&candles);
        assert_eq!(v[0], 100.0);
        assert!((v[1] - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_pivots_formula() {
        let p = Pivots::from_hlc(110.0, 90.0, 100.0);
        assert_eq!(p.pivot, 100.0);
        assert_eq!(p.r1, 110.0);
        assert_eq!(p.r2, 120.0);
        assert_eq!(p.s1, 90.0);
        assert_eq!(p.s2, 80.0);
    }

    #[test]
    fn test_round_levels() {
        assert_eq!(round_levels(22_345.0, 100.0), [22_200.0, 22_300.0, 22_400.0, 22_500.0]);
    }
}
