//! # engine::analyzers
//!
//! Ancillary market reads shared (read-only) by every detector in a tick and
//! by the Confidence Scorer:
//!
//! * **Volume spike** — latest 5-min volume vs the session's earlier bars
//! * **Trend**        — 15-min close vs EMA(20) and its slope
//! * **Open interest** — PCR, max pain, ATM OI build-up
//!
//! Each read is fetched concurrently once per tick.  A failed read leaves its
//! slot `None`; detectors and the scorer treat that as "no evidence".

use chrono::{DateTime, Duration, FixedOffset};
use serde::Serialize;
use tracing::warn;

use crate::engine::indicators::ema_series;
use crate::market::{is_completed, session_candles, MarketData};
use crate::models::{Bias, Candle, Interval, OptionChain, OptionQuote, SignalKind};

/// Latest/average volume ratio at which volume counts as a spike.
pub const SPIKE_RATIO: f64 = 1.5;
/// PCR at or above this favours calls.
pub const PCR_BULLISH: f64 = 1.0;
/// PCR at or below this favours puts.
pub const PCR_BEARISH: f64 = 0.8;

const TREND_EMA_PERIOD: usize = 20;
const TREND_SLOPE_BARS: usize = 3;
const VOLUME_LOOKBACK_BARS: usize = 20;

// ─── Snapshots ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeSpike {
    pub latest_volume: f64,
    pub average_volume: f64,
    pub ratio: f64,
    pub is_spike: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendRead {
    pub bias: Bias,
    pub close: f64,
    pub ema: f64,
    pub slope: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OiSnapshot {
    pub pcr: f64,
    pub max_pain: f64,
    pub spot: f64,
    pub atm_strike: f64,
    pub atm_ce_oi_change: f64,
    pub atm_pe_oi_change: f64,
}

impl OiSnapshot {
    /// PCR skew in the signal's favour.
    pub fn pcr_supports(&self, kind: SignalKind) -> bool {
        match kind {
            SignalKind::BuyCall => self.pcr >= PCR_BULLISH,
            SignalKind::BuyPut => self.pcr <= PCR_BEARISH,
        }
    }

    /// Spot trades within `band_pct` percent of max pain.
    pub fn max_pain_near(&self, band_pct: f64) -> bool {
        self.spot > 0.0 && (self.spot - self.max_pain).abs() <= self.spot * band_pct / 100.0
    }

    /// Writers adding puts (support) for calls, adding calls (resistance)
    /// for puts.
    pub fn buildup_supports(&self, kind: SignalKind) -> bool {
        match kind {
            SignalKind::BuyCall => {
                self.atm_pe_oi_change > 0.0 && self.atm_pe_oi_change > self.atm_ce_oi_change
            }
            SignalKind::BuyPut => {
                self.atm_ce_oi_change > 0.0 && self.atm_ce_oi_change > self.atm_pe_oi_change
            }
        }
    }
}

/// Everything the analyzers produced for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyzerSnapshot {
    pub volume: Option<VolumeSpike>,
    pub trend: Option<TrendRead>,
    pub oi: Option<OiSnapshot>,
}

impl AnalyzerSnapshot {
    pub fn trend_bias(&self) -> Bias {
        self.trend.map(|t| t.bias).unwrap_or(Bias::Neutral)
    }
}

// ─── Pure reads ───────────────────────────────────────────────────────────────

/// Latest bar vs the mean of up to 20 earlier bars.
pub fn volume_spike(candles: &[Candle]) -> Option<VolumeSpike> {
    let (latest, earlier) = candles.split_last()?;
    let window = &earlier[earlier.len().saturating_sub(VOLUME_LOOKBACK_BARS)..];
    if window.is_empty() {
        return None;
    }
    let average_volume = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
    if average_volume <= 0.0 {
        return None;
    }
    let ratio = latest.volume / average_volume;
    Some(VolumeSpike {
        latest_volume: latest.volume,
        average_volume,
        ratio,
        is_spike: ratio >= SPIKE_RATIO,
    })
}

pub fn trend_read(candles: &[Candle]) -> Option<TrendRead> {
    if candles.len() < TREND_SLOPE_BARS + 1 {
        return None;
    }
    let series = ema_series(candles, TREND_EMA_PERIOD.min(candles.len()));
    let last = *series.last()?;
    let earlier = series[series.len() - 1 - TREND_SLOPE_BARS];
    let close = candles.last()?.close;
    let slope = last - earlier;

    let bias = if close > last && slope > 0.0 {
        Bias::Bullish
    } else if close < last && slope < 0.0 {
        Bias::Bearish
    } else {
        Bias::Neutral
    };
    Some(TrendRead { bias, close, ema: last, slope })
}

/// Strike minimising the total payout option writers owe at expiry.
pub fn max_pain(chain: &OptionChain) -> Option<f64> {
    chain
        .strikes()
        .into_iter()
        .map(|expiry_price| {
            let call_pain: f64 = chain
                .ce
                .iter()
                .map(|q| (expiry_price - q.strike).max(0.0) * q.open_interest)
                .sum();
            let put_pain: f64 = chain
                .pe
                .iter()
                .map(|q| (q.strike - expiry_price).max(0.0) * q.open_interest)
                .sum();
            (expiry_price, call_pain + put_pain)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(strike, _)| strike)
}

pub fn oi_snapshot(chain: &OptionChain, spot: f64) -> Option<OiSnapshot> {
    let total_ce: f64 = chain.ce.iter().map(|q| q.open_interest).sum();
    let total_pe: f64 = chain.pe.iter().map(|q| q.open_interest).sum();
    if total_ce <= 0.0 {
        return None;
    }

    let atm_strike = chain
        .strikes()
        .into_iter()
        .min_by(|a, b| (a - spot).abs().total_cmp(&(b - spot).abs()))?;
    let change_at = |side: &[OptionQuote]| {
        side.iter()
            .filter(|q| q.strike == atm_strike)
            .map(|q| q.oi_change)
            .sum::<f64>()
    };

    Some(OiSnapshot {
        pcr: total_pe / total_ce,
        max_pain: max_pain(chain)?,
        spot,
        atm_strike,
        atm_ce_oi_change: change_at(chain.ce.as_slice()),
        atm_pe_oi_change: change_at(chain.pe.as_slice()),
    })
}

// ─── Collection ───────────────────────────────────────────────────────────────

/// Fetch and compute every analyzer read for `now`, concurrently.
pub async fn collect(
    market: &dyn MarketData,
    symbol: &str,
    now: DateTime<FixedOffset>,
) -> AnalyzerSnapshot {
    let today = now.date_naive();

    let (five, fifteen, chain, spot) = tokio::join!(
        session_candles(market, symbol, Interval::FiveMinute, now),
        market.fetch_candles(symbol, Interval::FifteenMinute, today - Duration::days(7), today),
        market.fetch_option_chain(None),
        market.fetch_spot_price(symbol),
    );

    let five = five
        .map_err(|e| warn!(error = %e, "volume analyzer: candle fetch failed"))
        .ok();
    let volume = five.as_deref().and_then(volume_spike);

    let trend = fifteen
        .map_err(|e| warn!(error = %e, "trend analyzer: candle fetch failed"))
        .ok()
        .map(|c| {
            c.into_iter()
                .filter(|bar| is_completed(bar, Interval::FifteenMinute, now))
                .collect::<Vec<_>>()
        })
        .and_then(|c| trend_read(&c));

    // ราคา spot จาก bridge ก่อน ไม่มีก็ใช้ close ล่าสุด
    let spot = spot
        .ok()
        .or_else(|| five.as_deref().and_then(|c| c.last()).map(|c| c.close));
    let oi = match (chain, spot) {
        (Ok(chain), Some(spot)) if !chain.is_empty() => oi_snapshot(&chain, spot),
        (Err(e), _) => {
            warn!(error = %e, "OI analyzer: option chain unavailable");
            None
        }
        _ => None,
    };

    AnalyzerSnapshot { volume, trend, oi }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
