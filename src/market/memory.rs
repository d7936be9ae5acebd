//! # market::memory — In-memory / replay source
//!
//! Holds pre-fetched candles and serves them back through [`MarketData`].
//! With a cutoff set it only exposes candles that had *completed* before
//! the cutoff, which is how the simulation helper replays a past session
//! tick by tick without look-ahead.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, FixedOffset, NaiveDate};
use futures_util::future::{BoxFuture, FutureExt};

use crate::market::{is_completed, MarketData};
use crate::models::{Candle, Interval, OptionChain};

#[derive(Debug, Clone, Default)]
struct Inner {
    candles: HashMap<Interval, Vec<Candle>>,
    option_chain: Option<OptionChain>,
    spot: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    inner: Arc<Inner>,
    cutoff: Option<DateTime<FixedOffset>>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set candles for one interval (sorted oldest first).
    pub fn with_candles(mut self, interval: Interval, mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        Arc::make_mut(&mut self.inner).candles.insert(interval, candles);
        self
    }

    #[cfg(test)]
    pub fn with_option_chain(mut self, chain: OptionChain) -> Self {
        Arc::make_mut(&mut self.inner).option_chain = Some(chain);
        self
    }

    #[cfg(test)]
    pub fn with_spot(mut self, spot: f64) -> Self {
        Arc::make_mut(&mut self.inner).spot = Some(spot);
        self
    }

    /// A cheap view of the same data that hides candles not yet completed
    /// at `cutoff`.
    pub fn at(&self, cutoff: DateTime<FixedOffset>) -> Self {
        Self { inner: Arc::clone(&self.inner), cutoff: Some(cutoff) }
    }

    fn is_visible(&self, candle: &Candle, interval: Interval) -> bool {
        self.cutoff.map_or(true, |cutoff| is_completed(candle, interval, cutoff))
    }

    fn candles_between(&self, interval: Interval, from: NaiveDate, to: NaiveDate) -> Vec<Candle> {
        self.inner
            .candles
            .get(&interval)
            .map(|all| {
                all.iter()
                    .filter(|c| {
                        let d = c.timestamp.date_naive();
                        d >= from && d <= to && self.is_visible(c, interval)
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl MarketData for InMemoryMarketData {
    fn fetch_candles<'a>(
        &'a self,
        _symbol: &'a str,
        interval: Interval,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Candle>>> {
        let candles = self.candles_between(interval, from, to);
        async move { Ok(candles) }.boxed()
    }

    fn fetch_option_chain<'a>(
        &'a self,
        _expiry: Option<NaiveDate>,
    ) -> BoxFuture<'a, anyhow::Result<OptionChain>> {
        let chain = self.inner.option_chain.clone();
        async move { chain.ok_or_else(|| anyhow!("no option chain loaded")) }.boxed()
    }

    fn fetch_spot_price<'a>(&'a self, _symbol: &'a str) -> BoxFuture<'a, anyhow::Result<f64>> {
        let spot = self.inner.spot.or_else(|| {
            self.inner
                .candles
                .get(&Interval::FiveMinute)
                .and_then(|all| all.iter().rev().find(|c| self.is_visible(c, Interval::FiveMinute)))
                .map(|c| c.close)
        });
        async move { spot.ok_or_else(|| anyhow!("no spot price available")) }.boxed()
    }
}
