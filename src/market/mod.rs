//! # market — Market-data collaborators
//!
//! The core never talks to a broker directly.  It consumes three
//! capabilities through [`MarketData`]:
//!
//! | Capability            | Used by                                   |
//! |-----------------------|-------------------------------------------|
//! | `fetch_candles`       | Day Classifier, every detector, analyzers |
//! | `fetch_option_chain`  | Open-interest analyzer                    |
//! | `fetch_spot_price`    | Pipeline fallback for the spot hint       |
//!
//! Candles must come back oldest first.  An empty `Vec` means "no data",
//! not an error.  A bridge may include the bar that is still forming;
//! [`session_candles`] drops it so detectors only ever read closed bars.

pub mod http;
pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use futures_util::future::BoxFuture;

use crate::models::{Candle, Interval, OptionChain};

pub use http::HttpMarketData;
pub use memory::InMemoryMarketData;

/// Object-safe market-data source.  Futures are boxed so the trait can sit
/// behind `Arc<dyn MarketData>` and be shared across concurrent detectors.
pub trait MarketData: Send + Sync {
    fn fetch_candles<'a>(
        &'a self,
        symbol: &'a str,
        interval: Interval,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Candle>>>;

    fn fetch_option_chain<'a>(
        &'a self,
        expiry: Option<NaiveDate>,
    ) -> BoxFuture<'a, anyhow::Result<OptionChain>>;

    fn fetch_spot_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, anyhow::Result<f64>>;
}

pub type SharedMarket = Arc<dyn MarketData>;

/// A bar is closed once its full interval has elapsed at `now`.
pub fn is_completed(candle: &Candle, interval: Interval, now: DateTime<FixedOffset>) -> bool {
    match interval {
        Interval::Day => candle.timestamp.date_naive() < now.date_naive(),
        _ => candle.timestamp + Duration::minutes(interval.minutes()) <= now,
    }
}

/// Closed candles of one interval for the session containing `now`.
pub async fn session_candles(
    market: &dyn MarketData,
    symbol: &str,
    interval: Interval,
    now: DateTime<FixedOffset>,
) -> anyhow::Result<Vec<Candle>> {
    let date = now.date_naive();
    let candles = market.fetch_candles(symbol, interval, date, date).await?;
    Ok(candles
        .into_iter()
        .filter(|c| c.timestamp.date_naive() == date && is_completed(c, interval, now))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{at, hm};

    #[tokio::test]
    async fn test_session_candles_drop_forming_bar() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let bars = (0..3)
            .map(|i| Candle::new(at(d, hm(9, 30)) + Duration::minutes(5 * i), 100.0, 101.0, 99.0, 100.5, 10.0))
            .collect();
        let market = InMemoryMarketData::new().with_candles(Interval::FiveMinute, bars);

        // 09:40 bar is still forming at 09:42
        let closed = session_candles(&market, "NIFTY 50", Interval::FiveMinute, at(d, hm(9, 42))).await.unwrap();
        assert_eq!(closed.len(), 2);
        let all = session_candles(&market, "NIFTY 50", Interval::FiveMinute, at(d, hm(9, 45))).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
