//! # market::http — Market-data bridge client
//!
//! Talks to the broker bridge over plain JSON/HTTP:
//!
//! ```text
//! GET {MARKET_URL}/api/candles?symbol=NIFTY%2050&interval=5minute&from=2024-03-05&to=2024-03-05
//! GET {MARKET_URL}/api/option-chain?expiry=2024-03-07
//! GET {MARKET_URL}/api/ltp?symbol=NIFTY%2050
//! ```
//!
//! ทุก Request มี timeout ของตัวเอง — detector ตัวไหนค้างก็ไม่ลาก tick ทั้งรอบ

use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use futures_util::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use tracing::debug;

use crate::market::MarketData;
use crate::models::{Candle, Interval, OptionChain};

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    candles: Vec<Candle>,
}

#[derive(Debug, Deserialize)]
struct LtpResponse {
    ltp: f64,
}

/// reqwest-backed [`MarketData`].
#[derive(Debug, Clone)]
pub struct HttpMarketData {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpMarketData {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<Candle>> {
        let url = format!("{}/api/candles", self.base_url);
        let from = from.to_string();
        let to = to.to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", interval.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .context("Market bridge unreachable")?
            .error_for_status()
            .context("Market bridge rejected candle request")?;

        let mut body: CandlesResponse = resp
            .json()
            .await
            .context("Failed to parse candle response")?;

        // Bridge contract says chronological — enforce it anyway.
        body.candles.sort_by_key(|c| c.timestamp);
        debug!(symbol, %interval, count = body.candles.len(), "candles fetched");
        Ok(body.candles)
    }

    async fn get_option_chain(&self, expiry: Option<NaiveDate>) -> anyhow::Result<OptionChain> {
        let url = format!("{}/api/option-chain", self.base_url);
        let mut req = self.client.get(&url).timeout(self.timeout);
        if let Some(expiry) = expiry {
            req = req.query(&[("expiry", expiry.to_string())]);
        }

        req.send()
            .await
            .context("Market bridge unreachable")?
            .error_for_status()
            .context("Market bridge rejected option-chain request")?
            .json()
            .await
            .context("Failed to parse option chain")
    }

    async fn get_spot(&self, symbol: &str) -> anyhow::Result<f64> {
        let url = format!("{}/api/ltp", self.base_url);
        let body: LtpResponse = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .timeout(self.timeout)
            .send()
            .await
            .context("Market bridge unreachable")?
            .error_for_status()
            .context("Market bridge rejected LTP request")?
            .json()
            .await
            .context("Failed to parse LTP response")?;
        Ok(body.ltp)
    }
}

impl MarketData for HttpMarketData {
    fn fetch_candles<'a>(
        &'a self,
        symbol: &'a str,
        interval: Interval,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Candle>>> {
        self.get_candles(symbol, interval, from, to).boxed()
    }

    fn fetch_option_chain<'a>(
        &'a self,
        expiry: Option<NaiveDate>,
    ) -> BoxFuture<'a, anyhow::Result<OptionChain>> {
        self.get_option_chain(expiry).boxed()
    }

    fn fetch_spot_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, anyhow::Result<f64>> {
        self.get_spot(symbol).boxed()
    }
}
