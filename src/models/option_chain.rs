//! # models::option_chain
//!
//! Minimal option-chain snapshot consumed by the open-interest analyzer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One strike on one side (CE or PE) of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: f64,
    pub open_interest: f64,
    /// Change in OI since the previous session close.
    #[serde(default)]
    pub oi_change: f64,
    #[serde(default)]
    pub ltp: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    #[serde(default)]
    pub expiry: Option<NaiveDate>,
    pub ce: Vec<OptionQuote>,
    pub pe: Vec<OptionQuote>,
}

impl OptionChain {
    pub fn is_empty(&self) -> bool {
        self.ce.is_empty() && self.pe.is_empty()
    }

    /// All distinct strikes present on either side, ascending.
    pub fn strikes(&self) -> Vec<f64> {
        let mut strikes: Vec<f64> = self
            .ce
            .iter()
            .chain(self.pe.iter())
            .map(|q| q.strike)
            .collect();
        strikes.sort_by(|a, b| a.total_cmp(b));
        strikes.dedup();
        strikes
    }
}
