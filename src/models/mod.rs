//! Domain models shared across the entire Confluence system.

pub mod candle;
pub mod day;
pub mod option_chain;
pub mod signal;

pub use candle::{Candle, Interval};
pub use day::{Bias, DayClassification, TrendDirection};
pub use option_chain::{OptionChain, OptionQuote};
pub use signal::{AggregatedSignal, CategoryScore, DetectorResult, Reason, ReasonStatus, SignalKind};
