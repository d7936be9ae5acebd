pub mod aggregator;
pub mod analyzers;
pub mod day_classifier;
pub mod detectors;
pub mod indicators;
pub mod pipeline;
pub mod safety;
pub mod scorer;
pub mod simulate;
pub mod strategy_engine;
