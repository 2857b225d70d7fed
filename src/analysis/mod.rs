// Market analysis components

pub mod direction;

pub use direction::{aggregate_timeframes, DirectionAnalysis, MarketDirectionAnalyzer};
