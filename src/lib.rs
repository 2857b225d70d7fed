// Forex Trading Assistant Library
//
// A modular forex trading assistant: signal generation, filtered and
// risk-gated execution over an MT5 HTTP bridge, position lifecycle
// supervision and a persistent trading journal.

pub mod analysis;
pub mod config;
pub mod db;          // SQLite persistence layer
pub mod error;       // Unified error handling
pub mod filters;
pub mod gateway;     // Broker boundary (MT5 bridge + trait)
pub mod indicators;
pub mod lifecycle;
pub mod monitoring;
pub mod orders;
pub mod signals;
pub mod types;
pub mod validation;  // Pre-flight validation

// Re-export core trading types
pub use types::{
    AccountInfo, Candle, Direction, MarketDirection, NewsImpact, Position, PositionStatus, Quote,
    Signal, SignalStatus, Timeframe, TradeAction, UpcomingNews,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export configuration
pub use config::{Config, ConfigError, FilterConfig, HedgeConfig, PartialProfitConfig, RiskConfig, SignalConfig};

// Re-export the broker boundary
pub use gateway::{BrokerGateway, ConnectionState, Mt5Bridge, OrderRequest};

// Re-export analysis
pub use analysis::{aggregate_timeframes, DirectionAnalysis, MarketDirectionAnalyzer};

// Re-export filters
pub use filters::{FilterVerdict, HttpNewsFeed, Killzone, NewsCalendar, NewsFeed, TradingFilters};

// Re-export execution and lifecycle
pub use orders::{CloseReport, OrderManager};
pub use signals::{SignalProcessor, TickOutcome};
pub use lifecycle::{HedgeAssessment, HedgeDecision, HedgeManager, HedgePair, PartialProfitManager};

// Re-export persistence
pub use db::{Database, JournalEntry, JournalStats, SignalStore, TradingJournal};

// Re-export observability and validation
pub use monitoring::{Anomaly, AnomalyLevel, MarginHealth, MonitoringReport, TradingMonitor};
pub use validation::{PreFlightValidator, ValidationCheck, ValidationLevel, ValidationResult};
