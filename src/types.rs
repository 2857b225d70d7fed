// Core domain types shared across the trading pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trade direction. Wire code 0 = BUY, 1 = SELL on the bridge protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn type_code(&self) -> u8 {
        match self {
            Direction::Buy => 0,
            Direction::Sell => 1,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "SELL" => Direction::Sell,
            _ => Direction::Buy,
        }
    }
}

/// Chart timeframe for candle requests and signal tagging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "M1" => Some(Timeframe::M1),
            "M5" => Some(Timeframe::M5),
            "M15" => Some(Timeframe::M15),
            "M30" => Some(Timeframe::M30),
            "H1" => Some(Timeframe::H1),
            "H4" => Some(Timeframe::H4),
            "D1" => Some(Timeframe::D1),
            _ => None,
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }
}

/// One OHLC bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Best bid/ask snapshot from the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub spread: f64,
    pub timestamp: DateTime<Utc>,
}

/// Account state as reported by the broker; read fresh for every risk check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub leverage: u32,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
    Cancelled,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "CLOSED" => PositionStatus::Closed,
            "CANCELLED" => PositionStatus::Cancelled,
            _ => PositionStatus::Open,
        }
    }
}

/// Open broker position. The gateway is the source of truth; lifecycle
/// managers only mirror these by ticket id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub open_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub open_time: DateTime<Utc>,
    pub profit: f64,
    pub status: PositionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Active,
    Executed,
    Failed,
    Expired,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "ACTIVE",
            SignalStatus::Executed => "EXECUTED",
            SignalStatus::Failed => "FAILED",
            SignalStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "EXECUTED" => SignalStatus::Executed,
            "FAILED" => SignalStatus::Failed,
            "EXPIRED" => SignalStatus::Expired,
            _ => SignalStatus::Active,
        }
    }

    /// EXECUTED and FAILED are terminal; a signal is never resurrected
    pub fn is_terminal(&self) -> bool {
        matches!(self, SignalStatus::Executed | SignalStatus::Failed)
    }
}

/// Candidate trade produced by the signal processor or a strategy function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub timeframe: Timeframe,
    pub reasoning: String,
    pub source: String,
    pub status: SignalStatus,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        confidence: f64,
        entry_price: f64,
        timeframe: Timeframe,
        source: impl Into<String>,
    ) -> Self {
        Signal {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            direction,
            confidence,
            entry_price,
            stop_loss: None,
            take_profit: None,
            timeframe,
            reasoning: String::new(),
            source: source.into(),
            status: SignalStatus::Active,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewsImpact {
    High,
    Medium,
    Low,
}

impl NewsImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsImpact::High => "HIGH",
            NewsImpact::Medium => "MEDIUM",
            NewsImpact::Low => "LOW",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "HIGH" => NewsImpact::High,
            "MEDIUM" => NewsImpact::Medium,
            _ => NewsImpact::Low,
        }
    }
}

/// Scheduled economic calendar event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingNews {
    pub id: String,
    pub title: String,
    pub currency: String,
    pub impact: NewsImpact,
    pub event_time: DateTime<Utc>,
    pub affected_pairs: Vec<String>,
}

/// Directional verdict from the market analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketDirection {
    Bullish,
    Bearish,
    Neutral,
}

/// What the analyzer recommends doing about it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
    Wait,
}

/// Pip size for a pair: 0.01 for JPY-quoted pairs, 0.0001 otherwise
pub fn pip_size(symbol: &str) -> f64 {
    if symbol.to_uppercase().contains("JPY") {
        0.01
    } else {
        0.0001
    }
}

/// Split a 6-letter pair into (base, quote) currencies; longer symbols
/// (e.g. suffixed broker symbols) use the first six letters.
pub fn symbol_currencies(symbol: &str) -> (String, String) {
    let s = symbol.to_uppercase();
    if s.len() >= 6 {
        (s[..3].to_string(), s[3..6].to_string())
    } else {
        (s.clone(), String::new())
    }
}

/// Standard lot size in base-currency units
pub const LOT_UNITS: f64 = 100_000.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_codes() {
        assert_eq!(Direction::Buy.type_code(), 0);
        assert_eq!(Direction::Sell.type_code(), 1);
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
        assert_eq!(Direction::from_str("SELL"), Direction::Sell);
    }

    #[test]
    fn test_pip_size() {
        assert_eq!(pip_size("EURUSD"), 0.0001);
        assert_eq!(pip_size("USDJPY"), 0.01);
        assert_eq!(pip_size("gbpjpy"), 0.01);
    }

    #[test]
    fn test_symbol_currencies() {
        let (base, quote) = symbol_currencies("EURUSD");
        assert_eq!(base, "EUR");
        assert_eq!(quote, "USD");

        let (base, quote) = symbol_currencies("GBPJPY.r");
        assert_eq!(base, "GBP");
        assert_eq!(quote, "JPY");
    }

    #[test]
    fn test_signal_status_terminal() {
        assert!(SignalStatus::Executed.is_terminal());
        assert!(SignalStatus::Failed.is_terminal());
        assert!(!SignalStatus::Active.is_terminal());
        assert!(!SignalStatus::Expired.is_terminal());
    }

    #[test]
    fn test_timeframe_roundtrip() {
        assert_eq!(Timeframe::from_str("H1"), Some(Timeframe::H1));
        assert_eq!(Timeframe::H4.minutes(), 240);
        assert_eq!(Timeframe::from_str("W1"), None);
    }
}
