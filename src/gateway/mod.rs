// Broker gateway boundary
//
// Everything that talks to the broker goes through the `BrokerGateway` trait
// so the rest of the pipeline can be driven against a mock in tests. Reads
// fail closed to None/empty when disconnected; writes fail with
// `TradingError::NotConnected`. Retry policy belongs to callers, never here.

pub mod bridge;

pub use bridge::Mt5Bridge;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TradingResult;
use crate::types::{AccountInfo, Candle, Direction, Position, Quote, Timeframe};

/// Connection lifecycle of the bridge session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Order submission payload handed to the gateway by the order manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub comment: String,
}

#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Establish a broker session. Idempotent: reconnecting replaces the
    /// existing session.
    async fn connect(&self) -> TradingResult<()>;

    /// Whether a live session is currently held
    async fn is_connected(&self) -> bool;

    /// Fresh account snapshot, or None when disconnected or the call fails
    async fn account_info(&self) -> Option<AccountInfo>;

    /// Best bid/ask for a symbol, or None when unavailable
    async fn current_price(&self, symbol: &str) -> Option<Quote>;

    /// Most recent `count` candles, oldest first. Empty when unavailable.
    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Vec<Candle>;

    /// Submit a market order; returns the broker ticket id
    async fn place_order(&self, order: &OrderRequest) -> TradingResult<u64>;

    /// Adjust stop-loss and/or take-profit on an open position
    async fn modify_position(
        &self,
        ticket: u64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> TradingResult<()>;

    /// Close a position entirely. Returns false when the broker reports the
    /// ticket as already gone, which callers treat as a no-op.
    async fn close_position(&self, ticket: u64) -> TradingResult<bool>;

    /// Close part of a position's volume
    async fn close_position_partial(&self, ticket: u64, volume: f64) -> TradingResult<bool>;

    /// All currently open positions
    async fn positions(&self) -> Vec<Position>;
}
