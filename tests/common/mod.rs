// Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

use forex_assist::gateway::OrderRequest;
use forex_assist::{
    AccountInfo, BrokerGateway, Candle, Config, Direction, Position, PositionStatus, Quote,
    Timeframe, TradingError, TradingResult,
};

/// Create a test configuration with trading enabled and tight limits
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.signals.auto_execute = true;
    config.signals.enabled_pairs = vec!["EURUSD".to_string()];
    config.signals.enabled_timeframes = vec!["H1".to_string()];
    config.filters.sentiment_enabled = false;
    config.logging.enable_signal_logging = false;
    config.logging.enable_filter_logging = false;
    config.logging.enable_lifecycle_logging = false;
    config
}

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

/// Generate random-walk candles around a base price
pub fn generate_test_candles(base_price: f64, count: usize, volatility: f64) -> Vec<Candle> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let start = Utc::now() - Duration::hours(count as i64);
    let mut price = base_price;

    (0..count)
        .map(|i| {
            let change_pct = rng.gen_range(-volatility..volatility);
            let open = price;
            price *= 1.0 + change_pct;
            let close = price;
            Candle {
                timestamp: start + Duration::hours(i as i64),
                open,
                high: open.max(close) * 1.0001,
                low: open.min(close) * 0.9999,
                close,
                volume: 100.0,
            }
        })
        .collect()
}

/// A clear uptrend that still prints swing highs and lows, strong enough to
/// satisfy the direction analyzer
pub fn generate_trending_candles(len: usize) -> Vec<Candle> {
    let start = Utc::now() - Duration::hours(len as i64);
    (0..len)
        .map(|i| {
            let trend = 1.0800 + i as f64 * 0.0004;
            let phase = (i % 50) as f64;
            let wave = if phase < 25.0 { phase } else { 50.0 - phase } * 0.0003;
            let close = trend + wave;
            Candle {
                timestamp: start + Duration::hours(i as i64),
                open: close - 0.0001,
                high: close + 0.0002,
                low: close - 0.0002,
                close,
                volume: 100.0,
            }
        })
        .collect()
}

pub fn test_account(balance: f64, margin: f64) -> AccountInfo {
    AccountInfo {
        balance,
        equity: balance,
        margin,
        free_margin: balance - margin,
        leverage: 100,
        currency: "USD".to_string(),
    }
}

pub fn open_position(ticket: u64, symbol: &str, direction: Direction, profit: f64) -> Position {
    Position {
        ticket,
        symbol: symbol.to_string(),
        direction,
        volume: 0.5,
        open_price: 1.0800,
        stop_loss: Some(1.0780),
        take_profit: Some(1.0880),
        open_time: Utc::now(),
        profit,
        status: PositionStatus::Open,
    }
}

/// Configurable in-memory broker for integration tests. Positions placed
/// through it become visible in `positions()` immediately.
pub struct MockGateway {
    pub connected: Mutex<bool>,
    pub account: Mutex<Option<AccountInfo>>,
    pub quotes: Mutex<HashMap<String, Quote>>,
    pub candles: Mutex<HashMap<String, Vec<Candle>>>,
    pub positions: Mutex<Vec<Position>>,
    pub placed_orders: Mutex<Vec<OrderRequest>>,
    pub partial_closes: Mutex<Vec<(u64, f64)>>,
    pub stop_updates: Mutex<Vec<(u64, f64)>>,
    pub fail_orders: Mutex<bool>,
    next_ticket: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        MockGateway {
            connected: Mutex::new(true),
            account: Mutex::new(Some(test_account(10_000.0, 0.0))),
            quotes: Mutex::new(HashMap::new()),
            candles: Mutex::new(HashMap::new()),
            positions: Mutex::new(Vec::new()),
            placed_orders: Mutex::new(Vec::new()),
            partial_closes: Mutex::new(Vec::new()),
            stop_updates: Mutex::new(Vec::new()),
            fail_orders: Mutex::new(false),
            next_ticket: AtomicU64::new(7001),
        }
    }

    /// Seed a symbol with trending candles and a matching quote
    pub fn seed_trending_symbol(&self, symbol: &str) {
        let candles = generate_trending_candles(300);
        let price = candles.last().unwrap().close;
        self.candles.lock().unwrap().insert(symbol.to_string(), candles);
        self.set_quote(symbol, price - 0.0001, price + 0.0001);
    }

    pub fn set_quote(&self, symbol: &str, bid: f64, ask: f64) {
        self.quotes.lock().unwrap().insert(
            symbol.to_string(),
            Quote {
                bid,
                ask,
                spread: ask - bid,
                timestamp: Utc::now(),
            },
        );
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerGateway for MockGateway {
    async fn connect(&self) -> TradingResult<()> {
        *self.connected.lock().unwrap() = true;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    async fn account_info(&self) -> Option<AccountInfo> {
        self.account.lock().unwrap().clone()
    }

    async fn current_price(&self, symbol: &str) -> Option<Quote> {
        self.quotes.lock().unwrap().get(symbol).cloned()
    }

    async fn historical_candles(&self, symbol: &str, _: Timeframe, count: usize) -> Vec<Candle> {
        let candles = self.candles.lock().unwrap();
        match candles.get(symbol) {
            Some(series) if series.len() > count => series[series.len() - count..].to_vec(),
            Some(series) => series.clone(),
            None => Vec::new(),
        }
    }

    async fn place_order(&self, order: &OrderRequest) -> TradingResult<u64> {
        if *self.fail_orders.lock().unwrap() {
            return Err(TradingError::OrderFailed("rejected by test broker".to_string()));
        }
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.placed_orders.lock().unwrap().push(order.clone());

        let entry = self
            .quotes
            .lock()
            .unwrap()
            .get(&order.symbol)
            .map(|q| match order.direction {
                Direction::Buy => q.ask,
                Direction::Sell => q.bid,
            })
            .unwrap_or(order.price.unwrap_or(0.0));
        self.positions.lock().unwrap().push(Position {
            ticket,
            symbol: order.symbol.clone(),
            direction: order.direction,
            volume: order.volume,
            open_price: entry,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            open_time: Utc::now(),
            profit: 0.0,
            status: PositionStatus::Open,
        });
        Ok(ticket)
    }

    async fn modify_position(&self, ticket: u64, stop: Option<f64>, tp: Option<f64>) -> TradingResult<()> {
        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .iter_mut()
            .find(|p| p.ticket == ticket)
            .ok_or_else(|| TradingError::OrderFailed(format!("unknown ticket {ticket}")))?;
        if let Some(stop) = stop {
            position.stop_loss = Some(stop);
            self.stop_updates.lock().unwrap().push((ticket, stop));
        }
        if tp.is_some() {
            position.take_profit = tp;
        }
        Ok(())
    }

    async fn close_position(&self, ticket: u64) -> TradingResult<bool> {
        let mut positions = self.positions.lock().unwrap();
        let before = positions.len();
        positions.retain(|p| p.ticket != ticket);
        Ok(positions.len() < before)
    }

    async fn close_position_partial(&self, ticket: u64, volume: f64) -> TradingResult<bool> {
        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .iter_mut()
            .find(|p| p.ticket == ticket)
            .ok_or_else(|| TradingError::OrderFailed(format!("unknown ticket {ticket}")))?;
        position.volume = (position.volume - volume).max(0.0);
        self.partial_closes.lock().unwrap().push((ticket, volume));
        Ok(true)
    }

    async fn positions(&self) -> Vec<Position> {
        self.positions.lock().unwrap().clone()
    }
}
