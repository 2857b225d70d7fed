// HTTP client for the MT5 broker bridge
//
// The bridge is a separate process speaking JSON over HTTP. Every response
// carries a `success` boolean; anything other than `success: true` is a
// failure regardless of HTTP status, and payloads are parsed into strict
// structs at this boundary so malformed data never reaches risk math.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{TradingError, TradingResult};
use crate::gateway::{BrokerGateway, ConnectionState, OrderRequest};
use crate::types::{AccountInfo, Candle, Direction, Position, PositionStatus, Quote, Timeframe};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_BASE_DELAY_MS: u64 = 1_000;
const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

#[derive(Debug)]
struct Session {
    state: ConnectionState,
    session_id: Option<String>,
    last_update: Option<DateTime<Utc>>,
}

/// Gateway implementation backed by the MT5 HTTP bridge
pub struct Mt5Bridge {
    client: reqwest::Client,
    config: BridgeConfig,
    session: RwLock<Session>,
}

// ---- wire payloads -------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    success: bool,
    session_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountPayload {
    balance: f64,
    equity: f64,
    margin: f64,
    free_margin: f64,
    leverage: u32,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PricePayload {
    bid: f64,
    ask: f64,
    spread: f64,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct CandlePayload {
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    tick_volume: f64,
}

#[derive(Debug, Deserialize)]
struct TicketPayload {
    ticket: u64,
}

#[derive(Debug, Deserialize)]
struct PositionPayload {
    ticket: u64,
    symbol: String,
    #[serde(rename = "type")]
    order_type: u8,
    volume: f64,
    price_open: f64,
    #[serde(default)]
    sl: Option<f64>,
    #[serde(default)]
    tp: Option<f64>,
    time: i64,
    profit: f64,
}

#[derive(Debug, Serialize)]
struct SessionBody<'a> {
    session_id: &'a str,
}

impl Mt5Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            config,
            session: RwLock::new(Session {
                state: ConnectionState::Disconnected,
                session_id: None,
                last_update: None,
            }),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.read().await.state
    }

    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        self.session.read().await.last_update
    }

    /// Reconnect with doubling backoff, bounded at five attempts
    pub async fn reconnect_with_backoff(&self) -> TradingResult<()> {
        {
            let mut session = self.session.write().await;
            session.state = ConnectionState::Reconnecting;
        }

        let mut delay = RECONNECT_BASE_DELAY_MS;
        let mut last_err = TradingError::NotConnected;
        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            match self.connect().await {
                Ok(()) => {
                    info!(attempt, "bridge reconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "bridge reconnect attempt failed");
                    last_err = e;
                }
            }
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay = (delay * 2).min(RECONNECT_MAX_DELAY_MS);
        }
        Err(last_err)
    }

    async fn session_id(&self) -> TradingResult<String> {
        let session = self.session.read().await;
        match (&session.state, &session.session_id) {
            (ConnectionState::Connected, Some(id)) => Ok(id.clone()),
            _ => Err(TradingError::NotConnected),
        }
    }

    async fn mark_success(&self) {
        let mut session = self.session.write().await;
        session.last_update = Some(Utc::now());
    }

    /// A transport-level failure on any call drops the session back to
    /// Reconnecting; a `success: false` body does not (the session is alive,
    /// the broker just refused the request).
    async fn mark_transport_failure(&self) {
        let mut session = self.session.write().await;
        if session.state == ConnectionState::Connected {
            session.state = ConnectionState::Reconnecting;
        }
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> TradingResult<ApiResponse<T>> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            let err: TradingError = e.into();
            err
        })?;

        let parsed: ApiResponse<T> = response.json().await.map_err(TradingError::from)?;
        Ok(parsed)
    }
}

#[async_trait]
impl BrokerGateway for Mt5Bridge {
    async fn connect(&self) -> TradingResult<()> {
        {
            let mut session = self.session.write().await;
            if session.state == ConnectionState::Disconnected {
                session.state = ConnectionState::Connecting;
            }
        }

        let url = format!("{}/mt5/connect", self.config.base_url);
        let body = serde_json::json!({
            "login": self.config.login,
            "password": self.config.password,
            "server": self.config.server,
        });

        let result = async {
            let response = self.client.post(&url).json(&body).send().await?;
            let parsed: ConnectResponse = response.json().await?;
            Ok::<ConnectResponse, reqwest::Error>(parsed)
        }
        .await;

        match result {
            Ok(parsed) if parsed.success => {
                let session_id = parsed.session_id.ok_or_else(|| {
                    TradingError::ApiResponse("connect succeeded without session_id".to_string())
                })?;
                let mut session = self.session.write().await;
                session.state = ConnectionState::Connected;
                session.session_id = Some(session_id);
                session.last_update = Some(Utc::now());
                info!(server = %self.config.server, "connected to MT5 bridge");
                Ok(())
            }
            Ok(parsed) => {
                let mut session = self.session.write().await;
                session.state = ConnectionState::Disconnected;
                session.session_id = None;
                Err(TradingError::ApiResponse(
                    parsed.error.unwrap_or_else(|| "bridge refused connection".to_string()),
                ))
            }
            Err(e) => {
                let mut session = self.session.write().await;
                session.state = ConnectionState::Disconnected;
                session.session_id = None;
                Err(e.into())
            }
        }
    }

    async fn is_connected(&self) -> bool {
        self.session.read().await.state == ConnectionState::Connected
    }

    async fn account_info(&self) -> Option<AccountInfo> {
        let session_id = self.session_id().await.ok()?;
        let body = SessionBody { session_id: &session_id };

        match self.post::<_, AccountPayload>("/mt5/account_info", &body).await {
            Ok(response) if response.success => {
                let payload = response.data?;
                self.mark_success().await;
                Some(AccountInfo {
                    balance: payload.balance,
                    equity: payload.equity,
                    margin: payload.margin,
                    free_margin: payload.free_margin,
                    leverage: payload.leverage,
                    currency: payload.currency.unwrap_or_else(|| "USD".to_string()),
                })
            }
            Ok(response) => {
                warn!(error = ?response.error, "account_info refused by bridge");
                None
            }
            Err(e) => {
                warn!(error = %e, "account_info transport failure");
                self.mark_transport_failure().await;
                None
            }
        }
    }

    async fn current_price(&self, symbol: &str) -> Option<Quote> {
        if !self.is_connected().await {
            return None;
        }

        let url = format!("{}/mt5/price", self.config.base_url);
        let result = async {
            let response = self.client.get(&url).query(&[("symbol", symbol)]).send().await?;
            let parsed: ApiResponse<PricePayload> = response.json().await?;
            Ok::<ApiResponse<PricePayload>, reqwest::Error>(parsed)
        }
        .await;

        match result {
            Ok(response) if response.success => {
                let payload = response.data?;
                self.mark_success().await;
                Some(Quote {
                    bid: payload.bid,
                    ask: payload.ask,
                    spread: payload.spread,
                    timestamp: Utc.timestamp_opt(payload.timestamp, 0).single()?,
                })
            }
            Ok(response) => {
                debug!(symbol, error = ?response.error, "price refused by bridge");
                None
            }
            Err(e) => {
                warn!(symbol, error = %e, "price transport failure");
                self.mark_transport_failure().await;
                None
            }
        }
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Vec<Candle> {
        let Ok(session_id) = self.session_id().await else {
            return Vec::new();
        };
        let body = serde_json::json!({
            "session_id": session_id,
            "symbol": symbol,
            "timeframe": timeframe.as_str(),
            "count": count,
        });

        match self.post::<_, Vec<CandlePayload>>("/mt5/candles", &body).await {
            Ok(response) if response.success => {
                let mut candles: Vec<Candle> = response
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|c| {
                        Some(Candle {
                            timestamp: Utc.timestamp_opt(c.time, 0).single()?,
                            open: c.open,
                            high: c.high,
                            low: c.low,
                            close: c.close,
                            volume: c.tick_volume,
                        })
                    })
                    .collect();
                candles.sort_by_key(|c| c.timestamp);
                self.mark_success().await;
                candles
            }
            Ok(response) => {
                debug!(symbol, error = ?response.error, "candles refused by bridge");
                Vec::new()
            }
            Err(e) => {
                warn!(symbol, error = %e, "candles transport failure");
                self.mark_transport_failure().await;
                Vec::new()
            }
        }
    }

    async fn place_order(&self, order: &OrderRequest) -> TradingResult<u64> {
        let session_id = self.session_id().await?;
        let body = serde_json::json!({
            "session_id": session_id,
            "symbol": order.symbol,
            "type": order.direction.type_code(),
            "volume": order.volume,
            "price": order.price,
            "sl": order.stop_loss,
            "tp": order.take_profit,
            "comment": order.comment,
        });

        let response: ApiResponse<TicketPayload> = self
            .post("/mt5/place_order", &body)
            .await
            .map_err(|e| {
                error!(symbol = %order.symbol, error = %e, "place_order transport failure");
                e
            })?;

        if response.success {
            let ticket = response
                .data
                .ok_or_else(|| TradingError::ApiResponse("order accepted without ticket".to_string()))?
                .ticket;
            self.mark_success().await;
            info!(symbol = %order.symbol, ticket, volume = order.volume, "order placed");
            Ok(ticket)
        } else {
            Err(TradingError::OrderRejected(
                response.error.unwrap_or_else(|| "bridge rejected order".to_string()),
            ))
        }
    }

    async fn modify_position(
        &self,
        ticket: u64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> TradingResult<()> {
        let session_id = self.session_id().await?;
        let body = serde_json::json!({
            "session_id": session_id,
            "ticket": ticket,
            "sl": stop_loss,
            "tp": take_profit,
        });

        let response: ApiResponse<serde_json::Value> =
            self.post("/mt5/modify_position", &body).await?;

        if response.success {
            self.mark_success().await;
            debug!(ticket, ?stop_loss, ?take_profit, "position modified");
            Ok(())
        } else {
            Err(TradingError::OrderFailed(
                response.error.unwrap_or_else(|| format!("modify refused for ticket {}", ticket)),
            ))
        }
    }

    async fn close_position(&self, ticket: u64) -> TradingResult<bool> {
        let session_id = self.session_id().await?;
        let body = serde_json::json!({ "session_id": session_id, "ticket": ticket });

        let response: ApiResponse<serde_json::Value> =
            self.post("/mt5/close_position", &body).await?;

        if response.success {
            self.mark_success().await;
            info!(ticket, "position closed");
            Ok(true)
        } else {
            // An already-gone ticket is a no-op for callers, not an error
            let message = response.error.unwrap_or_default();
            if message.to_lowercase().contains("not found") {
                debug!(ticket, "close was a no-op, ticket already gone");
                Ok(false)
            } else {
                Err(TradingError::OrderFailed(message))
            }
        }
    }

    async fn close_position_partial(&self, ticket: u64, volume: f64) -> TradingResult<bool> {
        let session_id = self.session_id().await?;
        let body = serde_json::json!({
            "session_id": session_id,
            "ticket": ticket,
            "volume": volume,
        });

        let response: ApiResponse<serde_json::Value> =
            self.post("/mt5/close_partial", &body).await?;

        if response.success {
            self.mark_success().await;
            info!(ticket, volume, "partial close executed");
            Ok(true)
        } else {
            let message = response.error.unwrap_or_default();
            if message.to_lowercase().contains("not found") {
                Ok(false)
            } else {
                Err(TradingError::OrderFailed(message))
            }
        }
    }

    async fn positions(&self) -> Vec<Position> {
        let Ok(session_id) = self.session_id().await else {
            return Vec::new();
        };
        let body = SessionBody { session_id: &session_id };

        match self.post::<_, Vec<PositionPayload>>("/mt5/positions", &body).await {
            Ok(response) if response.success => {
                self.mark_success().await;
                response
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|p| {
                        let direction = match p.order_type {
                            0 => Direction::Buy,
                            1 => Direction::Sell,
                            other => {
                                warn!(ticket = p.ticket, order_type = other, "unknown order type, skipping");
                                return None;
                            }
                        };
                        Some(Position {
                            ticket: p.ticket,
                            symbol: p.symbol,
                            direction,
                            volume: p.volume,
                            open_price: p.price_open,
                            stop_loss: p.sl.filter(|v| *v > 0.0),
                            take_profit: p.tp.filter(|v| *v > 0.0),
                            open_time: Utc.timestamp_opt(p.time, 0).single()?,
                            profit: p.profit,
                            status: PositionStatus::Open,
                        })
                    })
                    .collect()
            }
            Ok(response) => {
                warn!(error = ?response.error, "positions refused by bridge");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "positions transport failure");
                self.mark_transport_failure().await;
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: String) -> BridgeConfig {
        BridgeConfig {
            base_url,
            login: "12345".to_string(),
            password: "secret".to_string(),
            server: "Demo-Server".to_string(),
            request_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_connect_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/mt5/connect")
            .with_body(r#"{"success": true, "session_id": "abc-123"}"#)
            .create_async()
            .await;

        let bridge = Mt5Bridge::new(test_config(server.url()));
        bridge.connect().await.unwrap();
        assert!(bridge.is_connected().await);
        assert_eq!(bridge.state().await, ConnectionState::Connected);
        assert!(bridge.last_update().await.is_some());
    }

    #[tokio::test]
    async fn test_connect_refused_despite_http_200() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/mt5/connect")
            .with_body(r#"{"success": false, "error": "invalid credentials"}"#)
            .create_async()
            .await;

        let bridge = Mt5Bridge::new(test_config(server.url()));
        let err = bridge.connect().await.unwrap_err();
        assert!(err.to_string().contains("invalid credentials"));
        assert!(!bridge.is_connected().await);
    }

    #[tokio::test]
    async fn test_reads_fail_closed_when_disconnected() {
        let server = mockito::Server::new_async().await;
        let bridge = Mt5Bridge::new(test_config(server.url()));

        assert!(bridge.account_info().await.is_none());
        assert!(bridge.current_price("EURUSD").await.is_none());
        assert!(bridge.historical_candles("EURUSD", Timeframe::H1, 50).await.is_empty());
        assert!(bridge.positions().await.is_empty());
    }

    #[tokio::test]
    async fn test_writes_throw_when_disconnected() {
        let server = mockito::Server::new_async().await;
        let bridge = Mt5Bridge::new(test_config(server.url()));

        let order = OrderRequest {
            symbol: "EURUSD".to_string(),
            direction: Direction::Buy,
            volume: 0.1,
            price: None,
            stop_loss: Some(1.0800),
            take_profit: None,
            comment: "test".to_string(),
        };
        assert!(matches!(
            bridge.place_order(&order).await,
            Err(TradingError::NotConnected)
        ));
        assert!(matches!(
            bridge.close_position(1001).await,
            Err(TradingError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_place_order_parses_ticket() {
        let mut server = mockito::Server::new_async().await;
        let _connect = server
            .mock("POST", "/mt5/connect")
            .with_body(r#"{"success": true, "session_id": "abc"}"#)
            .create_async()
            .await;
        let _order = server
            .mock("POST", "/mt5/place_order")
            .with_body(r#"{"success": true, "data": {"ticket": 7781}}"#)
            .create_async()
            .await;

        let bridge = Mt5Bridge::new(test_config(server.url()));
        bridge.connect().await.unwrap();

        let order = OrderRequest {
            symbol: "EURUSD".to_string(),
            direction: Direction::Sell,
            volume: 0.25,
            price: None,
            stop_loss: Some(1.0950),
            take_profit: Some(1.0800),
            comment: "signal".to_string(),
        };
        let ticket = bridge.place_order(&order).await.unwrap();
        assert_eq!(ticket, 7781);
    }

    #[tokio::test]
    async fn test_close_of_missing_ticket_is_noop() {
        let mut server = mockito::Server::new_async().await;
        let _connect = server
            .mock("POST", "/mt5/connect")
            .with_body(r#"{"success": true, "session_id": "abc"}"#)
            .create_async()
            .await;
        let _close = server
            .mock("POST", "/mt5/close_position")
            .with_body(r#"{"success": false, "error": "position not found"}"#)
            .create_async()
            .await;

        let bridge = Mt5Bridge::new(test_config(server.url()));
        bridge.connect().await.unwrap();
        assert_eq!(bridge.close_position(9999).await.unwrap(), false);
    }

    #[tokio::test]
    async fn test_positions_skip_malformed_type() {
        let mut server = mockito::Server::new_async().await;
        let _connect = server
            .mock("POST", "/mt5/connect")
            .with_body(r#"{"success": true, "session_id": "abc"}"#)
            .create_async()
            .await;
        let _positions = server
            .mock("POST", "/mt5/positions")
            .with_body(
                r#"{"success": true, "data": [
                    {"ticket": 1, "symbol": "EURUSD", "type": 0, "volume": 0.5,
                     "price_open": 1.09, "sl": 1.085, "tp": 0.0, "time": 1700000000, "profit": 12.5},
                    {"ticket": 2, "symbol": "EURUSD", "type": 7, "volume": 0.5,
                     "price_open": 1.09, "time": 1700000000, "profit": 0.0}
                ]}"#,
            )
            .create_async()
            .await;

        let bridge = Mt5Bridge::new(test_config(server.url()));
        bridge.connect().await.unwrap();

        let positions = bridge.positions().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticket, 1);
        assert_eq!(positions[0].stop_loss, Some(1.085));
        // tp of 0.0 on the wire means "not set"
        assert_eq!(positions[0].take_profit, None);
    }
}
