// Signal processor
//
// Polls on a fixed cadence: generates candidates from the direction
// analyzer, persists them, then drains the strongest stored candidates
// through the order manager. Ticks never overlap; an in-flight tick makes
// the next one skip rather than queue.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, info, warn};

use crate::analysis::{aggregate_timeframes, DirectionAnalysis, MarketDirectionAnalyzer};
use crate::config::SignalConfig;
use crate::db::SignalStore;
use crate::error::TradingResult;
use crate::filters::{sentiment_score, TradingFilters};
use crate::gateway::{BrokerGateway, OrderRequest};
use crate::indicators;
use crate::orders::OrderManager;
use crate::types::{pip_size, Direction, Signal, SignalStatus, Timeframe, TradeAction};

use super::{compute_volume, effective_min_confidence};

const CANDLE_HISTORY: usize = 300;
const EXECUTION_ATR_WINDOW: usize = 50;

/// What one tick did, for logs and tests
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub skipped: Option<String>,
    pub generated: usize,
    pub executed: usize,
    pub failed: usize,
}

impl TickOutcome {
    fn skip(reason: &str) -> Self {
        TickOutcome {
            skipped: Some(reason.to_string()),
            ..TickOutcome::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct QuotaWindow {
    date: NaiveDate,
    executed: u32,
}

pub struct SignalProcessor {
    gateway: Arc<dyn BrokerGateway>,
    analyzer: MarketDirectionAnalyzer,
    filters: Arc<TradingFilters>,
    store: Arc<SignalStore>,
    orders: Arc<OrderManager>,
    config: SignalConfig,
    in_flight: AtomicBool,
    last_tick: Mutex<Option<DateTime<Utc>>>,
    quota: Mutex<QuotaWindow>,
}

impl SignalProcessor {
    pub fn new(
        gateway: Arc<dyn BrokerGateway>,
        filters: Arc<TradingFilters>,
        store: Arc<SignalStore>,
        orders: Arc<OrderManager>,
        config: SignalConfig,
    ) -> Self {
        Self {
            gateway,
            analyzer: MarketDirectionAnalyzer::default(),
            filters,
            store,
            orders,
            config,
            in_flight: AtomicBool::new(false),
            last_tick: Mutex::new(None),
            quota: Mutex::new(QuotaWindow {
                date: Utc::now().date_naive(),
                executed: 0,
            }),
        }
    }

    /// Poll forever at the configured cadence
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.config.poll_interval_secs.max(1)));
        loop {
            ticker.tick().await;
            let outcome = self.tick(Utc::now()).await;
            if let Some(reason) = &outcome.skipped {
                debug!(reason, "signal tick skipped");
            } else {
                info!(
                    generated = outcome.generated,
                    executed = outcome.executed,
                    failed = outcome.failed,
                    "signal tick complete"
                );
            }
        }
    }

    /// One processing pass. Returns what was skipped or done.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return TickOutcome::skip("previous tick still processing");
        }

        let outcome = self.tick_locked(now).await;
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn tick_locked(&self, now: DateTime<Utc>) -> TickOutcome {
        {
            let mut last = self.last_tick.lock().unwrap();
            if let Some(prev) = *last {
                let spacing = chrono::Duration::seconds(self.config.min_tick_spacing_secs as i64);
                if now - prev < spacing {
                    return TickOutcome::skip("minimum tick spacing not elapsed");
                }
            }
            *last = Some(now);
        }

        if self.quota_remaining(now) == 0 {
            return TickOutcome::skip("daily signal quota exhausted");
        }

        let mut outcome = TickOutcome::default();
        outcome.generated = self.generate_candidates(now).await;
        self.process_candidates(now, &mut outcome).await;
        outcome
    }

    fn quota_remaining(&self, now: DateTime<Utc>) -> u32 {
        let mut quota = self.quota.lock().unwrap();
        let today = now.date_naive();
        if quota.date != today {
            quota.date = today;
            quota.executed = 0;
        }
        self.config.daily_quota.saturating_sub(quota.executed)
    }

    fn count_execution(&self, now: DateTime<Utc>) {
        let mut quota = self.quota.lock().unwrap();
        let today = now.date_naive();
        if quota.date != today {
            quota.date = today;
            quota.executed = 0;
        }
        quota.executed += 1;
    }

    /// Run the analyzer over every enabled pair and persist any signal that
    /// clears the confidence floor. Filter-blocked pairs are skipped whole.
    async fn generate_candidates(&self, now: DateTime<Utc>) -> usize {
        let threshold = effective_min_confidence(&self.config, now);
        let mut generated = 0;

        for symbol in &self.config.enabled_pairs {
            let timeframes: Vec<Timeframe> = self
                .config
                .enabled_timeframes
                .iter()
                .filter_map(|tf| Timeframe::from_str(tf))
                .collect();
            let primary = match timeframes.first() {
                Some(tf) => *tf,
                None => continue,
            };

            let primary_candles = self
                .gateway
                .historical_candles(symbol, primary, CANDLE_HISTORY)
                .await;
            if primary_candles.is_empty() {
                debug!(symbol, "no candle history, skipping pair");
                continue;
            }

            let sentiment = sentiment_score(&primary_candles);
            let verdict = self.filters.can_trade_now(symbol, now, sentiment).await;
            if !verdict.can_trade {
                debug!(symbol, blocked_by = ?verdict.blocked_by, "pair blocked by filters");
                continue;
            }

            let quote = match self.gateway.current_price(symbol).await {
                Some(q) => q,
                None => continue,
            };
            let price = (quote.bid + quote.ask) / 2.0;

            let mut analyses: Vec<DirectionAnalysis> = Vec::new();
            for tf in &timeframes {
                let candles = if *tf == primary {
                    primary_candles.clone()
                } else {
                    self.gateway.historical_candles(symbol, *tf, CANDLE_HISTORY).await
                };
                if !candles.is_empty() {
                    analyses.push(self.analyzer.analyze(&candles, price, None));
                }
            }
            if analyses.is_empty() {
                continue;
            }
            let combined = aggregate_timeframes(&analyses);

            let direction = match combined.recommended_action {
                TradeAction::Buy => Direction::Buy,
                TradeAction::Sell => Direction::Sell,
                TradeAction::Wait => continue,
            };
            if combined.confidence < threshold {
                continue;
            }

            let atr = match indicators::atr(&primary_candles, 14) {
                Some(atr) if atr > 0.0 => atr,
                _ => continue,
            };
            let (stop_loss, take_profit) = match direction {
                Direction::Buy => (price - 2.0 * atr, price + 4.0 * atr),
                Direction::Sell => (price + 2.0 * atr, price - 4.0 * atr),
            };

            let mut signal = Signal::new(
                symbol.clone(),
                direction,
                combined.confidence,
                price,
                primary,
                "direction-analyzer",
            );
            signal.stop_loss = Some(stop_loss);
            signal.take_profit = Some(take_profit);
            signal.reasoning = combined.reasoning.join("; ");
            signal.created_at = now;

            match self.store.insert(&signal) {
                Ok(()) => {
                    info!(
                        symbol,
                        direction = direction.as_str(),
                        confidence = combined.confidence,
                        "signal generated"
                    );
                    generated += 1;
                }
                Err(e) => warn!(symbol, error = %e, "failed to persist signal"),
            }
        }
        generated
    }

    /// Drain the strongest stored candidates through the order manager
    async fn process_candidates(&self, now: DateTime<Utc>, outcome: &mut TickOutcome) {
        let threshold = effective_min_confidence(&self.config, now);
        let candidates = match self.store.active_candidates(threshold, self.config.batch_size) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to load signal candidates");
                return;
            }
        };

        for signal in candidates {
            if self.quota_remaining(now) == 0 {
                debug!("daily quota reached mid-batch, stopping");
                break;
            }

            // Re-validate against current configuration; stale candidates
            // for disabled pairs or timeframes expire instead of executing
            if !self.config.enabled_pairs.contains(&signal.symbol)
                || !self
                    .config
                    .enabled_timeframes
                    .iter()
                    .any(|tf| tf == signal.timeframe.as_str())
            {
                let _ = self.store.update_status(signal.id, SignalStatus::Expired);
                continue;
            }

            if let Err(reason) = self.execution_conditions(&signal).await {
                debug!(symbol = %signal.symbol, reason, "execution conditions not met, keeping signal active");
                continue;
            }

            let volume = compute_volume(&self.config, &signal, now);

            if !self.config.auto_execute {
                info!(
                    symbol = %signal.symbol,
                    direction = signal.direction.as_str(),
                    confidence = signal.confidence,
                    volume,
                    "signal advisory (auto-execute disabled)"
                );
                continue;
            }

            match self.submit(&signal, volume).await {
                Ok(ticket) => {
                    let _ = self.store.update_status(signal.id, SignalStatus::Executed);
                    self.count_execution(now);
                    outcome.executed += 1;
                    info!(ticket, symbol = %signal.symbol, "signal executed");
                }
                Err(e) => {
                    let _ = self.store.update_status(signal.id, SignalStatus::Failed);
                    outcome.failed += 1;
                    warn!(symbol = %signal.symbol, error = %e, "signal execution failed");
                }
            }
        }
    }

    /// Spread and volatility gate immediately before execution
    async fn execution_conditions(&self, signal: &Signal) -> Result<(), String> {
        let quote = self
            .gateway
            .current_price(&signal.symbol)
            .await
            .ok_or_else(|| "no current quote".to_string())?;
        let pip = pip_size(&signal.symbol);
        let spread_pips = quote.spread / pip;

        let candles = self
            .gateway
            .historical_candles(&signal.symbol, signal.timeframe, EXECUTION_ATR_WINDOW)
            .await;
        let atr_pips = indicators::atr(&candles, 14)
            .map(|atr| atr / pip)
            .ok_or_else(|| "insufficient candles for ATR".to_string())?;

        self.filters.execution_gate(&signal.symbol, spread_pips, atr_pips)
    }

    async fn submit(&self, signal: &Signal, volume: f64) -> TradingResult<u64> {
        let request = OrderRequest {
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            volume,
            price: Some(signal.entry_price),
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            comment: format!("signal {}", signal.id),
        };
        self.orders.execute_order(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{Database, TradingJournal};
    use crate::filters::{NewsCalendar, NewsFeed};
    use crate::types::{AccountInfo, Candle, Position, Quote, UpcomingNews};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;

    struct EmptyFeed;

    #[async_trait]
    impl NewsFeed for EmptyFeed {
        async fn fetch_upcoming(&self) -> TradingResult<Vec<UpcomingNews>> {
            Ok(vec![])
        }
    }

    struct StubGateway {
        candles: HashMap<String, Vec<Candle>>,
        quotes: HashMap<String, Quote>,
        place_fails: bool,
        placed: Mutex<Vec<OrderRequest>>,
    }

    #[async_trait]
    impl BrokerGateway for StubGateway {
        async fn connect(&self) -> TradingResult<()> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            true
        }
        async fn account_info(&self) -> Option<AccountInfo> {
            Some(AccountInfo {
                balance: 10_000.0,
                equity: 10_000.0,
                margin: 0.0,
                free_margin: 10_000.0,
                leverage: 100,
                currency: "USD".to_string(),
            })
        }
        async fn current_price(&self, symbol: &str) -> Option<Quote> {
            self.quotes.get(symbol).cloned()
        }
        async fn historical_candles(&self, symbol: &str, _: Timeframe, _: usize) -> Vec<Candle> {
            self.candles.get(symbol).cloned().unwrap_or_default()
        }
        async fn place_order(&self, order: &OrderRequest) -> TradingResult<u64> {
            if self.place_fails {
                return Err(crate::error::TradingError::OrderFailed("rejected".to_string()));
            }
            let mut placed = self.placed.lock().unwrap();
            placed.push(order.clone());
            Ok(9000 + placed.len() as u64)
        }
        async fn modify_position(&self, _: u64, _: Option<f64>, _: Option<f64>) -> TradingResult<()> {
            Ok(())
        }
        async fn close_position(&self, _: u64) -> TradingResult<bool> {
            Ok(true)
        }
        async fn close_position_partial(&self, _: u64, _: f64) -> TradingResult<bool> {
            Ok(true)
        }
        async fn positions(&self) -> Vec<Position> {
            Vec::new()
        }
    }

    fn rising_zigzag(len: usize) -> Vec<Candle> {
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

    fn london_open() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    struct Harness {
        processor: SignalProcessor,
        store: Arc<SignalStore>,
    }

    fn harness(config: SignalConfig, place_fails: bool) -> Harness {
        let candles = rising_zigzag(300);
        let price = candles.last().unwrap().close;
        let mut gateway = StubGateway {
            candles: HashMap::new(),
            quotes: HashMap::new(),
            place_fails,
            placed: Mutex::new(Vec::new()),
        };
        for symbol in &config.enabled_pairs {
            gateway.candles.insert(symbol.clone(), candles.clone());
            gateway.quotes.insert(
                symbol.clone(),
                Quote {
                    bid: price - 0.0001,
                    ask: price + 0.0001,
                    spread: 0.0002,
                    timestamp: Utc::now(),
                },
            );
        }
        let gateway: Arc<dyn BrokerGateway> = Arc::new(gateway);

        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();
        let journal = Arc::new(TradingJournal::new(db.get_connection()));
        let store = Arc::new(SignalStore::new(db.get_connection()));

        let filter_config = Config::default().filters;
        let calendar = Arc::new(NewsCalendar::new(
            Arc::new(EmptyFeed),
            filter_config.news_cache_ttl_secs,
            filter_config.high_impact_blackout_minutes,
            filter_config.medium_impact_blackout_minutes,
        ));
        let filters = Arc::new(TradingFilters::with_default_killzones(filter_config, calendar));

        let mut risk = Config::default().risk;
        risk.require_stop_loss = true;
        let orders = Arc::new(OrderManager::new(Arc::clone(&gateway), risk, journal));

        let processor = SignalProcessor::new(gateway, filters, Arc::clone(&store), orders, config);
        Harness { processor, store }
    }

    fn test_config() -> SignalConfig {
        SignalConfig {
            auto_execute: true,
            enabled_pairs: vec!["EURUSD".to_string()],
            enabled_timeframes: vec!["H1".to_string()],
            min_tick_spacing_secs: 15,
            ..Config::default().signals
        }
    }

    #[tokio::test]
    async fn test_tick_generates_and_executes() {
        let h = harness(test_config(), false);
        let outcome = h.processor.tick(london_open()).await;

        assert!(outcome.skipped.is_none());
        assert_eq!(outcome.generated, 1);
        assert_eq!(outcome.executed, 1);
        assert_eq!(outcome.failed, 0);

        let remaining = h.store.active_candidates(0.0, 10).unwrap();
        assert!(remaining.is_empty(), "executed signal must leave ACTIVE");
    }

    #[tokio::test]
    async fn test_tick_spacing_skips() {
        let h = harness(test_config(), false);
        let now = london_open();
        h.processor.tick(now).await;
        let outcome = h.processor.tick(now + Duration::seconds(5)).await;
        assert!(outcome.skipped.is_some());
    }

    #[tokio::test]
    async fn test_failed_submission_marks_signal_failed() {
        let h = harness(test_config(), true);
        let outcome = h.processor.tick(london_open()).await;

        assert_eq!(outcome.executed, 0);
        assert_eq!(outcome.failed, 1);
        let remaining = h.store.active_candidates(0.0, 10).unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_quota_exhaustion_skips_tick() {
        let mut config = test_config();
        config.daily_quota = 1;
        let h = harness(config, false);

        let now = london_open();
        let first = h.processor.tick(now).await;
        assert_eq!(first.executed, 1);

        let second = h.processor.tick(now + Duration::seconds(60)).await;
        assert_eq!(second.skipped.as_deref(), Some("daily signal quota exhausted"));
    }

    #[tokio::test]
    async fn test_advisory_mode_leaves_signals_active() {
        let mut config = test_config();
        config.auto_execute = false;
        let h = harness(config, false);

        let outcome = h.processor.tick(london_open()).await;
        assert_eq!(outcome.generated, 1);
        assert_eq!(outcome.executed, 0);

        let remaining = h.store.active_candidates(0.0, 10).unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_pair_candidate_expires() {
        let h = harness(test_config(), false);
        let stale = Signal::new("USDCHF", Direction::Buy, 90.0, 0.9000, Timeframe::H1, "external");
        h.store.insert(&stale).unwrap();

        h.processor.tick(london_open()).await;
        let loaded = h.store.get(stale.id).unwrap().unwrap();
        assert_eq!(loaded.status, SignalStatus::Expired);
    }
}
