// Order manager
//
// The only path through which positions are opened or closed. Every entry
// passes the full risk gate against a fresh account snapshot; a risk refusal
// is an error returned to the caller, never a log line that execution walks
// past. Position sizing caps the requested volume, it never raises it.

use chrono::{Datelike, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::RiskConfig;
use crate::db::TradingJournal;
use crate::error::{TradingError, TradingResult};
use crate::gateway::{BrokerGateway, OrderRequest};
use crate::types::{pip_size, Direction, Position, LOT_UNITS};

/// Outcome of a close-everything sweep. Failures never abort the sweep;
/// every ticket gets its attempt.
#[derive(Debug, Clone, Default)]
pub struct CloseReport {
    pub succeeded: Vec<u64>,
    pub failed: Vec<(u64, String)>,
}

impl CloseReport {
    pub fn into_result(self) -> TradingResult<Vec<u64>> {
        if self.failed.is_empty() {
            Ok(self.succeeded)
        } else {
            Err(TradingError::PartialFailure {
                succeeded: self.succeeded,
                failed: self.failed,
            })
        }
    }
}

pub struct OrderManager {
    gateway: Arc<dyn BrokerGateway>,
    risk: RiskConfig,
    journal: Arc<TradingJournal>,
    auto_trading: Arc<AtomicBool>,
}

impl OrderManager {
    pub fn new(
        gateway: Arc<dyn BrokerGateway>,
        risk: RiskConfig,
        journal: Arc<TradingJournal>,
    ) -> Self {
        Self {
            gateway,
            risk,
            journal,
            auto_trading: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn auto_trading_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.auto_trading)
    }

    pub fn is_auto_trading(&self) -> bool {
        self.auto_trading.load(Ordering::SeqCst)
    }

    /// Run the full risk gate and submit the order. Returns the broker
    /// ticket on success.
    pub async fn execute_order(&self, request: &OrderRequest) -> TradingResult<u64> {
        if !self.auto_trading.load(Ordering::SeqCst) {
            return Err(TradingError::RiskViolation(
                "trading is halted (emergency stop engaged)".to_string(),
            ));
        }
        if !self.gateway.is_connected().await {
            return Err(TradingError::NotConnected);
        }

        // Risk decisions are only made against a fresh snapshot
        let account = self
            .gateway
            .account_info()
            .await
            .ok_or_else(|| TradingError::StaleData("account snapshot unavailable".to_string()))?;
        let quote = self
            .gateway
            .current_price(&request.symbol)
            .await
            .ok_or_else(|| TradingError::StaleData(format!("no quote for {}", request.symbol)))?;

        let entry_price = match request.direction {
            Direction::Buy => quote.ask,
            Direction::Sell => quote.bid,
        };

        if self.risk.require_stop_loss && request.stop_loss.is_none() {
            return Err(TradingError::RiskViolation(
                "order has no stop-loss and stops are mandatory".to_string(),
            ));
        }
        if self.risk.require_take_profit && request.take_profit.is_none() {
            return Err(TradingError::RiskViolation(
                "order has no take-profit and targets are mandatory".to_string(),
            ));
        }

        let notional = request.volume * LOT_UNITS * entry_price;
        if notional > self.risk.max_position_notional {
            return Err(TradingError::RiskViolation(format!(
                "notional {:.0} exceeds cap {:.0}",
                notional, self.risk.max_position_notional
            )));
        }

        self.check_daily_loss(account.balance)?;
        self.check_portfolio_risk(&account, notional)?;

        let volume = self.sized_volume(request, &account, entry_price);
        if volume <= 0.0 {
            return Err(TradingError::RiskViolation(
                "position size rounds to zero under current risk limits".to_string(),
            ));
        }

        let sized = OrderRequest {
            volume,
            ..request.clone()
        };
        let ticket = self.gateway.place_order(&sized).await?;
        info!(
            ticket,
            symbol = %sized.symbol,
            direction = sized.direction.as_str(),
            volume = sized.volume,
            entry_price,
            "order executed"
        );

        if let Err(e) = self.journal.record_entry(
            ticket,
            &sized.symbol,
            sized.direction,
            sized.volume,
            entry_price,
            sized.stop_loss,
            sized.take_profit,
            &sized.comment,
        ) {
            // The position is live; a journal failure must not unwind it
            error!(ticket, error = %e, "failed to journal order entry");
        }

        Ok(ticket)
    }

    /// Position size from the per-trade risk budget and the stop distance,
    /// capped at the requested volume. Without a stop the requested volume
    /// stands as-is (the stop mandate is enforced separately).
    fn sized_volume(&self, request: &OrderRequest, account: &crate::types::AccountInfo, entry_price: f64) -> f64 {
        let stop_loss = match request.stop_loss {
            Some(sl) => sl,
            None => return request.volume,
        };
        let stop_distance = (entry_price - stop_loss).abs();
        if stop_distance <= 0.0 {
            return request.volume;
        }

        let risk_amount = account.balance * self.risk.max_risk_per_trade_pct / 100.0;
        let risk_volume = risk_amount / (stop_distance * pip_size(&request.symbol) * LOT_UNITS);
        request.volume.min(risk_volume)
    }

    /// Daily-loss circuit breaker over realized PnL for the current UTC day
    fn check_daily_loss(&self, balance: f64) -> TradingResult<()> {
        let now = Utc::now();
        let day_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .unwrap();
        let realized = self.journal.realized_pnl_since(day_start)?;

        let limit = balance * self.risk.max_daily_loss_pct / 100.0;
        if realized < 0.0 && realized.abs() > limit {
            return Err(TradingError::RiskViolation(format!(
                "daily loss {:.2} exceeds the cap {:.2}",
                realized.abs(),
                limit
            )));
        }
        Ok(())
    }

    /// Portfolio margin check: the margin the new position would add, on top
    /// of what is already committed, as a share of equity
    fn check_portfolio_risk(
        &self,
        account: &crate::types::AccountInfo,
        notional: f64,
    ) -> TradingResult<()> {
        if account.equity <= 0.0 {
            return Err(TradingError::RiskViolation("account equity is zero".to_string()));
        }
        let required_margin = notional / account.leverage.max(1) as f64;
        let exposure_pct = (account.margin + required_margin) / account.equity * 100.0;
        if exposure_pct > self.risk.max_portfolio_risk_pct {
            return Err(TradingError::RiskViolation(format!(
                "portfolio exposure {:.1}% would exceed cap {:.1}%",
                exposure_pct, self.risk.max_portfolio_risk_pct
            )));
        }
        Ok(())
    }

    /// Close one position and journal the exit. Returns false when the
    /// broker no longer knows the ticket (already closed), which is a no-op.
    pub async fn close_position(&self, ticket: u64) -> TradingResult<bool> {
        let position = self.position_by_ticket(ticket).await;

        let closed = self.gateway.close_position(ticket).await?;
        if !closed {
            warn!(ticket, "close requested for a position the broker no longer holds");
            return Ok(false);
        }

        if let Some(pos) = position {
            let exit_price = self
                .gateway
                .current_price(&pos.symbol)
                .await
                .map(|q| match pos.direction {
                    Direction::Buy => q.bid,
                    Direction::Sell => q.ask,
                })
                .unwrap_or(pos.open_price);
            if let Err(e) = self.journal.record_exit(ticket, exit_price, pos.profit) {
                error!(ticket, error = %e, "failed to journal position exit");
            }
            info!(ticket, symbol = %pos.symbol, pnl = pos.profit, "position closed");
        } else {
            info!(ticket, "position closed (no snapshot held for journal)");
        }

        Ok(true)
    }

    /// Close every open position, continuing past individual failures
    pub async fn close_all_positions(&self) -> CloseReport {
        let positions = self.gateway.positions().await;
        let mut report = CloseReport::default();

        for position in positions {
            match self.close_position(position.ticket).await {
                Ok(_) => report.succeeded.push(position.ticket),
                Err(e) => {
                    error!(ticket = position.ticket, error = %e, "close failed during sweep");
                    report.failed.push((position.ticket, e.to_string()));
                }
            }
        }
        report
    }

    /// Halt trading first, then flatten. The halt takes effect even when
    /// every close fails.
    pub async fn emergency_stop(&self) -> CloseReport {
        self.auto_trading.store(false, Ordering::SeqCst);
        warn!("emergency stop engaged, auto trading halted");
        self.close_all_positions().await
    }

    pub fn resume_trading(&self) {
        self.auto_trading.store(true, Ordering::SeqCst);
        info!("auto trading resumed");
    }

    async fn position_by_ticket(&self, ticket: u64) -> Option<Position> {
        self.gateway
            .positions()
            .await
            .into_iter()
            .find(|p| p.ticket == ticket)
    }
}
