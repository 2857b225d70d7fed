// Partial profit ladder
//
// Each supervised position gets one target set, keyed by ticket, holding the
// original volume and the initial stop distance (1R). Rungs fire at most
// once: partial closes are sized from the original volume so repeated ticks
// and rounding never compound. Stop moves are monotonic in the trade's
// favor; a BUY's stop never moves down, a SELL's never up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, info, warn};

use crate::config::PartialProfitConfig;
use crate::gateway::BrokerGateway;
use crate::types::{Direction, Position};

const LOT_STEP: f64 = 0.01;

#[derive(Debug, Clone)]
struct Rung {
    r_target: f64,
    close_pct: f64,
    fired: bool,
}

#[derive(Debug, Clone)]
struct TargetSet {
    symbol: String,
    direction: Direction,
    entry_price: f64,
    original_volume: f64,
    risk_per_unit: f64, // initial stop distance in price terms (1R)
    current_stop: f64,
    take_profit: Option<f64>,
    rungs: Vec<Rung>,
    moved_breakeven: bool,
    moved_stop_to_1r: bool,
}

impl TargetSet {
    fn from_position(position: &Position, ladder: &[crate::config::LadderRung]) -> Option<Self> {
        let stop = position.stop_loss?;
        let risk = (position.open_price - stop).abs();
        if risk <= 0.0 {
            return None;
        }
        Some(TargetSet {
            symbol: position.symbol.clone(),
            direction: position.direction,
            entry_price: position.open_price,
            original_volume: position.volume,
            risk_per_unit: risk,
            current_stop: stop,
            take_profit: position.take_profit,
            rungs: ladder
                .iter()
                .map(|r| Rung {
                    r_target: r.r_target,
                    close_pct: r.close_pct,
                    fired: false,
                })
                .collect(),
            moved_breakeven: false,
            moved_stop_to_1r: false,
        })
    }

    /// Current R-multiple for the position at `price`
    fn r_multiple(&self, price: f64) -> f64 {
        let favorable = match self.direction {
            Direction::Buy => price - self.entry_price,
            Direction::Sell => self.entry_price - price,
        };
        favorable / self.risk_per_unit
    }

    /// Price level `r` multiples in the trade's favor
    fn price_at_r(&self, r: f64) -> f64 {
        match self.direction {
            Direction::Buy => self.entry_price + r * self.risk_per_unit,
            Direction::Sell => self.entry_price - r * self.risk_per_unit,
        }
    }

    /// A candidate stop is accepted only when it improves on the current one
    fn improved_stop(&self, candidate: f64) -> Option<f64> {
        let better = match self.direction {
            Direction::Buy => candidate > self.current_stop,
            Direction::Sell => candidate < self.current_stop,
        };
        better.then_some(candidate)
    }
}

pub struct PartialProfitManager {
    gateway: Arc<dyn BrokerGateway>,
    config: PartialProfitConfig,
    targets: Mutex<HashMap<u64, TargetSet>>,
}

impl PartialProfitManager {
    pub fn new(gateway: Arc<dyn BrokerGateway>, config: PartialProfitConfig) -> Self {
        Self {
            gateway,
            config,
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// Monitor forever at the configured cadence
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.config.monitor_interval_secs.max(1)));
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One supervision pass over every open position
    pub async fn tick(&self) {
        let positions = self.gateway.positions().await;

        // Drop target sets for positions the broker no longer holds
        {
            let mut targets = self.targets.lock().unwrap();
            let open: Vec<u64> = positions.iter().map(|p| p.ticket).collect();
            targets.retain(|ticket, _| open.contains(ticket));
        }

        for position in &positions {
            let target = {
                let mut targets = self.targets.lock().unwrap();
                if !targets.contains_key(&position.ticket) {
                    match TargetSet::from_position(position, &self.config.ladder) {
                        Some(set) => {
                            debug!(
                                ticket = position.ticket,
                                symbol = %position.symbol,
                                risk = set.risk_per_unit,
                                "target set assigned"
                            );
                            targets.insert(position.ticket, set);
                        }
                        None => {
                            debug!(ticket = position.ticket, "no stop-loss, position not supervised");
                            continue;
                        }
                    }
                }
                targets.get(&position.ticket).cloned().unwrap()
            };

            let quote = match self.gateway.current_price(&position.symbol).await {
                Some(q) => q,
                None => continue,
            };
            let price = match position.direction {
                Direction::Buy => quote.bid,
                Direction::Sell => quote.ask,
            };

            self.supervise(position.ticket, target, price).await;
        }
    }

    async fn supervise(&self, ticket: u64, mut target: TargetSet, price: f64) {
        let r = target.r_multiple(price);

        // Ladder rungs, each at most once, sized from original volume
        for i in 0..target.rungs.len() {
            if target.rungs[i].fired || r < target.rungs[i].r_target {
                continue;
            }
            let volume = round_lot(target.original_volume * target.rungs[i].close_pct / 100.0);
            if volume < LOT_STEP {
                target.rungs[i].fired = true;
                continue;
            }
            match self.gateway.close_position_partial(ticket, volume).await {
                Ok(_) => {
                    target.rungs[i].fired = true;
                    info!(
                        ticket,
                        r_target = target.rungs[i].r_target,
                        volume,
                        "ladder rung fired"
                    );
                }
                Err(e) => {
                    // Left unfired so the next tick retries
                    warn!(ticket, error = %e, "partial close failed");
                }
            }
        }

        // Breakeven at 1R, once
        if r >= 1.0 && !target.moved_breakeven {
            let entry_price = target.entry_price;
            if self.move_stop(ticket, &mut target, entry_price).await {
                target.moved_breakeven = true;
            }
        }

        // Stop to the 1R level at 2R, once
        if r >= 2.0 && !target.moved_stop_to_1r {
            let level = target.price_at_r(1.0);
            if self.move_stop(ticket, &mut target, level).await {
                target.moved_stop_to_1r = true;
            }
        }

        // Trailing stop beyond 2R
        if self.config.trailing_enabled && r >= 2.0 {
            let trail = match target.direction {
                Direction::Buy => price - self.config.trailing_distance_r * target.risk_per_unit,
                Direction::Sell => price + self.config.trailing_distance_r * target.risk_per_unit,
            };
            self.move_stop(ticket, &mut target, trail).await;
        }

        self.targets.lock().unwrap().insert(ticket, target);
    }

    /// Apply a stop move if it is an improvement; returns whether it stuck
    async fn move_stop(&self, ticket: u64, target: &mut TargetSet, candidate: f64) -> bool {
        let Some(new_stop) = target.improved_stop(candidate) else {
            return true; // already at or beyond the level, nothing to do
        };
        match self
            .gateway
            .modify_position(ticket, Some(new_stop), target.take_profit)
            .await
        {
            Ok(()) => {
                info!(ticket, new_stop, "stop-loss tightened");
                target.current_stop = new_stop;
                true
            }
            Err(e) => {
                warn!(ticket, error = %e, "stop modification failed");
                false
            }
        }
    }

    #[cfg(test)]
    fn stop_for(&self, ticket: u64) -> Option<f64> {
        self.targets.lock().unwrap().get(&ticket).map(|t| t.current_stop)
    }
}

fn round_lot(volume: f64) -> f64 {
    (volume / LOT_STEP).round() * LOT_STEP
}
