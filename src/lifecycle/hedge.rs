// Hedge resolution
//
// A hedge pair is one BUY and one SELL open on the same symbol. Pairs are
// re-derived from the live position list every cycle and never cached across
// cycles; net profit is always the sum of both legs as they stand right now.
// Evaluation produces advisory decisions; nothing closes until
// execute_decision is called, and that call re-fetches positions first so it
// never acts on a stale snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, info, warn};

use crate::analysis::{aggregate_timeframes, DirectionAnalysis, MarketDirectionAnalyzer};
use crate::config::HedgeConfig;
use crate::gateway::BrokerGateway;
use crate::orders::OrderManager;
use crate::types::{Direction, MarketDirection, Position, Timeframe};

const ANALYSIS_TIMEFRAMES: [Timeframe; 2] = [Timeframe::H1, Timeframe::H4];
const CANDLE_HISTORY: usize = 300;

/// One BUY and one SELL on the same symbol, as found this cycle
#[derive(Debug, Clone)]
pub struct HedgePair {
    pub symbol: String,
    pub buy: Position,
    pub sell: Position,
}

impl HedgePair {
    pub fn net_profit(&self) -> f64 {
        self.buy.profit + self.sell.profit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HedgeDecision {
    CloseBuy,
    CloseSell,
    CloseBoth,
    Wait,
}

/// Advisory outcome for one pair; inert until executed
#[derive(Debug, Clone)]
pub struct HedgeAssessment {
    pub pair: HedgePair,
    pub decision: HedgeDecision,
    pub reasoning: String,
}

/// Group open positions into true hedge pairs. Symbols with only one side
/// are skipped; extra same-side positions beyond the first are ignored.
pub fn find_hedge_pairs(positions: &[Position]) -> Vec<HedgePair> {
    let mut by_symbol: HashMap<&str, (Option<&Position>, Option<&Position>)> = HashMap::new();
    for position in positions {
        let entry = by_symbol.entry(position.symbol.as_str()).or_default();
        match position.direction {
            Direction::Buy => entry.0 = entry.0.or(Some(position)),
            Direction::Sell => entry.1 = entry.1.or(Some(position)),
        }
    }

    let mut pairs: Vec<HedgePair> = by_symbol
        .into_iter()
        .filter_map(|(symbol, (buy, sell))| {
            Some(HedgePair {
                symbol: symbol.to_string(),
                buy: buy?.clone(),
                sell: sell?.clone(),
            })
        })
        .collect();
    pairs.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    pairs
}

/// Decision table for one pair given the market's current direction
pub fn evaluate_pair(
    pair: &HedgePair,
    analysis: &DirectionAnalysis,
    config: &HedgeConfig,
) -> HedgeAssessment {
    let net = pair.net_profit();

    let (decision, reasoning) = if analysis.confidence >= config.strong_confidence
        && analysis.direction == MarketDirection::Bullish
    {
        (
            HedgeDecision::CloseSell,
            format!(
                "strongly bullish ({:.0}): release the SELL leg, let the BUY run",
                analysis.confidence
            ),
        )
    } else if analysis.confidence >= config.strong_confidence
        && analysis.direction == MarketDirection::Bearish
    {
        (
            HedgeDecision::CloseBuy,
            format!(
                "strongly bearish ({:.0}): release the BUY leg, let the SELL run",
                analysis.confidence
            ),
        )
    } else if net >= config.min_net_profit {
        (
            HedgeDecision::CloseBoth,
            format!("net profit {:.2} above threshold {:.2}", net, config.min_net_profit),
        )
    } else if let Some(weaker) = weaker_leg(pair, config.weak_leg_ratio) {
        (
            weaker,
            "one leg dominates, close the weaker to release margin".to_string(),
        )
    } else {
        (HedgeDecision::Wait, "no resolution condition met".to_string())
    };

    HedgeAssessment {
        pair: pair.clone(),
        decision,
        reasoning,
    }
}

/// When the stronger leg's profit is at least `ratio` times the weaker's,
/// name the weaker leg for closure. Only applies when the stronger leg is
/// actually in profit.
fn weaker_leg(pair: &HedgePair, ratio: f64) -> Option<HedgeDecision> {
    let (buy, sell) = (pair.buy.profit, pair.sell.profit);
    if buy > 0.0 && buy >= ratio * sell.abs() && buy > sell {
        Some(HedgeDecision::CloseSell)
    } else if sell > 0.0 && sell >= ratio * buy.abs() && sell > buy {
        Some(HedgeDecision::CloseBuy)
    } else {
        None
    }
}

pub struct HedgeManager {
    gateway: Arc<dyn BrokerGateway>,
    orders: Arc<OrderManager>,
    analyzer: MarketDirectionAnalyzer,
    config: HedgeConfig,
}

impl HedgeManager {
    pub fn new(gateway: Arc<dyn BrokerGateway>, orders: Arc<OrderManager>, config: HedgeConfig) -> Self {
        Self {
            gateway,
            orders,
            analyzer: MarketDirectionAnalyzer::default(),
            config,
        }
    }

    /// Evaluate and resolve forever at the configured cadence
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("hedge manager disabled by configuration");
            return;
        }
        let mut ticker = interval(TokioDuration::from_secs(self.config.evaluate_interval_secs.max(1)));
        loop {
            ticker.tick().await;
            for assessment in self.evaluate_all().await {
                if assessment.decision != HedgeDecision::Wait {
                    if let Err(e) = self.execute_decision(&assessment).await {
                        warn!(symbol = %assessment.pair.symbol, error = %e, "hedge resolution failed");
                    }
                }
            }
        }
    }

    /// Advisory pass: find pairs and decide, without closing anything
    pub async fn evaluate_all(&self) -> Vec<HedgeAssessment> {
        let positions = self.gateway.positions().await;
        let pairs = find_hedge_pairs(&positions);
        let mut assessments = Vec::with_capacity(pairs.len());

        for pair in pairs {
            let analysis = self.market_view(&pair.symbol).await;
            let assessment = evaluate_pair(&pair, &analysis, &self.config);
            debug!(
                symbol = %pair.symbol,
                decision = ?assessment.decision,
                net = pair.net_profit(),
                reasoning = %assessment.reasoning,
                "hedge pair evaluated"
            );
            assessments.push(assessment);
        }
        assessments
    }

    /// Multi-timeframe direction aggregate for the pair's symbol
    async fn market_view(&self, symbol: &str) -> DirectionAnalysis {
        let quote = self.gateway.current_price(symbol).await;
        let mut analyses = Vec::new();

        for tf in ANALYSIS_TIMEFRAMES {
            let candles = self.gateway.historical_candles(symbol, tf, CANDLE_HISTORY).await;
            if candles.is_empty() {
                continue;
            }
            let price = quote
                .as_ref()
                .map(|q| (q.bid + q.ask) / 2.0)
                .unwrap_or_else(|| candles.last().map(|c| c.close).unwrap_or(0.0));
            analyses.push(self.analyzer.analyze(&candles, price, None));
        }

        if analyses.is_empty() {
            return DirectionAnalysis {
                direction: MarketDirection::Neutral,
                confidence: 50.0,
                recommended_action: crate::types::TradeAction::Wait,
                reasoning: vec!["no candle history".to_string()],
            };
        }
        aggregate_timeframes(&analyses)
    }

    /// Close the legs named by the decision. Positions are re-fetched here;
    /// a leg that vanished since evaluation is tolerated as already closed.
    pub async fn execute_decision(&self, assessment: &HedgeAssessment) -> crate::error::TradingResult<()> {
        let live = self.gateway.positions().await;
        let still_open = |ticket: u64| live.iter().any(|p| p.ticket == ticket);

        let tickets: Vec<u64> = match assessment.decision {
            HedgeDecision::CloseBuy => vec![assessment.pair.buy.ticket],
            HedgeDecision::CloseSell => vec![assessment.pair.sell.ticket],
            HedgeDecision::CloseBoth => {
                vec![assessment.pair.buy.ticket, assessment.pair.sell.ticket]
            }
            HedgeDecision::Wait => return Ok(()),
        };

        for ticket in tickets {
            if !still_open(ticket) {
                debug!(ticket, "hedge leg already gone, skipping");
                continue;
            }
            let closed = self.orders.close_position(ticket).await?;
            if closed {
                info!(
                    ticket,
                    symbol = %assessment.pair.symbol,
                    reasoning = %assessment.reasoning,
                    "hedge leg closed"
                );
            }
        }
        Ok(())
    }
}
