// Trading filters
//
// Independently togglable gates ANDed into one canTrade verdict. Each gate
// records a human-readable reason when it blocks, so operators see "why not"
// instead of a bare refusal.

pub mod killzone;
pub mod news;

pub use killzone::{default_killzones, Killzone};
pub use news::{check_blackout, HttpNewsFeed, NewsBlackout, NewsCalendar, NewsFeed};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::config::FilterConfig;
use crate::types::Candle;

/// Aggregate filter outcome for one symbol at one instant
#[derive(Debug, Clone)]
pub struct FilterVerdict {
    pub can_trade: bool,
    pub blocked_by: Vec<String>,
    pub reasons: Vec<String>,
    pub active_killzone: Option<String>,
    pub recommended_pairs: Vec<String>,
}

impl FilterVerdict {
    fn pass() -> Self {
        FilterVerdict {
            can_trade: true,
            blocked_by: Vec::new(),
            reasons: Vec::new(),
            active_killzone: None,
            recommended_pairs: Vec::new(),
        }
    }

    fn block(&mut self, gate: &str, reason: String) {
        self.can_trade = false;
        self.blocked_by.push(gate.to_string());
        self.reasons.push(reason);
    }
}

/// Sentiment score in [0, 100] from recent candle behaviour: the share of
/// bullish closes plus a momentum tilt. 50 is neutral.
pub fn sentiment_score(candles: &[Candle]) -> Option<f64> {
    const WINDOW: usize = 20;
    if candles.len() < WINDOW {
        return None;
    }

    let window = &candles[candles.len() - WINDOW..];
    let bullish = window.iter().filter(|c| c.close > c.open).count() as f64;
    let ratio = bullish / WINDOW as f64;

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let tilt = crate::indicators::momentum(&closes, 10)
        .map(|m| m.clamp(-2.0, 2.0) * 10.0)
        .unwrap_or(0.0);

    Some((50.0 + (ratio - 0.5) * 60.0 + tilt).clamp(0.0, 100.0))
}

pub struct TradingFilters {
    config: FilterConfig,
    killzones: Vec<Killzone>,
    news: Arc<NewsCalendar>,
}

impl TradingFilters {
    pub fn new(config: FilterConfig, killzones: Vec<Killzone>, news: Arc<NewsCalendar>) -> Self {
        Self { config, killzones, news }
    }

    pub fn with_default_killzones(config: FilterConfig, news: Arc<NewsCalendar>) -> Self {
        Self::new(config, default_killzones(), news)
    }

    /// Evaluate every enabled gate for the symbol. The news cache is
    /// refreshed first when stale; refresh failures fail open inside the
    /// calendar itself.
    pub async fn can_trade_now(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
        sentiment: Option<f64>,
    ) -> FilterVerdict {
        let mut verdict = FilterVerdict::pass();

        // Killzone gate
        if self.config.killzones_enabled {
            let active = self
                .killzones
                .iter()
                .filter(|k| k.enabled)
                .find(|k| k.contains(now));

            match active {
                Some(kz) => {
                    verdict.active_killzone = Some(kz.name.clone());
                    verdict.recommended_pairs = kz.best_pairs.clone();
                }
                None => {
                    verdict.block(
                        "killzone",
                        format!("{} UTC is outside every configured killzone", now.format("%H:%M")),
                    );
                }
            }
        }

        // News blackout gate
        if self.config.news_blackout_enabled {
            self.news.refresh_if_stale(now).await;
            if let Some(blackout) = self.news.blackout_for(symbol, now).await {
                verdict.block(
                    "news",
                    format!(
                        "{} {} in {} min ({})",
                        blackout.event.currency,
                        blackout.event.title,
                        blackout.minutes_until,
                        blackout.event.impact.as_str()
                    ),
                );
            }
        }

        // Sentiment gate
        if self.config.sentiment_enabled {
            if let Some(score) = sentiment {
                if score < self.config.sentiment_floor {
                    verdict.block(
                        "sentiment",
                        format!(
                            "sentiment {:.0} below floor {:.0}",
                            score, self.config.sentiment_floor
                        ),
                    );
                }
            }
        }

        debug!(
            symbol,
            can_trade = verdict.can_trade,
            blocked_by = ?verdict.blocked_by,
            "filter evaluation"
        );
        verdict
    }

    /// Execution-time gate, separate from the main aggregate: blocks entry
    /// when the spread or volatility is out of bounds right now.
    pub fn execution_gate(&self, symbol: &str, spread_pips: f64, atr_pips: f64) -> Result<(), String> {
        if spread_pips > self.config.max_spread_pips {
            return Err(format!(
                "{} spread {:.1} pips above cap {:.1}",
                symbol, spread_pips, self.config.max_spread_pips
            ));
        }
        if atr_pips > self.config.max_atr_pips {
            return Err(format!(
                "{} ATR {:.1} pips above cap {:.1}",
                symbol, atr_pips, self.config.max_atr_pips
            ));
        }
        Ok(())
    }

    pub fn news_calendar(&self) -> Arc<NewsCalendar> {
        Arc::clone(&self.news)
    }
}
