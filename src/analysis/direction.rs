// Market direction analyzer
//
// Combines EMA stacking, swing structure, RSI, momentum and
// support/resistance proximity into a directional verdict with a 0-100
// confidence score. Deterministic for identical input: no randomness, no
// hidden state.

use tracing::debug;

use crate::indicators;
use crate::types::{Candle, MarketDirection, TradeAction};

const MIN_SERIES_LEN: usize = 50;
const ACTION_CONFIDENCE_FLOOR: f64 = 70.0;
const HTF_CONFIDENCE_CAP: f64 = 95.0;

/// Directional verdict with justification
#[derive(Debug, Clone)]
pub struct DirectionAnalysis {
    pub direction: MarketDirection,
    pub confidence: f64,
    pub recommended_action: TradeAction,
    pub reasoning: Vec<String>,
}

impl DirectionAnalysis {
    fn neutral(reason: &str) -> Self {
        DirectionAnalysis {
            direction: MarketDirection::Neutral,
            confidence: 50.0,
            recommended_action: TradeAction::Wait,
            reasoning: vec![reason.to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketDirectionAnalyzer {
    pub swing_lookback: usize,
}

impl Default for MarketDirectionAnalyzer {
    fn default() -> Self {
        Self { swing_lookback: 20 }
    }
}

impl MarketDirectionAnalyzer {
    pub fn new(swing_lookback: usize) -> Self {
        Self { swing_lookback }
    }

    /// Analyze a working-timeframe series, optionally merging a
    /// higher-timeframe verdict on top.
    pub fn analyze(
        &self,
        candles: &[Candle],
        current_price: f64,
        higher_tf: Option<&DirectionAnalysis>,
    ) -> DirectionAnalysis {
        if candles.len() < MIN_SERIES_LEN {
            return DirectionAnalysis::neutral("insufficient history for analysis");
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

        let ema20 = indicators::ema(&closes, 20);
        let ema50 = indicators::ema(&closes, 50);
        let ema200 = indicators::ema(&closes, 200);
        let rsi = indicators::rsi(&closes, 14);
        let momentum = indicators::momentum(&closes, 10);
        let atr = indicators::atr(candles, 14);

        let mut reasoning = Vec::new();

        // Base direction from EMA ordering
        let (mut direction, mut confidence): (_, f64) = match (ema20, ema50, ema200) {
            (Some(e20), Some(e50), Some(e200)) if e20 > e50 && e50 > e200 => {
                reasoning.push(format!(
                    "EMA stack bullish: EMA20 {:.5} > EMA50 {:.5} > EMA200 {:.5}",
                    e20, e50, e200
                ));
                (MarketDirection::Bullish, 75.0)
            }
            (Some(e20), Some(e50), Some(e200)) if e20 < e50 && e50 < e200 => {
                reasoning.push(format!(
                    "EMA stack bearish: EMA20 {:.5} < EMA50 {:.5} < EMA200 {:.5}",
                    e20, e50, e200
                ));
                (MarketDirection::Bearish, 75.0)
            }
            (Some(e20), Some(e50), _) if e20 > e50 => {
                reasoning.push(format!("EMA20 {:.5} above EMA50 {:.5}", e20, e50));
                (MarketDirection::Bullish, 60.0)
            }
            (Some(e20), Some(e50), _) if e20 < e50 => {
                reasoning.push(format!("EMA20 {:.5} below EMA50 {:.5}", e20, e50));
                (MarketDirection::Bearish, 60.0)
            }
            _ => {
                reasoning.push("EMAs give no clear ordering".to_string());
                (MarketDirection::Neutral, 50.0)
            }
        };

        if direction != MarketDirection::Neutral {
            // Swing structure agreement
            if let Some(structure) = self.swing_structure(&highs, &lows) {
                if structure == direction {
                    confidence += 15.0;
                    reasoning.push("swing structure confirms trend".to_string());
                } else {
                    confidence -= 20.0;
                    reasoning.push("swing structure contradicts trend".to_string());
                }
            }

            // RSI agreement / exhaustion
            if let Some(rsi) = rsi {
                match direction {
                    MarketDirection::Bullish if rsi >= 70.0 => {
                        confidence -= 15.0;
                        reasoning.push(format!("RSI {:.1} overbought", rsi));
                    }
                    MarketDirection::Bullish if rsi > 50.0 => {
                        confidence += 10.0;
                        reasoning.push(format!("RSI {:.1} supports upside", rsi));
                    }
                    MarketDirection::Bearish if rsi <= 30.0 => {
                        confidence -= 15.0;
                        reasoning.push(format!("RSI {:.1} oversold", rsi));
                    }
                    MarketDirection::Bearish if rsi < 50.0 => {
                        confidence += 10.0;
                        reasoning.push(format!("RSI {:.1} supports downside", rsi));
                    }
                    _ => {}
                }
            }

            // Momentum sign agreement
            if let Some(momentum) = momentum {
                let agrees = match direction {
                    MarketDirection::Bullish => momentum > 0.0,
                    MarketDirection::Bearish => momentum < 0.0,
                    MarketDirection::Neutral => false,
                };
                if agrees {
                    confidence += 5.0;
                    reasoning.push(format!("momentum {:+.2}% agrees", momentum));
                } else if momentum != 0.0 {
                    confidence -= 10.0;
                    reasoning.push(format!("momentum {:+.2}% contradicts", momentum));
                }
            }

            // Support/resistance proximity within 2x ATR
            if let Some(atr) = atr {
                let zone = 2.0 * atr;
                let resistance = indicators::swing_highs(&highs, self.swing_lookback)
                    .last()
                    .map(|&i| highs[i]);
                let support = indicators::swing_lows(&lows, self.swing_lookback)
                    .last()
                    .map(|&i| lows[i]);

                match direction {
                    MarketDirection::Bullish => {
                        if let Some(r) = resistance.filter(|r| *r > current_price && r - current_price <= zone) {
                            confidence -= 15.0;
                            reasoning.push(format!("resistance {:.5} within 2xATR overhead", r));
                        } else if let Some(s) = support.filter(|s| *s < current_price && current_price - s <= zone) {
                            confidence += 10.0;
                            reasoning.push(format!("holding above support {:.5}", s));
                        }
                    }
                    MarketDirection::Bearish => {
                        if let Some(s) = support.filter(|s| *s < current_price && current_price - s <= zone) {
                            confidence -= 15.0;
                            reasoning.push(format!("support {:.5} within 2xATR below", s));
                        } else if let Some(r) = resistance.filter(|r| *r > current_price && r - current_price <= zone) {
                            confidence += 10.0;
                            reasoning.push(format!("rejected under resistance {:.5}", r));
                        }
                    }
                    MarketDirection::Neutral => {}
                }
            }
        }

        confidence = confidence.clamp(0.0, 100.0);

        let mut action = match direction {
            _ if confidence < ACTION_CONFIDENCE_FLOOR => TradeAction::Wait,
            MarketDirection::Bullish => TradeAction::Buy,
            MarketDirection::Bearish => TradeAction::Sell,
            MarketDirection::Neutral => TradeAction::Wait,
        };

        // Higher-timeframe merge: agreement nudges up, disagreement vetoes
        if let Some(htf) = higher_tf {
            if htf.direction != MarketDirection::Neutral && direction != MarketDirection::Neutral {
                if htf.direction == direction {
                    confidence = (confidence + 10.0).min(HTF_CONFIDENCE_CAP);
                    reasoning.push("higher timeframe agrees".to_string());
                } else {
                    confidence = (confidence - 20.0).clamp(0.0, 100.0);
                    action = TradeAction::Wait;
                    reasoning.push("higher timeframe disagrees, standing aside".to_string());
                }
            }
        }

        // Re-check the floor after the HTF adjustment
        if confidence < ACTION_CONFIDENCE_FLOOR {
            action = TradeAction::Wait;
        }

        debug!(?direction, confidence, ?action, "direction analysis complete");

        DirectionAnalysis {
            direction,
            confidence,
            recommended_action: action,
            reasoning,
        }
    }

    /// Classify the most recent swing structure: higher-highs/higher-lows is
    /// bullish, lower-highs/lower-lows is bearish, anything mixed is None.
    fn swing_structure(&self, highs: &[f64], lows: &[f64]) -> Option<MarketDirection> {
        let swing_highs = indicators::swing_highs(highs, self.swing_lookback);
        let swing_lows = indicators::swing_lows(lows, self.swing_lookback);
        if swing_highs.len() < 2 || swing_lows.len() < 2 {
            return None;
        }

        let (h1, h2) = (
            highs[swing_highs[swing_highs.len() - 2]],
            highs[swing_highs[swing_highs.len() - 1]],
        );
        let (l1, l2) = (
            lows[swing_lows[swing_lows.len() - 2]],
            lows[swing_lows[swing_lows.len() - 1]],
        );

        if h2 > h1 && l2 > l1 {
            Some(MarketDirection::Bullish)
        } else if h2 < h1 && l2 < l1 {
            Some(MarketDirection::Bearish)
        } else {
            None
        }
    }
}

/// Confidence-weighted aggregate over per-timeframe analyses, used by the
/// hedge manager to reassess directional bias.
pub fn aggregate_timeframes(analyses: &[DirectionAnalysis]) -> DirectionAnalysis {
    if analyses.is_empty() {
        return DirectionAnalysis::neutral("no timeframe analyses supplied");
    }

    let mut bullish = 0.0;
    let mut bearish = 0.0;
    for analysis in analyses {
        match analysis.direction {
            MarketDirection::Bullish => bullish += analysis.confidence,
            MarketDirection::Bearish => bearish += analysis.confidence,
            MarketDirection::Neutral => {}
        }
    }

    let (direction, weight) = if bullish > bearish {
        (MarketDirection::Bullish, bullish)
    } else if bearish > bullish {
        (MarketDirection::Bearish, bearish)
    } else {
        return DirectionAnalysis::neutral("timeframes are balanced");
    };

    let total: f64 = analyses.iter().map(|a| a.confidence).sum();
    let confidence = (weight / total * 100.0).clamp(0.0, 100.0);

    let action = match direction {
        _ if confidence < ACTION_CONFIDENCE_FLOOR => TradeAction::Wait,
        MarketDirection::Bullish => TradeAction::Buy,
        MarketDirection::Bearish => TradeAction::Sell,
        MarketDirection::Neutral => TradeAction::Wait,
    };

    DirectionAnalysis {
        direction,
        confidence,
        recommended_action: action,
        reasoning: vec![format!(
            "{} of {} timeframes aligned",
            analyses
                .iter()
                .filter(|a| a.direction == direction)
                .count(),
            analyses.len()
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    /// Rising zigzag: a clear uptrend that still prints swing highs and lows
    fn rising_zigzag(len: usize) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(len as i64);
        (0..len)
            .map(|i| {
                let trend = 1.0800 + i as f64 * 0.0004;
                // 50-bar sawtooth so swings clear the 20-bar lookback windows
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

    fn falling_zigzag(len: usize) -> Vec<Candle> {
        let rising = rising_zigzag(len);
        rising
            .into_iter()
            .map(|c| Candle {
                open: 2.2 - c.open,
                high: 2.2 - c.low,
                low: 2.2 - c.high,
                close: 2.2 - c.close,
                ..c
            })
            .collect()
    }

    #[test]
    fn test_bullish_stack_recommends_buy() {
        let candles = rising_zigzag(300);
        let price = candles.last().unwrap().close;
        let analyzer = MarketDirectionAnalyzer::default();
        let result = analyzer.analyze(&candles, price, None);

        assert_eq!(result.direction, MarketDirection::Bullish);
        assert!(result.confidence >= 75.0, "confidence {}", result.confidence);
        assert_eq!(result.recommended_action, TradeAction::Buy);
        assert!(!result.reasoning.is_empty());
    }

    #[test]
    fn test_bearish_stack_recommends_sell() {
        let candles = falling_zigzag(300);
        let price = candles.last().unwrap().close;
        let analyzer = MarketDirectionAnalyzer::default();
        let result = analyzer.analyze(&candles, price, None);

        assert_eq!(result.direction, MarketDirection::Bearish);
        assert_eq!(result.recommended_action, TradeAction::Sell);
    }

    #[test]
    fn test_determinism() {
        let candles = rising_zigzag(300);
        let price = candles.last().unwrap().close;
        let analyzer = MarketDirectionAnalyzer::default();
        let first = analyzer.analyze(&candles, price, None);
        let second = analyzer.analyze(&candles, price, None);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.direction, second.direction);
        assert_eq!(first.reasoning, second.reasoning);
    }

    #[test]
    fn test_short_series_is_neutral() {
        let candles = rising_zigzag(30);
        let analyzer = MarketDirectionAnalyzer::default();
        let result = analyzer.analyze(&candles, 1.08, None);
        assert_eq!(result.direction, MarketDirection::Neutral);
        assert_eq!(result.recommended_action, TradeAction::Wait);
    }

    #[test]
    fn test_htf_disagreement_forces_wait() {
        let candles = rising_zigzag(300);
        let price = candles.last().unwrap().close;
        let analyzer = MarketDirectionAnalyzer::default();

        let htf = DirectionAnalysis {
            direction: MarketDirection::Bearish,
            confidence: 80.0,
            recommended_action: TradeAction::Sell,
            reasoning: vec![],
        };
        let result = analyzer.analyze(&candles, price, Some(&htf));
        assert_eq!(result.recommended_action, TradeAction::Wait);

        let baseline = analyzer.analyze(&candles, price, None);
        assert!(result.confidence <= baseline.confidence - 20.0 + 1e-9);
    }

    #[test]
    fn test_htf_agreement_caps_at_95() {
        let candles = rising_zigzag(300);
        let price = candles.last().unwrap().close;
        let analyzer = MarketDirectionAnalyzer::default();

        let htf = DirectionAnalysis {
            direction: MarketDirection::Bullish,
            confidence: 90.0,
            recommended_action: TradeAction::Buy,
            reasoning: vec![],
        };
        let result = analyzer.analyze(&candles, price, Some(&htf));
        assert!(result.confidence <= 95.0);
    }

    #[test]
    fn test_aggregate_prefers_weighted_majority() {
        let bullish = DirectionAnalysis {
            direction: MarketDirection::Bullish,
            confidence: 80.0,
            recommended_action: TradeAction::Buy,
            reasoning: vec![],
        };
        let bearish = DirectionAnalysis {
            direction: MarketDirection::Bearish,
            confidence: 60.0,
            recommended_action: TradeAction::Sell,
            reasoning: vec![],
        };

        let result = aggregate_timeframes(&[bullish.clone(), bullish, bearish]);
        assert_eq!(result.direction, MarketDirection::Bullish);
        assert!(result.confidence > 70.0);
        assert_eq!(result.recommended_action, TradeAction::Buy);
    }

    #[test]
    fn test_aggregate_empty_is_neutral() {
        let result = aggregate_timeframes(&[]);
        assert_eq!(result.direction, MarketDirection::Neutral);
        assert_eq!(result.recommended_action, TradeAction::Wait);
    }
}
