// Signal pipeline
//
// Sizing lives here as pure functions so the processor stays testable
// without a gateway. The computed volume is always clamped to the configured
// lot bounds; no code path can submit outside [min_lot, max_lot].

pub mod processor;

pub use processor::{SignalProcessor, TickOutcome};

use chrono::{DateTime, Timelike, Utc};

use crate::config::SignalConfig;
use crate::types::Signal;

const MAJORS: [&str; 7] = [
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD",
];

/// Confidence threshold in effect right now. Optimal hours may lower the
/// configured floor, never raise it.
pub fn effective_min_confidence(config: &SignalConfig, now: DateTime<Utc>) -> f64 {
    if config.optimal_hours_utc.contains(&now.hour()) {
        (config.min_confidence - config.optimal_confidence_discount.max(0.0)).max(0.0)
    } else {
        config.min_confidence
    }
}

fn confidence_multiplier(confidence: f64) -> f64 {
    if confidence >= 90.0 {
        1.5
    } else if confidence >= 80.0 {
        1.2
    } else {
        1.0
    }
}

fn time_of_day_multiplier(config: &SignalConfig, now: DateTime<Utc>) -> f64 {
    if config.optimal_hours_utc.contains(&now.hour()) {
        1.2
    } else {
        1.0
    }
}

/// Majors trade at full size; JPY crosses slightly reduced for their larger
/// pip value; exotics reduced further.
fn symbol_class_multiplier(symbol: &str) -> f64 {
    if MAJORS.contains(&symbol) {
        1.0
    } else if symbol.ends_with("JPY") {
        0.9
    } else {
        0.8
    }
}

fn risk_reward_bonus(signal: &Signal) -> f64 {
    match (signal.stop_loss, signal.take_profit) {
        (Some(sl), Some(tp)) => {
            let risk = (signal.entry_price - sl).abs();
            let reward = (tp - signal.entry_price).abs();
            if risk > 0.0 && reward / risk >= 2.0 {
                1.1
            } else {
                1.0
            }
        }
        _ => 1.0,
    }
}

/// Position size for a signal: base lot scaled by confidence, session,
/// symbol class and risk-reward, clamped to the configured lot bounds.
pub fn compute_volume(config: &SignalConfig, signal: &Signal, now: DateTime<Utc>) -> f64 {
    let volume = config.base_lot
        * confidence_multiplier(signal.confidence)
        * time_of_day_multiplier(config, now)
        * symbol_class_multiplier(&signal.symbol)
        * risk_reward_bonus(signal);
    volume.clamp(config.min_lot, config.max_lot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Timeframe};
    use chrono::TimeZone;

    fn signal(symbol: &str, confidence: f64) -> Signal {
        Signal::new(symbol, Direction::Buy, confidence, 1.0850, Timeframe::H1, "test")
    }

    fn off_hours() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 22, 0, 0).unwrap()
    }

    fn optimal_hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_volume_always_within_lot_bounds() {
        let config = SignalConfig {
            base_lot: 0.10,
            min_lot: 0.01,
            max_lot: 0.15,
            ..crate::config::Config::default().signals
        };
        for confidence in [0.0, 55.0, 70.0, 85.0, 92.0, 100.0] {
            for symbol in ["EURUSD", "EURJPY", "USDMXN"] {
                for now in [off_hours(), optimal_hour()] {
                    let v = compute_volume(&config, &signal(symbol, confidence), now);
                    assert!(v >= config.min_lot && v <= config.max_lot, "volume {v} out of bounds");
                }
            }
        }
    }

    #[test]
    fn test_higher_confidence_never_sizes_smaller() {
        let config = crate::config::Config::default().signals;
        let now = off_hours();
        let low = compute_volume(&config, &signal("EURUSD", 72.0), now);
        let mid = compute_volume(&config, &signal("EURUSD", 83.0), now);
        let high = compute_volume(&config, &signal("EURUSD", 95.0), now);
        assert!(low <= mid && mid <= high);
    }

    #[test]
    fn test_optimal_hours_relax_threshold_downward_only() {
        let mut config = crate::config::Config::default().signals;
        config.min_confidence = 70.0;
        config.optimal_confidence_discount = 5.0;
        assert_eq!(effective_min_confidence(&config, off_hours()), 70.0);
        assert_eq!(effective_min_confidence(&config, optimal_hour()), 65.0);

        // A negative discount must not raise the floor
        config.optimal_confidence_discount = -10.0;
        assert_eq!(effective_min_confidence(&config, optimal_hour()), 70.0);
    }

    #[test]
    fn test_risk_reward_bonus_needs_two_to_one() {
        let config = crate::config::Config::default().signals;
        let now = off_hours();

        let mut flat = signal("EURUSD", 75.0);
        flat.stop_loss = Some(1.0840);
        flat.take_profit = Some(1.0860); // 1:1
        let mut wide = signal("EURUSD", 75.0);
        wide.stop_loss = Some(1.0840);
        wide.take_profit = Some(1.0875); // 2.5:1

        let base = compute_volume(&config, &flat, now);
        let boosted = compute_volume(&config, &wide, now);
        assert!(boosted > base);
    }
}
