// Technical indicator library
//
// Pure functions over price series. Every function returns None (or an empty
// vec) when the series is too short, and is deterministic for identical input.

use crate::types::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stochastic {
    pub k: f64,
    pub d: f64,
}

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average, seeded with the SMA of the first `period` values
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied()
}

/// Full EMA series: entry 0 corresponds to the bar at index `period - 1`
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &value in &values[period..] {
        prev = (value - prev) * alpha + prev;
        out.push(prev);
    }
    out
}

/// Relative Strength Index with Wilder smoothing
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    for i in period + 1..values.len() {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD with the standard 12/26/9 periods
pub fn macd(values: &[f64]) -> Option<Macd> {
    macd_with(values, 12, 26, 9)
}

pub fn macd_with(values: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if values.len() < slow + signal {
        return None;
    }

    let fast_series = ema_series(values, fast);
    let slow_series = ema_series(values, slow);
    if slow_series.is_empty() {
        return None;
    }

    // Align the fast series to the slow series start
    let offset = slow - fast;
    let macd_line: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, s)| fast_series[i + offset] - s)
        .collect();

    let signal_series = ema_series(&macd_line, signal);
    let signal_value = *signal_series.last()?;
    let macd_value = *macd_line.last()?;

    Some(Macd {
        macd: macd_value,
        signal: signal_value,
        histogram: macd_value - signal_value,
    })
}

/// Average True Range with Wilder smoothing
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let c = &w[1];
            (c.high - c.low)
                .max((c.high - prev_close).abs())
                .max((c.low - prev_close).abs())
        })
        .collect();

    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for &tr in &true_ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
    }
    Some(atr)
}

/// Bollinger bands over the last `period` values, `k` standard deviations
pub fn bollinger(values: &[f64], period: usize, k: f64) -> Option<Bollinger> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|v| (v - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    Some(Bollinger {
        upper: middle + k * std_dev,
        middle,
        lower: middle - k * std_dev,
    })
}

/// Stochastic oscillator: %K over `k_period` bars, %D as SMA of the last
/// `d_period` %K values
pub fn stochastic(candles: &[Candle], k_period: usize, d_period: usize) -> Option<Stochastic> {
    if k_period == 0 || d_period == 0 || candles.len() < k_period + d_period - 1 {
        return None;
    }

    let k_at = |end: usize| -> f64 {
        let window = &candles[end + 1 - k_period..=end];
        let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        if high == low {
            50.0
        } else {
            (candles[end].close - low) / (high - low) * 100.0
        }
    };

    let last = candles.len() - 1;
    let k = k_at(last);
    let d = (0..d_period).map(|i| k_at(last - i)).sum::<f64>() / d_period as f64;

    Some(Stochastic { k, d })
}

/// Rate of change over the last `bars` bars, in percent
pub fn momentum(values: &[f64], bars: usize) -> Option<f64> {
    if bars == 0 || values.len() < bars + 1 {
        return None;
    }
    let past = values[values.len() - 1 - bars];
    if past == 0.0 {
        return None;
    }
    let current = values[values.len() - 1];
    Some((current - past) / past * 100.0)
}

/// Indices of swing highs: bar i qualifies when its high is >= the max of the
/// `lookback` bars on each side
pub fn swing_highs(highs: &[f64], lookback: usize) -> Vec<usize> {
    swing_points(highs, lookback, |candidate, window_max| candidate >= window_max)
}

/// Indices of swing lows, the mirror of [`swing_highs`]
pub fn swing_lows(lows: &[f64], lookback: usize) -> Vec<usize> {
    let negated: Vec<f64> = lows.iter().map(|v| -v).collect();
    swing_points(&negated, lookback, |candidate, window_max| candidate >= window_max)
}

fn swing_points<F>(values: &[f64], lookback: usize, qualifies: F) -> Vec<usize>
where
    F: Fn(f64, f64) -> bool,
{
    if lookback == 0 || values.len() < 2 * lookback + 1 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for i in lookback..values.len() - lookback {
        let left_max = values[i - lookback..i].iter().copied().fold(f64::MIN, f64::max);
        let right_max = values[i + 1..=i + lookback].iter().copied().fold(f64::MIN, f64::max);
        if qualifies(values[i], left_max.max(right_max)) {
            out.push(i);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: close,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn test_sma() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 5), Some(3.0));
        assert_eq!(sma(&values, 2), Some(4.5));
        assert_eq!(sma(&values, 6), None);
    }

    #[test]
    fn test_ema_constant_series() {
        let values = [2.0; 30];
        let result = ema(&values, 10).unwrap();
        assert!((result - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_follows_trend() {
        let values: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let fast = ema(&values, 10).unwrap();
        let slow = ema(&values, 30).unwrap();
        // In a rising series the short EMA sits above the long one
        assert!(fast > slow);
    }

    #[test]
    fn test_rsi_bounds() {
        let rising: Vec<f64> = (0..30).map(|i| 1.0 + i as f64 * 0.01).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        let falling: Vec<f64> = (0..30).map(|i| 2.0 - i as f64 * 0.01).collect();
        let value = rsi(&falling, 14).unwrap();
        assert!(value < 1.0);

        assert_eq!(rsi(&rising[..10], 14), None);
    }

    #[test]
    fn test_macd_sign_in_trend() {
        let rising: Vec<f64> = (0..100).map(|i| 100.0 * (1.0 + i as f64 * 0.001)).collect();
        let result = macd(&rising).unwrap();
        assert!(result.macd > 0.0);
    }

    #[test]
    fn test_atr_flat_market() {
        let candles: Vec<Candle> = (0..30).map(|_| candle(1.001, 0.999, 1.0)).collect();
        let value = atr(&candles, 14).unwrap();
        assert!((value - 0.002).abs() < 1e-9);
    }

    #[test]
    fn test_bollinger_symmetry() {
        let values: Vec<f64> = (0..25).map(|i| 10.0 + (i % 5) as f64).collect();
        let bands = bollinger(&values, 20, 2.0).unwrap();
        assert!(bands.upper > bands.middle);
        assert!(bands.lower < bands.middle);
        let spread_up = bands.upper - bands.middle;
        let spread_down = bands.middle - bands.lower;
        assert!((spread_up - spread_down).abs() < 1e-9);
    }

    #[test]
    fn test_stochastic_range_position() {
        let mut candles: Vec<Candle> = (0..20).map(|i| {
            let base = 1.0 + i as f64 * 0.001;
            candle(base + 0.001, base - 0.001, base)
        }).collect();
        // Close at the very top of the range
        let last = candles.last().unwrap().high;
        candles.last_mut().unwrap().close = last;
        let result = stochastic(&candles, 14, 3).unwrap();
        assert!(result.k > 90.0);
    }

    #[test]
    fn test_momentum_sign() {
        let rising: Vec<f64> = (0..20).map(|i| 1.0 + i as f64 * 0.01).collect();
        assert!(momentum(&rising, 10).unwrap() > 0.0);

        let falling: Vec<f64> = (0..20).map(|i| 2.0 - i as f64 * 0.01).collect();
        assert!(momentum(&falling, 10).unwrap() < 0.0);
    }

    #[test]
    fn test_swing_detection() {
        // A single peak in the middle of a 9-bar series, lookback 3
        let highs = [1.0, 1.1, 1.2, 1.3, 1.5, 1.3, 1.2, 1.1, 1.0];
        assert_eq!(swing_highs(&highs, 3), vec![4]);

        let lows = [1.5, 1.4, 1.3, 1.2, 1.0, 1.2, 1.3, 1.4, 1.5];
        assert_eq!(swing_lows(&lows, 3), vec![4]);
    }

    #[test]
    fn test_swing_requires_full_windows() {
        let highs = [1.0, 2.0, 1.0];
        assert!(swing_highs(&highs, 3).is_empty());
    }
}
