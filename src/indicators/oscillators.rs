//! Oscillator Indicators
//!
//! This module provides oscillator calculations:
//! - RSI: Relative Strength Index (simple-average variant)
//! - Stochastic: smoothed %K and %D
//! - Williams %R
//! - CCI: Commodity Channel Index

use crate::common::{highest, lowest, nan_vec};
use crate::indicators::moving_averages::sma;

/// Relative Strength Index over a rolling window of simple-averaged gains
/// and losses.
///
/// # Formula
/// RS = Average Gain / Average Loss
/// RSI = 100 - (100 / (1 + RS)); 100 when the window has no losses.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = nan_vec(n);
    if period == 0 {
        return result;
    }

    for i in period..n {
        let mut gains = 0.0;
        let mut losses = 0.0;
        for j in (i + 1 - period)..=i {
            let change = closes[j] - closes[j - 1];
            if change > 0.0 {
                gains += change;
            } else {
                losses += change.abs();
            }
        }

        let avg_gain = gains / period as f64;
        let avg_loss = losses / period as f64;

        result[i] = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
    }

    result
}

/// Raw stochastic %K: position of the close inside the high-low range.
/// Returns 50 when the range is zero.
fn stoch_raw(highs: &[f64], lows: &[f64], closes: &[f64], k_period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut k = nan_vec(n);
    if k_period == 0 {
        return k;
    }

    for i in (k_period - 1)..n {
        let window = (i + 1 - k_period)..=i;
        let hh = highest(&highs[window.clone()]);
        let ll = lowest(&lows[window]);

        k[i] = if hh == ll {
            50.0
        } else {
            ((closes[i] - ll) / (hh - ll)) * 100.0
        };
    }

    k
}

/// Smoothed stochastic %K (raw %K smoothed over `smooth` bars).
pub fn stoch_k(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    smooth: usize,
) -> Vec<f64> {
    sma_skipping_nan(&stoch_raw(highs, lows, closes, k_period), smooth)
}

/// Stochastic %D: SMA of the smoothed %K over `d_period` bars.
pub fn stoch_d(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    smooth: usize,
    d_period: usize,
) -> Vec<f64> {
    sma_skipping_nan(&stoch_k(highs, lows, closes, k_period, smooth), d_period)
}

// SMA that only produces a value once the window holds no NaN, preserving
// index alignment with the raw series.
fn sma_skipping_nan(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = nan_vec(n);
    if period == 0 {
        return result;
    }

    for i in (period.saturating_sub(1))..n {
        let window = &values[(i + 1 - period)..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = window.iter().sum::<f64>() / period as f64;
    }

    result
}

/// Williams %R
///
/// Returns exactly -50 when the high-low range is zero over the full
/// lookback window, keeping the value a valid oscillator reading instead of
/// dividing by zero.
pub fn williams_r(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = nan_vec(n);
    if period == 0 {
        return result;
    }

    for i in (period - 1)..n {
        let window = (i + 1 - period)..=i;
        let hh = highest(&highs[window.clone()]);
        let ll = lowest(&lows[window]);
        let range = hh - ll;

        result[i] = if range == 0.0 {
            -50.0
        } else {
            ((hh - closes[i]) / range) * -100.0
        };
    }

    result
}

/// Commodity Channel Index over typical prices (HLC/3).
/// Zero mean deviation yields 0 rather than a division error.
pub fn cci(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = nan_vec(n);
    if period == 0 {
        return result;
    }

    let typical: Vec<f64> = (0..n)
        .map(|i| (highs[i] + lows[i] + closes[i]) / 3.0)
        .collect();
    let typical_sma = sma(&typical, period);

    for i in period..n {
        let window = &typical[(i + 1 - period)..=i];
        let mean = typical_sma[i];
        let mean_deviation =
            window.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;

        result[i] = if mean_deviation != 0.0 {
            (typical[i] - mean) / (0.015 * mean_deviation)
        } else {
            0.0
        };
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let result = rsi(&closes, 14);
        assert!(result[13].is_nan());
        assert_relative_eq!(result[14], 100.0);
        assert_relative_eq!(result[19], 100.0);
    }

    #[test]
    fn test_rsi_balanced_is_50() {
        // Alternating +1/-1 changes over an even window
        let mut closes = vec![100.0];
        for i in 0..20 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let result = rsi(&closes, 14);
        assert_relative_eq!(result[20], 50.0);
    }

    #[test]
    fn test_williams_r_zero_range_is_minus_50() {
        let flat = vec![100.0; 20];
        let result = williams_r(&flat, &flat, &flat, 14);
        assert!(result[12].is_nan());
        for v in &result[13..] {
            assert_relative_eq!(*v, -50.0);
        }
    }

    #[test]
    fn test_williams_r_bounds() {
        let highs = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let lows = vec![9.0, 10.0, 11.0, 12.0, 13.0];
        let closes = vec![9.5, 10.5, 11.5, 12.5, 14.0];
        let result = williams_r(&highs, &lows, &closes, 3);
        // Close at the window high gives 0; always within [-100, 0]
        assert_relative_eq!(result[4], 0.0);
        for v in result.iter().filter(|v| !v.is_nan()) {
            assert!((-100.0..=0.0).contains(v));
        }
    }

    #[test]
    fn test_stochastic_flat_range_is_50() {
        let flat = vec![5.0; 10];
        let k = stoch_k(&flat, &flat, &flat, 5, 1);
        assert_relative_eq!(k[9], 50.0);
    }

    #[test]
    fn test_stochastic_d_lags_k() {
        let highs: Vec<f64> = (0..20).map(|i| 11.0 + i as f64).collect();
        let lows: Vec<f64> = (0..20).map(|i| 9.0 + i as f64).collect();
        let closes: Vec<f64> = (0..20).map(|i| 10.8 + i as f64).collect();
        let k = stoch_k(&highs, &lows, &closes, 5, 3);
        let d = stoch_d(&highs, &lows, &closes, 5, 3, 3);
        let first_k = k.iter().position(|v| !v.is_nan()).unwrap();
        let first_d = d.iter().position(|v| !v.is_nan()).unwrap();
        assert_eq!(first_d, first_k + 2);
    }

    #[test]
    fn test_cci_flat_is_zero() {
        let flat = vec![7.0; 30];
        let result = cci(&flat, &flat, &flat, 20);
        assert_relative_eq!(result[25], 0.0);
    }
}
