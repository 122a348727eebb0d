//! Moving Average Indicators
//!
//! SMA, EMA, and WMA over a price slice. All functions return a series of
//! input length with NaN where look-back is insufficient.

use crate::common::{has_enough_data, nan_vec};

/// Simple Moving Average
///
/// # Arguments
/// * `values` - Source prices
/// * `period` - Lookback period
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    if !has_enough_data(n, period) {
        return nan_vec(n);
    }

    let mut result = nan_vec(n);
    let mut window_sum: f64 = values[..period].iter().sum();
    result[period - 1] = window_sum / period as f64;

    for i in period..n {
        window_sum += values[i] - values[i - period];
        result[i] = window_sum / period as f64;
    }

    result
}

/// Exponential Moving Average, seeded with the SMA of the first `period`
/// values.
///
/// # Formula
/// EMA(i) = (value(i) - EMA(i-1)) * k + EMA(i-1), k = 2 / (period + 1)
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    if !has_enough_data(n, period) {
        return nan_vec(n);
    }

    let mut result = nan_vec(n);
    let multiplier = 2.0 / (period as f64 + 1.0);

    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;

    for i in period..n {
        result[i] = (values[i] - result[i - 1]) * multiplier + result[i - 1];
    }

    result
}

/// Weighted Moving Average with linearly increasing weights.
pub fn wma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    if !has_enough_data(n, period) {
        return nan_vec(n);
    }

    let weight_sum = (period * (period + 1)) as f64 / 2.0;
    let mut result = nan_vec(n);

    for i in (period - 1)..n {
        let mut sum = 0.0;
        for j in 0..period {
            let weight = (j + 1) as f64;
            sum += values[i + 1 - period + j] * weight;
        }
        result[i] = sum / weight_sum;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma_basic() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_relative_eq!(result[2], 2.0);
        assert_relative_eq!(result[3], 3.0);
        assert_relative_eq!(result[4], 4.0);
    }

    #[test]
    fn test_sma_short_series_all_nan() {
        let result = sma(&[1.0, 2.0], 5);
        assert!(result.iter().all(|v| v.is_nan()));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_ema_seeds_with_sma() {
        let values = vec![2.0, 4.0, 6.0, 8.0];
        let result = ema(&values, 3);
        assert!(result[1].is_nan());
        // Seed = mean of first 3 = 4.0; then (8 - 4) * 0.5 + 4 = 6.0
        assert_relative_eq!(result[2], 4.0);
        assert_relative_eq!(result[3], 6.0);
    }

    #[test]
    fn test_wma_weights_recent_more() {
        let values = vec![1.0, 2.0, 3.0];
        let result = wma(&values, 3);
        // (1*1 + 2*2 + 3*3) / 6 = 14/6
        assert_relative_eq!(result[2], 14.0 / 6.0);
    }

    #[test]
    fn test_constant_series() {
        let values = vec![5.0; 10];
        for out in [sma(&values, 4), ema(&values, 4), wma(&values, 4)] {
            for v in &out[3..] {
                assert_relative_eq!(*v, 5.0);
            }
        }
    }
}
