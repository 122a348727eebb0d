//! Volatility Indicators: rolling standard deviation, ATR, Bollinger Bands

use crate::common::{nan_vec, population_std_dev, rolling};
use crate::indicators::moving_averages::sma;

/// Rolling population standard deviation.
pub fn std_dev(values: &[f64], period: usize) -> Vec<f64> {
    rolling(values, period, population_std_dev)
}

/// Average True Range with Wilder smoothing.
///
/// TR(0) is the plain high-low range; the first ATR value appears at index
/// `period` as the simple average of the first `period` true ranges.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = nan_vec(n);
    if n == 0 || period == 0 {
        return result;
    }

    let mut true_ranges = Vec::with_capacity(n);
    true_ranges.push(highs[0] - lows[0]);
    for i in 1..n {
        let tr = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
        true_ranges.push(tr);
    }

    if n <= period {
        return result;
    }

    result[period] = true_ranges[1..=period].iter().sum::<f64>() / period as f64;
    for i in (period + 1)..n {
        result[i] = (result[i - 1] * (period - 1) as f64 + true_ranges[i]) / period as f64;
    }

    result
}

/// Bollinger Bands: SMA middle band with bands `deviations` population
/// standard deviations away.
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(values: &[f64], period: usize, deviations: f64) -> BollingerBands {
    let n = values.len();
    let middle = sma(values, period);
    let sd = std_dev(values, period);

    let mut upper = nan_vec(n);
    let mut lower = nan_vec(n);
    for i in 0..n {
        if !middle[i].is_nan() && !sd[i].is_nan() {
            upper[i] = middle[i] + deviations * sd[i];
            lower[i] = middle[i] - deviations * sd[i];
        }
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_std_dev_flat_is_zero() {
        let values = vec![4.0; 10];
        let result = std_dev(&values, 5);
        assert!(result[3].is_nan());
        assert_relative_eq!(result[9], 0.0);
    }

    #[test]
    fn test_atr_constant_range() {
        // Every bar spans exactly 1.0 with no gaps
        let highs: Vec<f64> = (0..20).map(|_| 101.0).collect();
        let lows: Vec<f64> = (0..20).map(|_| 100.0).collect();
        let closes: Vec<f64> = (0..20).map(|_| 100.5).collect();
        let result = atr(&highs, &lows, &closes, 14);
        assert!(result[13].is_nan());
        assert_relative_eq!(result[14], 1.0);
        assert_relative_eq!(result[19], 1.0);
    }

    #[test]
    fn test_atr_short_series_all_nan() {
        let v = vec![1.0; 5];
        let result = atr(&v, &v, &v, 14);
        assert!(result.iter().all(|x| x.is_nan()));
    }

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let values = vec![10.0; 30];
        let bands = bollinger(&values, 20, 2.0);
        assert_relative_eq!(bands.upper[25], 10.0);
        assert_relative_eq!(bands.middle[25], 10.0);
        assert_relative_eq!(bands.lower[25], 10.0);
    }

    #[test]
    fn test_bollinger_symmetry() {
        let values: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64).sin() * 3.0).collect();
        let bands = bollinger(&values, 20, 2.0);
        for i in 19..40 {
            assert_relative_eq!(
                bands.upper[i] - bands.middle[i],
                bands.middle[i] - bands.lower[i],
                epsilon = 1e-10
            );
        }
    }
}
