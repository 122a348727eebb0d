//! Momentum Indicators: MACD, ROC, raw momentum

use crate::common::nan_vec;
use crate::indicators::moving_averages::ema;

/// MACD line, signal line, and histogram.
///
/// The signal line is an EMA of the MACD line; it only starts once the slow
/// EMA has produced `signal` values, preserving index alignment.
pub fn macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = closes.len();
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let mut macd_line = nan_vec(n);
    for i in 0..n {
        if !fast_ema[i].is_nan() && !slow_ema[i].is_nan() {
            macd_line[i] = fast_ema[i] - slow_ema[i];
        }
    }

    // EMA over the valid suffix of the MACD line, written back in place
    let mut signal_line = nan_vec(n);
    if let Some(first_valid) = macd_line.iter().position(|v| !v.is_nan()) {
        let valid = &macd_line[first_valid..];
        let smoothed = ema(valid, signal);
        for (offset, value) in smoothed.iter().enumerate() {
            signal_line[first_valid + offset] = *value;
        }
    }

    let mut histogram = nan_vec(n);
    for i in 0..n {
        if !macd_line[i].is_nan() && !signal_line[i].is_nan() {
            histogram[i] = macd_line[i] - signal_line[i];
        }
    }

    (macd_line, signal_line, histogram)
}

/// Rate of Change in percent: 100 * (close / close[period] - 1)
pub fn roc(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = nan_vec(n);
    if period == 0 {
        return result;
    }

    for i in period..n {
        let base = closes[i - period];
        if base != 0.0 {
            result[i] = ((closes[i] - base) / base) * 100.0;
        }
    }

    result
}

/// Raw momentum: close - close[period]
pub fn momentum(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = nan_vec(n);
    if period == 0 {
        return result;
    }

    for i in period..n {
        result[i] = closes[i] - closes[i - period];
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_macd_alignment() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let (line, signal, hist) = macd(&closes, 12, 26, 9);
        assert_eq!(line.len(), 60);
        assert_eq!(signal.len(), 60);
        assert_eq!(hist.len(), 60);

        // Line valid from slow EMA onward; signal 8 bars later
        assert!(line[24].is_nan());
        assert!(!line[25].is_nan());
        assert!(signal[32].is_nan());
        assert!(!signal[33].is_nan());
        assert_relative_eq!(hist[40], line[40] - signal[40]);
    }

    #[test]
    fn test_macd_constant_series_is_zero() {
        let closes = vec![50.0; 60];
        let (line, _, hist) = macd(&closes, 12, 26, 9);
        assert_relative_eq!(line[40], 0.0);
        assert_relative_eq!(hist[40], 0.0);
    }

    #[test]
    fn test_roc() {
        let closes = vec![100.0, 110.0, 121.0];
        let result = roc(&closes, 1);
        assert!(result[0].is_nan());
        assert_relative_eq!(result[1], 10.0);
        assert_relative_eq!(result[2], 10.0);
    }

    #[test]
    fn test_momentum() {
        let closes = vec![10.0, 12.0, 15.0];
        let result = momentum(&closes, 2);
        assert!(result[1].is_nan());
        assert_relative_eq!(result[2], 5.0);
    }
}
