//! Volume Indicators: OBV and VWAP
//!
//! Both are cumulative and therefore defined from the first bar onward.

use crate::common::nan_vec;

/// On-Balance Volume, seeded with the first bar's volume.
///
/// Volume is added on up-closes, subtracted on down-closes, and carried
/// unchanged on flat closes.
pub fn obv(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let n = closes.len();
    if n == 0 {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(n);
    let mut value = volumes[0];
    result.push(value);

    for i in 1..n {
        if closes[i] > closes[i - 1] {
            value += volumes[i];
        } else if closes[i] < closes[i - 1] {
            value -= volumes[i];
        }
        result.push(value);
    }

    result
}

/// Volume-Weighted Average Price over the whole series.
///
/// Cumulative typical-price*volume over cumulative volume; NaN until any
/// volume has traded.
pub fn vwap(highs: &[f64], lows: &[f64], closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let n = closes.len();
    let mut result = nan_vec(n);

    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;

    for i in 0..n {
        let typical = (highs[i] + lows[i] + closes[i]) / 3.0;
        cumulative_tpv += typical * volumes[i];
        cumulative_volume += volumes[i];

        if cumulative_volume != 0.0 {
            result[i] = cumulative_tpv / cumulative_volume;
        }
    }

    result
}
