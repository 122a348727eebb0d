//! Channel Indicators: Donchian channel and Bill Williams fractals

use crate::common::{highest, lowest, nan_vec};

/// Donchian channel bands.
pub struct DonchianChannel {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Donchian(period): highest high / lowest low over the window, with
/// `middle = (upper + lower) / 2`. The first `period - 1` bars are NaN.
pub fn donchian(highs: &[f64], lows: &[f64], period: usize) -> DonchianChannel {
    let n = highs.len();
    let mut upper = nan_vec(n);
    let mut middle = nan_vec(n);
    let mut lower = nan_vec(n);

    if period > 0 {
        for i in (period - 1)..n {
            let window = (i + 1 - period)..=i;
            let hh = highest(&highs[window.clone()]);
            let ll = lowest(&lows[window]);
            upper[i] = hh;
            lower[i] = ll;
            middle[i] = (hh + ll) / 2.0;
        }
    }

    DonchianChannel {
        upper,
        middle,
        lower,
    }
}

/// Fractal markers: the level when the center bar is a strict extreme of the
/// symmetric window, NaN otherwise.
pub struct Fractals {
    pub up: Vec<f64>,
    pub down: Vec<f64>,
}

/// Fractals(period): `period` must be odd so the window is symmetric around
/// the center bar; `side_bars = (period - 1) / 2` bars on each edge of the
/// series are NaN because the window does not fit.
pub fn fractals(highs: &[f64], lows: &[f64], period: usize) -> Fractals {
    let n = highs.len();
    let mut up = nan_vec(n);
    let mut down = nan_vec(n);
    if period < 3 || period % 2 == 0 {
        return Fractals { up, down };
    }

    let side_bars = (period - 1) / 2;

    for i in side_bars..n.saturating_sub(side_bars) {
        let center_high = highs[i];
        let center_low = lows[i];
        let mut is_up = true;
        let mut is_down = true;

        for j in (i - side_bars)..=(i + side_bars) {
            if j == i {
                continue;
            }
            if highs[j] >= center_high {
                is_up = false;
            }
            if lows[j] <= center_low {
                is_down = false;
            }
        }

        if is_up {
            up[i] = center_high;
        }
        if is_down {
            down[i] = center_low;
        }
    }

    Fractals { up, down }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_donchian_19_bars_period_20_all_nan() {
        let highs = vec![10.0; 19];
        let lows = vec![9.0; 19];
        let dc = donchian(&highs, &lows, 20);
        assert!(dc.upper.iter().all(|v| v.is_nan()));
        assert!(dc.middle.iter().all(|v| v.is_nan()));
        assert!(dc.lower.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_donchian_constant_price_collapses() {
        let price = vec![42.0; 20];
        let dc = donchian(&price, &price, 20);
        assert_relative_eq!(dc.upper[19], 42.0);
        assert_relative_eq!(dc.middle[19], 42.0);
        assert_relative_eq!(dc.lower[19], 42.0);
        assert!(dc.upper[18].is_nan());
    }

    #[test]
    fn test_donchian_middle_is_band_mean() {
        let highs = vec![10.0, 12.0, 14.0, 11.0, 13.0];
        let lows = vec![8.0, 9.0, 10.0, 9.0, 10.0];
        let dc = donchian(&highs, &lows, 3);
        assert_relative_eq!(dc.upper[2], 14.0);
        assert_relative_eq!(dc.lower[2], 8.0);
        assert_relative_eq!(dc.middle[2], 11.0);
    }

    #[test]
    fn test_fractals_detects_center_peak() {
        let highs = vec![10.0, 11.0, 15.0, 11.0, 10.0];
        let lows = vec![5.0, 4.0, 3.0, 4.0, 5.0];
        let f = fractals(&highs, &lows, 5);
        // Edges of the series never carry a marker
        assert!(f.up[0].is_nan() && f.up[1].is_nan());
        assert!(f.up[3].is_nan() && f.up[4].is_nan());
        assert_relative_eq!(f.up[2], 15.0);
        assert_relative_eq!(f.down[2], 3.0);
    }

    #[test]
    fn test_fractals_requires_strict_extreme() {
        // Tie with a neighbor: no fractal
        let highs = vec![10.0, 15.0, 15.0, 11.0, 10.0];
        let lows = vec![1.0, 2.0, 3.0, 2.0, 1.0];
        let f = fractals(&highs, &lows, 5);
        assert!(f.up[2].is_nan());
        assert!(f.down[2].is_nan());
    }

    #[test]
    fn test_fractals_even_period_rejected() {
        let v = vec![1.0; 10];
        let f = fractals(&v, &v, 4);
        assert!(f.up.iter().all(|x| x.is_nan()));
    }
}
