// src/market.rs
// OHLCV bars, timeframes, and series validation

use serde::{Deserialize, Serialize};

/// One OHLCV sample at a given timeframe.
///
/// `time` is epoch milliseconds. A series is always ordered strictly by
/// `time` with no duplicate timestamps (see [`validate_series`]).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Typical price (HLC/3), the base of VWAP and CCI.
    #[inline]
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Check that a series is strictly ascending in time with no duplicates.
/// Returns the index of the first offending bar on failure.
pub fn validate_series(bars: &[Bar]) -> Result<(), usize> {
    for i in 1..bars.len() {
        if bars[i].time <= bars[i - 1].time {
            return Err(i);
        }
    }
    Ok(())
}

// ============================================================================
// Timeframes
// ============================================================================

/// Chart timeframe, totally ordered from M1 up to monthly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN,
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::MN,
    ];

    /// Bar duration in minutes.
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
            Timeframe::W1 => 10_080,
            Timeframe::MN => 43_200,
        }
    }

    /// Next coarser timeframe; saturates at MN.
    pub fn higher(self) -> Timeframe {
        let idx = Self::ALL.iter().position(|&tf| tf == self).unwrap_or(0);
        if idx + 1 < Self::ALL.len() {
            Self::ALL[idx + 1]
        } else {
            self
        }
    }

    /// Next finer timeframe; saturates at M1.
    pub fn lower(self) -> Timeframe {
        let idx = Self::ALL.iter().position(|&tf| tf == self).unwrap_or(0);
        if idx > 0 {
            Self::ALL[idx - 1]
        } else {
            self
        }
    }

    pub fn parse(s: &str) -> Option<Timeframe> {
        match s {
            "M1" => Some(Timeframe::M1),
            "M5" => Some(Timeframe::M5),
            "M15" => Some(Timeframe::M15),
            "M30" => Some(Timeframe::M30),
            "H1" => Some(Timeframe::H1),
            "H4" => Some(Timeframe::H4),
            "D1" => Some(Timeframe::D1),
            "W1" => Some(Timeframe::W1),
            "MN" => Some(Timeframe::MN),
            _ => None,
        }
    }
}

/// Aggregate bars into a higher timeframe by flooring each bar's timestamp to
/// the target bucket. Bucket open/close come from the first/last source bar,
/// high/low from the extremes, volume is summed.
pub fn resample_to_higher(bars: &[Bar], target: Timeframe) -> Vec<Bar> {
    let bucket_ms = target.minutes() * 60_000;
    let mut resampled: Vec<Bar> = Vec::new();

    for bar in bars {
        let bucket_start = (bar.time / bucket_ms) * bucket_ms;

        match resampled.last_mut() {
            Some(current) if current.time == bucket_start => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
            }
            _ => {
                resampled.push(Bar {
                    time: bucket_start,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                });
            }
        }
    }

    resampled
}
