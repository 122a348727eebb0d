// src/mtf.rs
// Multi-timeframe analyzer: per-symbol bar cache across timeframes with
// memoized indicator reads and trend detection.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::indicators::{self, IndicatorValues, VALUE_BUFFER};
use crate::market::{resample_to_higher, Bar, Timeframe};

/// Detected direction of a timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Sideways,
}

/// How to detect the trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendMethod {
    /// Compare the close `period` bars back against the current close.
    Price,
    /// Compare a short/long moving-average pair.
    Ma,
}

/// Composite memoization key: one entry per
/// (symbol, timeframe, indicator, parameters) combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    symbol: String,
    timeframe: Timeframe,
    indicator: String,
    params_fingerprint: String,
}

// Stable fingerprint regardless of parameter-map iteration order.
fn params_fingerprint(params: &HashMap<String, Value>) -> String {
    let sorted: BTreeMap<&String, &Value> = params.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

/// Cross-timeframe bar cache owned by one run.
///
/// Raw bar series and memoized indicator results are kept separately:
/// `clear_cache` invalidates the indicator results without discarding bars,
/// `reset` discards everything including symbols.
#[derive(Debug, Default)]
pub struct MultiTimeframeAnalyzer {
    data: HashMap<String, HashMap<Timeframe, Vec<Bar>>>,
    cache: HashMap<CacheKey, IndicatorValues>,
}

impl MultiTimeframeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(&mut self, symbol: &str) {
        self.data.entry(symbol.to_string()).or_default();
    }

    pub fn set_timeframe_data(&mut self, symbol: &str, timeframe: Timeframe, bars: Vec<Bar>) {
        self.data
            .entry(symbol.to_string())
            .or_default()
            .insert(timeframe, bars);
    }

    pub fn timeframe_data(&self, symbol: &str, timeframe: Timeframe) -> Option<&[Bar]> {
        self.data
            .get(symbol)
            .and_then(|tfs| tfs.get(&timeframe))
            .map(Vec::as_slice)
    }

    pub fn current_bar(&self, symbol: &str, timeframe: Timeframe) -> Option<&Bar> {
        self.timeframe_data(symbol, timeframe)?.last()
    }

    /// The most recent `count` bars, oldest first.
    pub fn previous_bars(&self, symbol: &str, timeframe: Timeframe, count: usize) -> &[Bar] {
        match self.timeframe_data(symbol, timeframe) {
            Some(bars) => {
                let start = bars.len().saturating_sub(count);
                &bars[start..]
            }
            None => &[],
        }
    }

    /// Derive and store a coarser series by resampling an existing one.
    pub fn derive_higher_timeframe(
        &mut self,
        symbol: &str,
        source: Timeframe,
        target: Timeframe,
    ) -> bool {
        let Some(bars) = self.timeframe_data(symbol, source) else {
            return false;
        };
        if target <= source {
            return false;
        }
        let resampled = resample_to_higher(bars, target);
        self.set_timeframe_data(symbol, target, resampled);
        true
    }

    // ------------------------------------------------------------------
    // Memoized indicator reads
    // ------------------------------------------------------------------

    /// Full indicator series on a timeframe; O(1) after the first read of
    /// the same (symbol, timeframe, indicator, parameters) combination.
    pub fn indicator_values(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        indicator: &str,
        params: &HashMap<String, Value>,
    ) -> Option<&IndicatorValues> {
        let key = CacheKey {
            symbol: symbol.to_string(),
            timeframe,
            indicator: indicator.to_string(),
            params_fingerprint: params_fingerprint(params),
        };

        if !self.cache.contains_key(&key) {
            let bars = self
                .data
                .get(symbol)
                .and_then(|tfs| tfs.get(&timeframe))?;
            if bars.is_empty() {
                return None;
            }
            let values = indicators::compute(indicator, bars, params)?;
            self.cache.insert(key.clone(), values);
        }

        self.cache.get(&key)
    }

    /// Latest value of one indicator buffer; NaN when anything is missing.
    pub fn indicator_value(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        indicator: &str,
        buffer: &str,
        params: &HashMap<String, Value>,
    ) -> f64 {
        let len = match self.timeframe_data(symbol, timeframe) {
            Some(bars) if !bars.is_empty() => bars.len(),
            _ => return f64::NAN,
        };
        let buffer = if buffer.is_empty() { VALUE_BUFFER } else { buffer };
        match self.indicator_values(symbol, timeframe, indicator, params) {
            Some(values) => values.value_at(buffer, len - 1),
            None => f64::NAN,
        }
    }

    // ------------------------------------------------------------------
    // Trend detection
    // ------------------------------------------------------------------

    /// Detect the trend of a timeframe. Returns Sideways rather than an
    /// error whenever history is insufficient.
    pub fn detect_trend(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        method: TrendMethod,
        period: usize,
    ) -> Trend {
        match method {
            TrendMethod::Price => {
                let bars = match self.timeframe_data(symbol, timeframe) {
                    Some(bars) => bars,
                    None => return Trend::Sideways,
                };
                if period == 0 || bars.len() <= period {
                    return Trend::Sideways;
                }
                let current = bars[bars.len() - 1].close;
                let past = bars[bars.len() - 1 - period].close;
                if current > past {
                    Trend::Up
                } else if current < past {
                    Trend::Down
                } else {
                    Trend::Sideways
                }
            }
            TrendMethod::Ma => {
                let long = period.max(2);
                let short = (long / 2).max(1);
                let bar_count = self
                    .timeframe_data(symbol, timeframe)
                    .map(|b| b.len())
                    .unwrap_or(0);
                if bar_count < long {
                    return Trend::Sideways;
                }

                let mut short_params = HashMap::new();
                short_params.insert("period".to_string(), Value::from(short as u64));
                let mut long_params = HashMap::new();
                long_params.insert("period".to_string(), Value::from(long as u64));

                let short_ma = self.indicator_value(symbol, timeframe, "sma", VALUE_BUFFER, &short_params);
                let long_ma = self.indicator_value(symbol, timeframe, "sma", VALUE_BUFFER, &long_params);

                if short_ma.is_nan() || long_ma.is_nan() {
                    Trend::Sideways
                } else if short_ma > long_ma {
                    Trend::Up
                } else if short_ma < long_ma {
                    Trend::Down
                } else {
                    Trend::Sideways
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Timeframe navigation and lifecycle
    // ------------------------------------------------------------------

    pub fn higher_timeframe(&self, timeframe: Timeframe) -> Timeframe {
        timeframe.higher()
    }

    pub fn lower_timeframe(&self, timeframe: Timeframe) -> Timeframe {
        timeframe.lower()
    }

    /// Invalidate memoized indicator results, keeping raw bar series.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Discard everything including symbols.
    pub fn reset(&mut self) {
        self.data.clear();
        self.cache.clear();
    }

    pub fn available_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.data.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn available_timeframes(&self, symbol: &str) -> Vec<Timeframe> {
        let mut timeframes: Vec<Timeframe> = self
            .data
            .get(symbol)
            .map(|tfs| tfs.keys().copied().collect())
            .unwrap_or_default();
        timeframes.sort();
        timeframes
    }
}
