// src/indicators/mod.rs
// Indicator registry: bridges node parameters to the concrete calculations.
// Every indicator is a pure function (bars, parameters) -> series; output
// length always equals input length, with NaN where look-back is short.

pub mod channels;
pub mod momentum;
pub mod moving_averages;
pub mod oscillators;
pub mod volatility;
pub mod volume;

use std::collections::HashMap;

use serde_json::Value;

use crate::market::Bar;

/// Default buffer name for single-output indicators.
pub const VALUE_BUFFER: &str = "value";

/// Uniform multi-buffer result, so single- and multi-output indicators (and
/// imported custom schemas) look identical to the interpreter.
#[derive(Debug, Clone)]
pub struct IndicatorValues {
    pub buffers: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn single(values: Vec<f64>) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert(VALUE_BUFFER.to_string(), values);
        IndicatorValues { buffers }
    }

    pub fn buffer(&self, name: &str) -> Option<&[f64]> {
        self.buffers.get(name).map(Vec::as_slice)
    }

    /// Value of one buffer at one bar; NaN when the buffer or index is
    /// missing, so downstream comparisons stay false.
    pub fn value_at(&self, buffer: &str, index: usize) -> f64 {
        self.buffers
            .get(buffer)
            .and_then(|v| v.get(index))
            .copied()
            .unwrap_or(f64::NAN)
    }
}

/// Column view of a bar series, extracted once per computation.
pub struct BarColumns {
    pub opens: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl BarColumns {
    pub fn from_bars(bars: &[Bar]) -> Self {
        BarColumns {
            opens: bars.iter().map(|b| b.open).collect(),
            highs: bars.iter().map(|b| b.high).collect(),
            lows: bars.iter().map(|b| b.low).collect(),
            closes: bars.iter().map(|b| b.close).collect(),
            volumes: bars.iter().map(|b| b.volume).collect(),
        }
    }

    fn source(&self, name: &str) -> &[f64] {
        match name {
            "open" => &self.opens,
            "high" => &self.highs,
            "low" => &self.lows,
            _ => &self.closes,
        }
    }
}

// Tolerates float JSON values (optimization sweeps write grid points)
fn param_usize(params: &HashMap<String, Value>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| *v >= 0.0)
        .map(|v| v as usize)
        .unwrap_or(default)
}

fn param_f64(params: &HashMap<String, Value>, key: &str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn param_str<'a>(params: &'a HashMap<String, Value>, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// Buffer names an indicator produces, used for wiring and schema interop.
pub fn builtin_buffers(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "sma" | "ema" | "wma" | "rsi" | "williams_r" | "cci" | "roc" | "momentum" | "atr"
        | "std_dev" | "obv" | "vwap" => Some(&[VALUE_BUFFER]),
        "stochastic" => Some(&["k", "d"]),
        "macd" => Some(&["macd", "signal", "histogram"]),
        "bollinger" => Some(&["upper", "middle", "lower"]),
        "donchian" => Some(&["upper", "middle", "lower"]),
        "fractals" => Some(&["up", "down"]),
        _ => None,
    }
}

/// Compute one indicator over a bar series.
///
/// Returns None for unknown names (the interpreter reports a warning and
/// treats every buffer read as NaN).
pub fn compute(name: &str, bars: &[Bar], params: &HashMap<String, Value>) -> Option<IndicatorValues> {
    let cols = BarColumns::from_bars(bars);
    let period = param_usize(params, "period", 14);
    let source = cols.source(param_str(params, "source", "close"));

    let values = match name {
        "sma" => IndicatorValues::single(moving_averages::sma(source, period)),
        "ema" => IndicatorValues::single(moving_averages::ema(source, period)),
        "wma" => IndicatorValues::single(moving_averages::wma(source, period)),

        "rsi" => IndicatorValues::single(oscillators::rsi(source, period)),
        "williams_r" => IndicatorValues::single(oscillators::williams_r(
            &cols.highs,
            &cols.lows,
            &cols.closes,
            period,
        )),
        "cci" => IndicatorValues::single(oscillators::cci(
            &cols.highs,
            &cols.lows,
            &cols.closes,
            param_usize(params, "period", 20),
        )),
        "stochastic" => {
            let k_period = param_usize(params, "kPeriod", 14);
            let d_period = param_usize(params, "dPeriod", 3);
            let smooth = param_usize(params, "smooth", 3);
            let k = oscillators::stoch_k(&cols.highs, &cols.lows, &cols.closes, k_period, smooth);
            let d = oscillators::stoch_d(
                &cols.highs,
                &cols.lows,
                &cols.closes,
                k_period,
                smooth,
                d_period,
            );
            let mut buffers = HashMap::new();
            buffers.insert("k".to_string(), k);
            buffers.insert("d".to_string(), d);
            IndicatorValues { buffers }
        }

        "macd" => {
            let fast = param_usize(params, "fastPeriod", 12);
            let slow = param_usize(params, "slowPeriod", 26);
            let signal = param_usize(params, "signalPeriod", 9);
            let (line, signal_line, histogram) = momentum::macd(source, fast, slow, signal);
            let mut buffers = HashMap::new();
            buffers.insert("macd".to_string(), line);
            buffers.insert("signal".to_string(), signal_line);
            buffers.insert("histogram".to_string(), histogram);
            IndicatorValues { buffers }
        }
        "roc" => IndicatorValues::single(momentum::roc(source, period)),
        "momentum" => IndicatorValues::single(momentum::momentum(source, period)),

        "atr" => IndicatorValues::single(volatility::atr(
            &cols.highs,
            &cols.lows,
            &cols.closes,
            period,
        )),
        "std_dev" => IndicatorValues::single(volatility::std_dev(source, period)),
        "bollinger" => {
            let bands = volatility::bollinger(
                source,
                param_usize(params, "period", 20),
                param_f64(params, "deviations", 2.0),
            );
            let mut buffers = HashMap::new();
            buffers.insert("upper".to_string(), bands.upper);
            buffers.insert("middle".to_string(), bands.middle);
            buffers.insert("lower".to_string(), bands.lower);
            IndicatorValues { buffers }
        }

        "donchian" => {
            let channel =
                channels::donchian(&cols.highs, &cols.lows, param_usize(params, "period", 20));
            let mut buffers = HashMap::new();
            buffers.insert("upper".to_string(), channel.upper);
            buffers.insert("middle".to_string(), channel.middle);
            buffers.insert("lower".to_string(), channel.lower);
            IndicatorValues { buffers }
        }
        "fractals" => {
            let f = channels::fractals(&cols.highs, &cols.lows, param_usize(params, "period", 5));
            let mut buffers = HashMap::new();
            buffers.insert("up".to_string(), f.up);
            buffers.insert("down".to_string(), f.down);
            IndicatorValues { buffers }
        }

        "obv" => IndicatorValues::single(volume::obv(&cols.closes, &cols.volumes)),
        "vwap" => IndicatorValues::single(volume::vwap(
            &cols.highs,
            &cols.lows,
            &cols.closes,
            &cols.volumes,
        )),

        _ => return None,
    };

    Some(values)
}
