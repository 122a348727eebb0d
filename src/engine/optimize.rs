// src/engine/optimize.rs
// Parameter-space search: repeats the backtest across a grid of candidate
// assignments, each with completely fresh run state.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::engine::backtest::{
    BacktestConfig, BacktestEngine, CancelToken, PartialBacktestConfig,
};
use crate::engine::metrics::PerformanceMetrics;
use crate::error::EngineError;
use crate::market::Bar;
use crate::strategy::Strategy;

/// One sweepable parameter: a node's parameter key with an inclusive range.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationParameter {
    pub node_id: String,
    pub parameter_key: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationConfig {
    pub parameters: Vec<OptimizationParameter>,
}

/// One evaluated candidate, keyed by "nodeId.parameterKey".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationIteration {
    pub iteration: usize,
    pub parameters: BTreeMap<String, f64>,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    /// Best candidate under the caller's comparator; None only when the run
    /// was cancelled before the first candidate finished.
    pub best: Option<OptimizationIteration>,
    pub iterations: Vec<OptimizationIteration>,
    pub total_iterations: usize,
    pub cancelled: bool,
}

/// Comparator helper: rank candidates by one extracted metric, larger wins.
pub fn maximize<F>(extract: F) -> impl Fn(&PerformanceMetrics, &PerformanceMetrics) -> Ordering
where
    F: Fn(&PerformanceMetrics) -> f64,
{
    move |a, b| {
        extract(a)
            .partial_cmp(&extract(b))
            .unwrap_or(Ordering::Equal)
    }
}

/// Sweep the parameter grid. Every candidate gets a fresh backtest engine
/// and interpreter state; progress is reported after each candidate; the
/// engine itself is metric-agnostic and ranks only via `compare` (Greater
/// means the left candidate is better). Candidates run sequentially so the
/// reported iteration order is deterministic.
pub fn run_optimization<P, C>(
    strategy: &Strategy,
    symbol: &str,
    bars: &[Bar],
    partial: Option<&PartialBacktestConfig>,
    optimization: &OptimizationConfig,
    mut on_progress: P,
    compare: C,
    cancel: Option<&CancelToken>,
) -> Result<OptimizationResult, EngineError>
where
    P: FnMut(f64, usize),
    C: Fn(&PerformanceMetrics, &PerformanceMetrics) -> Ordering,
{
    let combinations = grid_combinations(&optimization.parameters)?;
    let total = combinations.len();

    let mut config = BacktestConfig::from_settings(&strategy.settings);
    if let Some(partial) = partial {
        config = config.merged(partial);
    }

    let mut iterations: Vec<OptimizationIteration> = Vec::with_capacity(total);
    let mut best: Option<usize> = None;
    let mut cancelled = false;

    for (index, assignment) in combinations.iter().enumerate() {
        if cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
            cancelled = true;
            break;
        }

        let candidate = apply_parameters(strategy, &optimization.parameters, assignment);
        let result = BacktestEngine::run(&candidate, symbol, bars, &config, None)?;

        let iteration = OptimizationIteration {
            iteration: index + 1,
            parameters: parameters_record(&optimization.parameters, assignment),
            metrics: result.metrics,
        };

        let is_better = match best {
            Some(best_index) => {
                compare(&iteration.metrics, &iterations[best_index].metrics) == Ordering::Greater
            }
            None => true,
        };
        if is_better {
            best = Some(iterations.len());
        }
        iterations.push(iteration);

        on_progress((index + 1) as f64 / total as f64 * 100.0, index + 1);
    }

    Ok(OptimizationResult {
        best: best.map(|i| iterations[i].clone()),
        total_iterations: iterations.len(),
        iterations,
        cancelled,
    })
}

// Enumerate the full cartesian grid, left parameter varying slowest.
fn grid_combinations(parameters: &[OptimizationParameter]) -> Result<Vec<Vec<f64>>, EngineError> {
    if parameters.is_empty() {
        return Err(EngineError::config("optimization parameter space is empty"));
    }

    let mut axes: Vec<Vec<f64>> = Vec::with_capacity(parameters.len());
    for param in parameters {
        if param.step <= 0.0 || param.max < param.min {
            return Err(EngineError::config(format!(
                "invalid range for {}.{}: min {}, max {}, step {}",
                param.node_id, param.parameter_key, param.min, param.max, param.step
            )));
        }
        let steps = ((param.max - param.min) / param.step + 1e-9).floor() as usize + 1;
        axes.push((0..steps).map(|i| param.min + i as f64 * param.step).collect());
    }

    let mut combinations: Vec<Vec<f64>> = vec![Vec::new()];
    for axis in &axes {
        let mut next = Vec::with_capacity(combinations.len() * axis.len());
        for prefix in &combinations {
            for &value in axis {
                let mut combo = prefix.clone();
                combo.push(value);
                next.push(combo);
            }
        }
        combinations = next;
    }

    Ok(combinations)
}

// Clone the strategy with one assignment written into its node parameters.
fn apply_parameters(
    strategy: &Strategy,
    parameters: &[OptimizationParameter],
    assignment: &[f64],
) -> Strategy {
    let mut candidate = strategy.clone();
    for (param, &value) in parameters.iter().zip(assignment) {
        if let Some(node) = candidate.nodes.iter_mut().find(|n| n.id == param.node_id) {
            node.parameters
                .insert(param.parameter_key.clone(), json!(value));
        }
    }
    candidate
}

fn parameters_record(
    parameters: &[OptimizationParameter],
    assignment: &[f64],
) -> BTreeMap<String, f64> {
    parameters
        .iter()
        .zip(assignment)
        .map(|(param, &value)| {
            (
                format!("{}.{}", param.node_id, param.parameter_key),
                value,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Edge, EventKind, Node, NodeKind};
    use serde_json::json;

    fn trending_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                // Rising with a periodic shakeout so parameters matter
                let wave = ((i % 10) as f64 - 5.0) * 0.0004;
                let price = 1.1000 + i as f64 * 0.0005 + wave;
                Bar {
                    time: (i as i64 + 1) * 3_600_000,
                    open: price,
                    high: price + 0.0006,
                    low: price - 0.0006,
                    close: price,
                    volume: 100.0,
                }
            })
            .collect()
    }

    fn sma_cross_strategy() -> Strategy {
        let mut strategy = Strategy::new("s", "sma entry");
        strategy.settings.spread = 0.0;
        strategy.settings.slippage = 0.0;
        strategy.settings.commission = 0.0;
        strategy.nodes = vec![
            Node::event("ev", EventKind::Tick),
            Node::new("fast", NodeKind::Indicator)
                .with_param("indicator", json!("sma"))
                .with_param("period", json!(5)),
            Node::new("price", NodeKind::Indicator)
                .with_param("indicator", json!("sma"))
                .with_param("period", json!(1)),
            Node::new("cmp", NodeKind::Condition).with_param("operator", json!("gt")),
            Node::new("free", NodeKind::TradeState).with_param("check", json!("no_trade")),
            Node::new("both", NodeKind::Logic).with_param("operator", json!("AND")),
            Node::new("gate", NodeKind::Branch),
            Node::new("buy", NodeKind::Action).with_param("action", json!("buy")),
        ];
        strategy.edges = vec![
            Edge::new("e1", "ev", "flow", "gate", "flow"),
            Edge::new("e2", "price", "value", "cmp", "a"),
            Edge::new("e3", "fast", "value", "cmp", "b"),
            Edge::new("e4", "cmp", "result", "both", "in1"),
            Edge::new("e5", "free", "result", "both", "in2"),
            Edge::new("e6", "both", "result", "gate", "condition"),
            Edge::new("e7", "gate", "true", "buy", "flow"),
        ];
        strategy
    }

    fn period_sweep() -> OptimizationConfig {
        OptimizationConfig {
            parameters: vec![OptimizationParameter {
                node_id: "fast".to_string(),
                parameter_key: "period".to_string(),
                min: 3.0,
                max: 9.0,
                step: 2.0,
            }],
        }
    }

    #[test]
    fn test_grid_enumeration() {
        let params = vec![
            OptimizationParameter {
                node_id: "a".into(),
                parameter_key: "p".into(),
                min: 1.0,
                max: 3.0,
                step: 1.0,
            },
            OptimizationParameter {
                node_id: "b".into(),
                parameter_key: "q".into(),
                min: 0.5,
                max: 1.0,
                step: 0.5,
            },
        ];
        let grid = grid_combinations(&params).unwrap();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid[0], vec![1.0, 0.5]);
        assert_eq!(grid[5], vec![3.0, 1.0]);
    }

    #[test]
    fn test_empty_space_is_config_error() {
        let err = grid_combinations(&[]).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn test_invalid_range_is_config_error() {
        let params = vec![OptimizationParameter {
            node_id: "a".into(),
            parameter_key: "p".into(),
            min: 5.0,
            max: 1.0,
            step: 1.0,
        }];
        assert!(grid_combinations(&params).is_err());
    }

    #[test]
    fn test_progress_reported_per_candidate() {
        let strategy = sma_cross_strategy();
        let bars = trending_bars(60);
        let mut reports: Vec<(f64, usize)> = Vec::new();

        let result = run_optimization(
            &strategy,
            "EURUSD",
            &bars,
            None,
            &period_sweep(),
            |percent, iteration| reports.push((percent, iteration)),
            maximize(|m| m.total_profit),
            None,
        )
        .unwrap();

        assert_eq!(result.total_iterations, 4);
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[0].1, 1);
        assert!((reports[3].0 - 100.0).abs() < 1e-9);
        assert!(result.best.is_some());
    }

    #[test]
    fn test_rerun_is_deterministic_no_state_leakage() {
        let strategy = sma_cross_strategy();
        let bars = trending_bars(80);

        let run = || {
            run_optimization(
                &strategy,
                "EURUSD",
                &bars,
                None,
                &period_sweep(),
                |_, _| {},
                maximize(|m| m.profit_factor),
                None,
            )
            .unwrap()
        };

        let first = run();
        let second = run();

        let best_a = first.best.as_ref().unwrap();
        let best_b = second.best.as_ref().unwrap();
        assert_eq!(best_a.parameters, best_b.parameters);
        assert_eq!(best_a.iteration, best_b.iteration);

        for (a, b) in first.iterations.iter().zip(&second.iterations) {
            assert_eq!(a.parameters, b.parameters);
            assert_eq!(a.metrics.total_trades, b.metrics.total_trades);
            assert_eq!(a.metrics.total_profit, b.metrics.total_profit);
        }
    }

    #[test]
    fn test_cancel_between_candidates() {
        let strategy = sma_cross_strategy();
        let bars = trending_bars(40);
        let token = CancelToken::new();
        token.cancel();

        let result = run_optimization(
            &strategy,
            "EURUSD",
            &bars,
            None,
            &period_sweep(),
            |_, _| {},
            maximize(|m| m.total_profit),
            Some(&token),
        )
        .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.total_iterations, 0);
        assert!(result.best.is_none());
    }

    #[test]
    fn test_candidate_parameters_are_applied() {
        let strategy = sma_cross_strategy();
        let params = vec![OptimizationParameter {
            node_id: "fast".to_string(),
            parameter_key: "period".to_string(),
            min: 7.0,
            max: 7.0,
            step: 1.0,
        }];
        let candidate = apply_parameters(&strategy, &params, &[7.0]);
        assert_eq!(candidate.node("fast").unwrap().param_usize("period"), Some(7));
        // The original is untouched
        assert_eq!(strategy.node("fast").unwrap().param_usize("period"), Some(5));
    }
}
