//! # Flowgraph Engine
//!
//! Visual strategy graph compiler and market-simulation engine.
//!
//! Takes the node/edge document a visual strategy editor produces, resolves
//! a deterministic execution order per event root, replays the logic
//! bar-by-bar over historical OHLCV data, and reports trades, an equity
//! curve and performance metrics. An optimization layer repeats the replay
//! across a parameter grid.
//!
//! ## Example
//! ```
//! use flowgraph_engine::engine::run_backtest;
//! use flowgraph_engine::market::Bar;
//! use flowgraph_engine::strategy::{Edge, EventKind, Node, NodeKind, Strategy};
//!
//! let mut strategy = Strategy::new("demo", "Buy and hold");
//! strategy.nodes.push(Node::event("ev", EventKind::Tick));
//! strategy.nodes.push(Node::new("buy", NodeKind::Action));
//! strategy.edges.push(Edge::new("e1", "ev", "flow", "buy", "flow"));
//!
//! let bars: Vec<Bar> = (0..30i64)
//!     .map(|i| Bar {
//!         time: (i + 1) * 3_600_000,
//!         open: 1.10,
//!         high: 1.101,
//!         low: 1.099,
//!         close: 1.10 + i as f64 * 0.001,
//!         volume: 100.0,
//!     })
//!     .collect();
//!
//! let result = run_backtest(&strategy, "EURUSD", &bars, None).unwrap();
//! assert_eq!(result.equity_curve.len(), bars.len());
//! ```

pub mod common;
pub mod custom;
pub mod engine;
pub mod error;
pub mod graph;
pub mod indicators;
pub mod market;
pub mod mtf;
pub mod strategy;

// Re-export the run boundary at crate root
pub use engine::{
    run_backtest, run_optimization, BacktestConfig, BacktestResult, CancelToken,
    OptimizationConfig, OptimizationResult, PartialBacktestConfig,
};
pub use error::{EngineError, ImportError, Warning};
pub use graph::{resolve_execution_order, validate_graph};
pub use market::{Bar, Timeframe};
pub use strategy::Strategy;

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

/// WASM bindings for browser hosts: JSON in, JSON out.
#[cfg(feature = "wasm")]
#[wasm_bindgen]
pub struct Engine;

#[cfg(feature = "wasm")]
#[wasm_bindgen]
impl Engine {
    /// Run a backtest from a serialized strategy document and bar array.
    /// Returns the serialized result, or a JSON `{ "error": ... }` object.
    #[wasm_bindgen]
    pub fn run_backtest(strategy_json: &str, bars_json: &str, symbol: &str) -> String {
        let strategy: Strategy = match serde_json::from_str(strategy_json) {
            Ok(s) => s,
            Err(e) => return error_json(&format!("failed to parse strategy: {e}")),
        };
        let bars: Vec<Bar> = match serde_json::from_str(bars_json) {
            Ok(b) => b,
            Err(e) => return error_json(&format!("failed to parse bars: {e}")),
        };
        match engine::run_backtest(&strategy, symbol, &bars, None) {
            Ok(result) => serde_json::to_string(&result).unwrap_or_else(|e| error_json(&e.to_string())),
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Parse custom indicator source text into its schema.
    #[wasm_bindgen]
    pub fn import_indicator(source: &str, file_name: &str) -> String {
        match custom::parse_indicator_source(source, file_name) {
            Ok(schema) => serde_json::to_string(&schema).unwrap_or_else(|e| error_json(&e.to_string())),
            Err(e) => error_json(&e.reason),
        }
    }

    /// Block-number annotations for display in the editor.
    #[wasm_bindgen]
    pub fn execution_order(strategy_json: &str) -> String {
        let strategy: Strategy = match serde_json::from_str(strategy_json) {
            Ok(s) => s,
            Err(e) => return error_json(&format!("failed to parse strategy: {e}")),
        };
        let map = graph::resolve_execution_order(&strategy.nodes, &strategy.edges);
        let entries: Vec<serde_json::Value> = map
            .values()
            .map(|info| {
                serde_json::json!({
                    "nodeId": info.node_id,
                    "blockNumber": info.block_number,
                    "eventContext": info.event_context,
                })
            })
            .collect();
        serde_json::to_string(&entries).unwrap_or_else(|e| error_json(&e.to_string()))
    }
}

#[cfg(feature = "wasm")]
fn error_json(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}
