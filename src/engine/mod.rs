// src/engine/mod.rs
// Strategy execution: interpreter, simulated book, replay and optimization

pub mod backtest;
pub mod conditions;
pub mod interpreter;
pub mod metrics;
pub mod optimize;
pub mod state;
pub mod value;

pub use backtest::{
    run_backtest, BacktestConfig, BacktestEngine, BacktestResult, CancelToken,
    PartialBacktestConfig,
};
pub use interpreter::{DispatchContext, Interpreter, TradeIntent};
pub use metrics::{EquityPoint, PerformanceMetrics, TradeStatistics};
pub use optimize::{
    maximize, run_optimization, OptimizationConfig, OptimizationParameter, OptimizationResult,
};
pub use state::{PendingOrder, RunState, Trade, TradeDirection};
pub use value::PortValue;
