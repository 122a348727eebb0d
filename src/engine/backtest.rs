// src/engine/backtest.rs
// Bar-by-bar replay: consumes a compiled strategy and one OHLCV series,
// produces trades, an equity curve and performance metrics.
//
// Cost convention, applied at the moment of fill and never retroactively:
// entries are worsened by (spread + slippage) pips, the commission
// (per lot, round turn) is charged against the trade's profit at close, and
// the full breakdown is recorded on Trade.costs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::conditions::TradeFilter;
use crate::engine::interpreter::{
    ChartCommand, DispatchContext, Interpreter, MessageEvent, TradeIntent, PIP_SIZE,
};
use crate::engine::metrics::{
    calculate_metrics, calculate_statistics, EquityPoint, PerformanceMetrics, TradeStatistics,
};
use crate::engine::state::{
    PendingOrder, PendingOrderKind, RunState, Trade, TradeCosts, TradeDirection,
};
use crate::error::{EngineError, Warning};
use crate::graph::validate::validate_graph;
use crate::market::{validate_series, Bar};
use crate::mtf::MultiTimeframeAnalyzer;
use crate::strategy::{EventKind, Strategy, StrategySettings};

/// Account-currency value of one pip for one standard lot.
pub const PIP_VALUE_PER_LOT: f64 = 10.0;

// ============================================================================
// Config
// ============================================================================

/// Immutable configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,
    pub initial_balance: f64,
    pub leverage: f64,
    /// Pips added against the entry price at fill time.
    pub spread: f64,
    /// Commission per lot per round turn, in account currency.
    pub commission: f64,
    /// Pips of adverse slippage at fill time.
    pub slippage: f64,
}

impl BacktestConfig {
    pub fn from_settings(settings: &StrategySettings) -> Self {
        BacktestConfig {
            start_date: None,
            end_date: None,
            initial_balance: settings.initial_balance,
            leverage: settings.leverage,
            spread: settings.spread,
            commission: settings.commission,
            slippage: settings.slippage,
        }
    }

    pub fn merged(mut self, partial: &PartialBacktestConfig) -> Self {
        if partial.start_date.is_some() {
            self.start_date = partial.start_date;
        }
        if partial.end_date.is_some() {
            self.end_date = partial.end_date;
        }
        if let Some(v) = partial.initial_balance {
            self.initial_balance = v;
        }
        if let Some(v) = partial.leverage {
            self.leverage = v;
        }
        if let Some(v) = partial.spread {
            self.spread = v;
        }
        if let Some(v) = partial.commission {
            self.commission = v;
        }
        if let Some(v) = partial.slippage {
            self.slippage = v;
        }
        self
    }
}

/// Caller-supplied overrides; anything unset falls back to strategy settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialBacktestConfig {
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub initial_balance: Option<f64>,
    pub leverage: Option<f64>,
    pub spread: Option<f64>,
    pub commission: Option<f64>,
    pub slippage: Option<f64>,
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag, checked between bars. Cancelling yields a
/// partial result marked `cancelled`; it is never an error.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Result
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub statistics: TradeStatistics,
    pub messages: Vec<MessageEvent>,
    pub chart_commands: Vec<ChartCommand>,
    pub warnings: Vec<Warning>,
    pub final_balance: f64,
    pub cancelled: bool,
}

// ============================================================================
// Engine
// ============================================================================

pub struct BacktestEngine;

impl BacktestEngine {
    /// Replay the strategy over the series. Fatal errors are returned before
    /// any simulation; warnings and cancellation ride on the result.
    pub fn run(
        strategy: &Strategy,
        symbol: &str,
        bars: &[Bar],
        config: &BacktestConfig,
        cancel: Option<&CancelToken>,
    ) -> Result<BacktestResult, EngineError> {
        if config.initial_balance <= 0.0 {
            return Err(EngineError::config("initial balance must be positive"));
        }
        if bars.is_empty() {
            return Err(EngineError::config("no bars supplied"));
        }
        if let Err(index) = validate_series(bars) {
            return Err(EngineError::config(format!(
                "bar series not strictly ascending at index {index}"
            )));
        }

        let bars = filter_range(bars, config.start_date, config.end_date);
        if bars.is_empty() {
            return Err(EngineError::config("no bars in the requested date range"));
        }

        let mut warnings = validate_graph(&strategy.nodes, &strategy.edges).warnings;
        let mut interpreter = Interpreter::new(strategy)?;
        warnings.extend(interpreter.prepare(bars));

        let settings = &strategy.settings;
        let mut state = RunState::new(config.initial_balance);
        let mut mtf = MultiTimeframeAnalyzer::new();
        mtf.add_symbol(symbol);
        mtf.set_timeframe_data(symbol, settings.timeframe, bars.to_vec());

        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(bars.len());
        let mut messages: Vec<MessageEvent> = Vec::new();
        let mut chart_commands: Vec<ChartCommand> = Vec::new();
        let mut peak_equity = config.initial_balance;
        let mut cancelled = false;

        let timer_interval_ms = settings.timer_interval_secs.map(|s| s as i64 * 1000);
        let mut last_timer_fire = bars[0].time;
        let mut activity_last_bar = false;

        for index in 0..bars.len() {
            let bar = bars[index];
            let mut activity = 0usize;

            // Resting orders and protective exits react to the bar's range
            // before any event logic runs on it.
            activity += trigger_pending_orders(&mut state, &bar, config, settings, &mut warnings);
            activity += apply_protective_exits(&mut state, &bar, settings);

            // Which events fire on this bar
            let mut events: Vec<EventKind> = Vec::with_capacity(3);
            if index == 0 {
                events.push(EventKind::Init);
            }
            events.push(EventKind::Tick);
            if let Some(interval) = timer_interval_ms {
                if bar.time - last_timer_fire >= interval {
                    events.push(EventKind::Timer);
                    last_timer_fire = bar.time;
                }
            }
            if activity_last_bar {
                events.push(EventKind::Trade);
            }

            let mut intents: Vec<TradeIntent> = Vec::new();
            for event in events {
                let mut ctx = DispatchContext::new(bars, index, &mut state, &mut mtf, symbol);
                interpreter.dispatch(event, &mut ctx);
                intents.extend(ctx.intents.drain(..));
                messages.extend(ctx.messages.drain(..));
                chart_commands.extend(ctx.chart_commands.drain(..));
                warnings.extend(ctx.warnings.drain(..));
            }

            activity += apply_intents(&mut state, &bar, intents, config, settings, &mut warnings);
            activity_last_bar = activity > 0;

            // Mark to market and sample the equity curve
            state.equity = state.balance + unrealized_profit(&state, bar.close);
            peak_equity = peak_equity.max(state.equity);
            let drawdown = peak_equity - state.equity;
            equity_curve.push(EquityPoint {
                time: bar.time,
                balance: state.balance,
                equity: state.equity,
                drawdown,
                drawdown_percent: if peak_equity > 0.0 {
                    drawdown / peak_equity * 100.0
                } else {
                    0.0
                },
            });

            // Cooperative cancellation, checked between bars
            if index + 1 < bars.len() && cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
                cancelled = true;
                break;
            }
        }

        if !cancelled {
            let last_index = bars.len() - 1;
            let last_bar = bars[last_index];

            let mut ctx = DispatchContext::new(bars, last_index, &mut state, &mut mtf, symbol);
            interpreter.dispatch(EventKind::Deinit, &mut ctx);
            let deinit_intents: Vec<TradeIntent> = ctx.intents.drain(..).collect();
            messages.extend(ctx.messages.drain(..));
            chart_commands.extend(ctx.chart_commands.drain(..));
            warnings.extend(ctx.warnings.drain(..));
            drop(ctx);
            apply_intents(&mut state, &last_bar, deinit_intents, config, settings, &mut warnings);

            // The series ended: everything still open closes on the last bar
            while let Some(trade) = state.open_trades.pop() {
                let closed = close_trade(trade, last_bar.time, last_bar.close, "End of data");
                state.balance += closed.profit.unwrap_or(0.0);
                state.closed_trades.push(closed);
            }
            state.equity = state.balance;
        }

        let mut trades = state.closed_trades.clone();
        trades.sort_by_key(|t| (t.exit_time.unwrap_or(i64::MAX), t.id));

        let metrics = calculate_metrics(&trades, &equity_curve, config.initial_balance);
        let statistics = calculate_statistics(&trades);

        Ok(BacktestResult {
            final_balance: state.balance,
            trades,
            equity_curve,
            metrics,
            statistics,
            messages,
            chart_commands,
            warnings,
            cancelled,
        })
    }
}

/// External entry point: merge caller overrides over strategy settings and
/// run one backtest.
pub fn run_backtest(
    strategy: &Strategy,
    symbol: &str,
    bars: &[Bar],
    partial: Option<&PartialBacktestConfig>,
) -> Result<BacktestResult, EngineError> {
    let mut config = BacktestConfig::from_settings(&strategy.settings);
    if let Some(partial) = partial {
        config = config.merged(partial);
    }
    BacktestEngine::run(strategy, symbol, bars, &config, None)
}

// ============================================================================
// Fills and exits
// ============================================================================

fn filter_range(bars: &[Bar], start: Option<i64>, end: Option<i64>) -> &[Bar] {
    let from = match start {
        Some(start) => bars.partition_point(|b| b.time < start),
        None => 0,
    };
    let to = match end {
        Some(end) => bars.partition_point(|b| b.time <= end),
        None => bars.len(),
    };
    &bars[from.min(to)..to]
}

fn unrealized_profit(state: &RunState, price: f64) -> f64 {
    state
        .open_trades
        .iter()
        .map(|t| trade_pips(t.direction, t.entry_price, price) * t.lots * PIP_VALUE_PER_LOT)
        .sum()
}

fn trade_pips(direction: TradeDirection, entry: f64, exit: f64) -> f64 {
    match direction {
        TradeDirection::Buy => (exit - entry) / PIP_SIZE,
        TradeDirection::Sell => (entry - exit) / PIP_SIZE,
    }
}

// Fill costs at the moment of entry: adverse price adjustment plus the
// recorded commission that is charged against profit at close.
fn entry_fill(
    direction: TradeDirection,
    raw_price: f64,
    lots: f64,
    config: &BacktestConfig,
) -> (f64, TradeCosts) {
    let adjustment = (config.spread + config.slippage) * PIP_SIZE;
    let entry_price = match direction {
        TradeDirection::Buy => raw_price + adjustment,
        TradeDirection::Sell => raw_price - adjustment,
    };
    let costs = TradeCosts {
        spread: config.spread * lots * PIP_VALUE_PER_LOT,
        slippage: config.slippage * lots * PIP_VALUE_PER_LOT,
        commission: config.commission * lots,
    };
    (entry_price, costs)
}

fn open_market_trade(
    state: &mut RunState,
    bar: &Bar,
    direction: TradeDirection,
    lots: f64,
    stop_loss_pips: Option<f64>,
    take_profit_pips: Option<f64>,
    reason: String,
    config: &BacktestConfig,
    settings: &StrategySettings,
    warnings: &mut Vec<Warning>,
) -> bool {
    if state.open_trades.len() >= settings.max_positions {
        warnings.push(Warning::new(
            bar.time,
            format!(
                "entry '{}' dropped: max positions ({}) reached",
                reason, settings.max_positions
            ),
        ));
        return false;
    }

    let (entry_price, costs) = entry_fill(direction, bar.close, lots, config);
    let sign = match direction {
        TradeDirection::Buy => 1.0,
        TradeDirection::Sell => -1.0,
    };
    let stop_loss = stop_loss_pips
        .filter(|_| settings.use_stop_loss)
        .map(|pips| entry_price - sign * pips * PIP_SIZE);
    let take_profit = take_profit_pips
        .filter(|_| settings.use_take_profit)
        .map(|pips| entry_price + sign * pips * PIP_SIZE);

    let id = state.next_id();
    state.open_trades.push(Trade {
        id,
        direction,
        entry_time: bar.time,
        entry_price,
        exit_time: None,
        exit_price: None,
        lots,
        stop_loss,
        take_profit,
        profit: None,
        pips: None,
        costs,
        reason: Some(reason),
    });
    true
}

fn close_trade(mut trade: Trade, time: i64, price: f64, reason: &str) -> Trade {
    let pips = trade_pips(trade.direction, trade.entry_price, price);
    trade.exit_time = Some(time);
    trade.exit_price = Some(price);
    trade.pips = Some(pips);
    trade.profit = Some(pips * trade.lots * PIP_VALUE_PER_LOT - trade.costs.commission);
    trade.reason = Some(reason.to_string());
    trade
}

// Stop-loss and take-profit checks against the bar's range; the stop is
// checked first when both levels sit inside one bar.
fn apply_protective_exits(state: &mut RunState, bar: &Bar, settings: &StrategySettings) -> usize {
    let mut closed = 0;
    let mut index = 0;
    while index < state.open_trades.len() {
        let trade = &state.open_trades[index];
        let mut exit: Option<(f64, &str)> = None;

        if settings.use_stop_loss {
            if let Some(stop) = trade.stop_loss {
                let hit = match trade.direction {
                    TradeDirection::Buy => bar.low <= stop,
                    TradeDirection::Sell => bar.high >= stop,
                };
                if hit {
                    exit = Some((stop, "Stop Loss"));
                }
            }
        }
        if exit.is_none() && settings.use_take_profit {
            if let Some(target) = trade.take_profit {
                let hit = match trade.direction {
                    TradeDirection::Buy => bar.high >= target,
                    TradeDirection::Sell => bar.low <= target,
                };
                if hit {
                    exit = Some((target, "Take Profit"));
                }
            }
        }

        if let Some((price, reason)) = exit {
            let trade = state.open_trades.remove(index);
            let closed_trade = close_trade(trade, bar.time, price, reason);
            state.balance += closed_trade.profit.unwrap_or(0.0);
            state.closed_trades.push(closed_trade);
            closed += 1;
        } else {
            index += 1;
        }
    }
    closed
}

// Convert resting orders whose level the bar touched into open trades.
fn trigger_pending_orders(
    state: &mut RunState,
    bar: &Bar,
    config: &BacktestConfig,
    settings: &StrategySettings,
    warnings: &mut Vec<Warning>,
) -> usize {
    let mut filled = 0;
    let mut index = 0;
    while index < state.pending_orders.len() {
        let order = &state.pending_orders[index];
        let touched = match order.kind {
            PendingOrderKind::BuyLimit | PendingOrderKind::SellStop => bar.low <= order.price,
            PendingOrderKind::BuyStop | PendingOrderKind::SellLimit => bar.high >= order.price,
        };

        if touched {
            let order = state.pending_orders.remove(index);
            let opened = open_market_fill_at(
                state,
                bar,
                order,
                config,
                settings,
                warnings,
            );
            if opened {
                filled += 1;
            }
        } else {
            index += 1;
        }
    }
    filled
}

fn open_market_fill_at(
    state: &mut RunState,
    bar: &Bar,
    order: PendingOrder,
    config: &BacktestConfig,
    settings: &StrategySettings,
    warnings: &mut Vec<Warning>,
) -> bool {
    let direction = order.kind.direction();
    if state.open_trades.len() >= settings.max_positions {
        warnings.push(Warning::new(
            bar.time,
            format!(
                "pending order {} dropped at trigger: max positions ({}) reached",
                order.id, settings.max_positions
            ),
        ));
        return false;
    }

    let (entry_price, costs) = entry_fill(direction, order.price, order.lots, config);
    let sign = match direction {
        TradeDirection::Buy => 1.0,
        TradeDirection::Sell => -1.0,
    };
    let stop_loss = order
        .stop_loss
        .filter(|_| settings.use_stop_loss)
        .map(|pips| entry_price - sign * pips * PIP_SIZE);
    let take_profit = order
        .take_profit
        .filter(|_| settings.use_take_profit)
        .map(|pips| entry_price + sign * pips * PIP_SIZE);

    let id = state.next_id();
    state.open_trades.push(Trade {
        id,
        direction,
        entry_time: bar.time,
        entry_price,
        exit_time: None,
        exit_price: None,
        lots: order.lots,
        stop_loss,
        take_profit,
        profit: None,
        pips: None,
        costs,
        reason: Some("Pending order fill".to_string()),
    });
    true
}

// Apply the intents one dispatch produced, in order.
fn apply_intents(
    state: &mut RunState,
    bar: &Bar,
    intents: Vec<TradeIntent>,
    config: &BacktestConfig,
    settings: &StrategySettings,
    warnings: &mut Vec<Warning>,
) -> usize {
    let mut activity = 0;

    for intent in intents {
        match intent {
            TradeIntent::OpenMarket {
                direction,
                lots,
                stop_loss_pips,
                take_profit_pips,
                reason,
            } => {
                if open_market_trade(
                    state,
                    bar,
                    direction,
                    lots,
                    stop_loss_pips,
                    take_profit_pips,
                    reason,
                    config,
                    settings,
                    warnings,
                ) {
                    activity += 1;
                }
            }
            TradeIntent::PlacePending {
                kind,
                price,
                lots,
                stop_loss_pips,
                take_profit_pips,
            } => {
                let id = state.next_id();
                state.pending_orders.push(PendingOrder {
                    id,
                    kind,
                    price,
                    lots,
                    stop_loss: stop_loss_pips,
                    take_profit: take_profit_pips,
                });
            }
            TradeIntent::CloseAll { filter, reason } => {
                let mut index = 0;
                while index < state.open_trades.len() {
                    let matches = match filter {
                        TradeFilter::Any => true,
                        TradeFilter::Buy => {
                            state.open_trades[index].direction == TradeDirection::Buy
                        }
                        TradeFilter::Sell => {
                            state.open_trades[index].direction == TradeDirection::Sell
                        }
                    };
                    if matches {
                        let trade = state.open_trades.remove(index);
                        let closed = close_trade(trade, bar.time, bar.close, &reason);
                        state.balance += closed.profit.unwrap_or(0.0);
                        state.closed_trades.push(closed);
                        activity += 1;
                    } else {
                        index += 1;
                    }
                }
            }
        }
    }

    activity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Edge, Node, NodeKind};
    use approx::assert_relative_eq;
    use serde_json::json;

    fn rising_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let price = 1.1000 + i as f64 * 0.0010;
                Bar {
                    time: (i as i64 + 1) * 3_600_000,
                    open: price,
                    high: price + 0.0005,
                    low: price - 0.0005,
                    close: price,
                    volume: 100.0,
                }
            })
            .collect()
    }

    fn buy_only_strategy() -> Strategy {
        let mut strategy = Strategy::new("s", "buy only");
        strategy.nodes = vec![
            Node::event("ev", EventKind::Tick),
            Node::new("gate", NodeKind::Branch),
            Node::new("free", NodeKind::TradeState).with_param("check", json!("no_trade")),
            Node::new("buy", NodeKind::Action)
                .with_param("action", json!("buy"))
                .with_param("lots", json!(1.0)),
        ];
        strategy.edges = vec![
            Edge::new("e1", "ev", "flow", "gate", "flow"),
            Edge::new("e2", "free", "result", "gate", "condition"),
            Edge::new("e3", "gate", "true", "buy", "flow"),
        ];
        strategy
    }

    fn zero_cost(config: &mut BacktestConfig) {
        config.spread = 0.0;
        config.slippage = 0.0;
        config.commission = 0.0;
    }

    #[test]
    fn test_buy_only_rising_series_all_wins() {
        let strategy = buy_only_strategy();
        let bars = rising_bars(50);
        let mut config = BacktestConfig::from_settings(&strategy.settings);
        zero_cost(&mut config);

        let result = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap();

        assert!(!result.cancelled);
        assert!(!result.trades.is_empty());
        assert_relative_eq!(result.metrics.gross_loss, 0.0);
        assert_relative_eq!(result.metrics.win_rate, 100.0);
        assert!(result.final_balance > config.initial_balance);
    }

    #[test]
    fn test_equity_curve_matches_bars_and_is_ascending() {
        let strategy = buy_only_strategy();
        let bars = rising_bars(30);
        let config = BacktestConfig::from_settings(&strategy.settings);
        let result = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap();

        assert_eq!(result.equity_curve.len(), bars.len());
        assert!(result
            .equity_curve
            .windows(2)
            .all(|w| w[1].time > w[0].time));
    }

    #[test]
    fn test_max_positions_single_vs_multi() {
        // No entry guard: the action fires on every tick
        let mut strategy = Strategy::new("s", "greedy");
        strategy.nodes = vec![
            Node::event("ev", EventKind::Tick),
            Node::new("buy", NodeKind::Action).with_param("action", json!("buy")),
        ];
        strategy.edges = vec![Edge::new("e1", "ev", "flow", "buy", "flow")];
        let bars = rising_bars(10);

        strategy.settings.max_positions = 1;
        let config = BacktestConfig::from_settings(&strategy.settings);
        let result = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap();
        // One open slot: one trade total, the rest dropped with warnings
        assert_eq!(result.trades.len(), 1);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("max positions")));

        strategy.settings.max_positions = 3;
        let result = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap();
        assert_eq!(result.trades.len(), 3);
    }

    #[test]
    fn test_stop_loss_exit_with_costs_recorded() {
        let mut strategy = Strategy::new("s", "stopped");
        strategy.nodes = vec![
            Node::event("ev", EventKind::Tick),
            Node::new("gate", NodeKind::Branch),
            Node::new("free", NodeKind::TradeState).with_param("check", json!("no_trade")),
            Node::new("buy", NodeKind::Action)
                .with_param("action", json!("buy"))
                .with_param("lots", json!(1.0))
                .with_param("stopLossPips", json!(10.0)),
        ];
        strategy.edges = vec![
            Edge::new("e1", "ev", "flow", "gate", "flow"),
            Edge::new("e2", "free", "result", "gate", "condition"),
            Edge::new("e3", "gate", "true", "buy", "flow"),
        ];

        // Price collapses after the first bar
        let mut bars = rising_bars(2);
        bars[1].open = 1.0950;
        bars[1].high = 1.0955;
        bars[1].low = 1.0900;
        bars[1].close = 1.0910;

        let mut config = BacktestConfig::from_settings(&strategy.settings);
        config.spread = 1.0;
        config.slippage = 1.0;
        config.commission = 7.0;

        let result = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap();
        let trade = &result.trades[0];
        assert_eq!(trade.reason.as_deref(), Some("Stop Loss"));
        // Entry worsened by 2 pips; exit exactly 10 pips below entry
        assert_relative_eq!(trade.entry_price, 1.1000 + 2.0 * PIP_SIZE, epsilon = 1e-9);
        assert_relative_eq!(trade.pips.unwrap(), -10.0, epsilon = 1e-6);
        // 10 pips * 1 lot * 10 currency/pip + 7 commission
        assert_relative_eq!(trade.profit.unwrap(), -107.0, epsilon = 1e-6);
        assert_relative_eq!(trade.costs.commission, 7.0);
        assert_relative_eq!(trade.costs.spread, 10.0);
    }

    #[test]
    fn test_pending_order_fills_when_touched() {
        let mut strategy = Strategy::new("s", "resting");
        strategy.nodes = vec![
            Node::event("ev", EventKind::Tick),
            Node::new("gate", NodeKind::Branch),
            Node::new("clear", NodeKind::TradeState)
                .with_param("check", json!("no_trade_or_order")),
            Node::new("order", NodeKind::Action)
                .with_param("action", json!("buy_limit"))
                .with_param("price", json!(1.0990))
                .with_param("lots", json!(0.5)),
        ];
        strategy.edges = vec![
            Edge::new("e1", "ev", "flow", "gate", "flow"),
            Edge::new("e2", "clear", "result", "gate", "condition"),
            Edge::new("e3", "gate", "true", "order", "flow"),
        ];

        // Bar 2 dips to the limit level
        let mut bars = rising_bars(4);
        bars[2].low = 1.0985;

        let mut config = BacktestConfig::from_settings(&strategy.settings);
        zero_cost(&mut config);

        let result = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_relative_eq!(trade.entry_price, 1.0990, epsilon = 1e-9);
        assert_eq!(trade.direction, TradeDirection::Buy);
    }

    #[test]
    fn test_cancellation_returns_partial_curve() {
        let strategy = buy_only_strategy();
        let bars = rising_bars(100);
        let config = BacktestConfig::from_settings(&strategy.settings);

        // Token already cancelled: the run stops at the first between-bars
        // check, returning one processed bar as the partial result
        let token = CancelToken::new();
        token.cancel();
        let result =
            BacktestEngine::run(&strategy, "EURUSD", &bars, &config, Some(&token)).unwrap();
        assert!(result.cancelled);
        assert!(!result.equity_curve.is_empty());
        assert!(result.equity_curve.len() < bars.len());
    }

    #[test]
    fn test_timer_event_fires_on_interval() {
        let mut strategy = Strategy::new("s", "timed");
        strategy.settings.timer_interval_secs = Some(7200); // every two hourly bars
        strategy.nodes = vec![
            Node::event("ev", EventKind::Timer),
            Node::new("ping", NodeKind::Messaging).with_param("message", json!("timer ping")),
        ];
        strategy.edges = vec![Edge::new("e1", "ev", "flow", "ping", "flow")];

        let bars = rising_bars(9);
        let config = BacktestConfig::from_settings(&strategy.settings);
        let result = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap();
        assert_eq!(result.equity_curve.len(), 9);
        // Hourly bars, two-hour interval: fires on bars 2, 4, 6 and 8
        let pings = result
            .messages
            .iter()
            .filter(|m| m.text == "timer ping")
            .count();
        assert_eq!(pings, 4);
    }

    #[test]
    fn test_date_range_filter_and_empty_range_error() {
        let strategy = buy_only_strategy();
        let bars = rising_bars(10);

        let mut config = BacktestConfig::from_settings(&strategy.settings);
        config.start_date = Some(bars[5].time);
        let result = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap();
        assert_eq!(result.equity_curve.len(), 5);

        config.start_date = Some(bars[9].time + 1);
        let err = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn test_unsorted_series_is_config_error() {
        let strategy = buy_only_strategy();
        let mut bars = rising_bars(5);
        bars[3].time = bars[2].time;
        let config = BacktestConfig::from_settings(&strategy.settings);
        let err = BacktestEngine::run(&strategy, "EURUSD", &bars, &config, None).unwrap_err();
        assert!(err.to_string().contains("ascending"));
    }
}
