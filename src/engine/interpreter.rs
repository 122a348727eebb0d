// src/engine/interpreter.rs
// Walks the annotated strategy graph once per event firing, threading typed
// values along edges and collecting trade/message/chart intents for the
// backtest engine to apply.

use std::collections::{BTreeMap, HashMap};

use crate::engine::conditions::{
    self, CountOp, OrderFilter, TradeFilter, ValueOp,
};
use crate::engine::state::{PendingOrderKind, RunState, TradeDirection};
use crate::engine::value::PortValue;
use crate::error::{EngineError, Warning};
use crate::graph::order::{resolve_execution_order, ExecutionInfo};
use crate::graph::validate::check_structure;
use crate::indicators::{self, IndicatorValues, VALUE_BUFFER};
use crate::market::{Bar, Timeframe};
use crate::mtf::{MultiTimeframeAnalyzer, Trend, TrendMethod};
use crate::strategy::{ActionKind, EventKind, Node, NodeKind, PortKind, Strategy};

/// Safety bound for loop constructs when a node sets none itself.
pub const MAX_LOOP_ITERATIONS: usize = 1000;

// Depth bound for on-demand evaluation of pure value chains.
const MAX_PULL_DEPTH: u32 = 32;

/// Standard pip size used for pip-denominated parameters.
pub const PIP_SIZE: f64 = 0.0001;

// ============================================================================
// Intents collected during a dispatch
// ============================================================================

/// A trade request produced by an action node; the backtest engine is the
/// only component that turns intents into fills.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeIntent {
    OpenMarket {
        direction: TradeDirection,
        lots: f64,
        stop_loss_pips: Option<f64>,
        take_profit_pips: Option<f64>,
        reason: String,
    },
    PlacePending {
        kind: PendingOrderKind,
        price: f64,
        lots: f64,
        stop_loss_pips: Option<f64>,
        take_profit_pips: Option<f64>,
    },
    CloseAll {
        filter: TradeFilter,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub time: i64,
    pub channel: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartCommand {
    pub time: i64,
    pub object: String,
    pub price: f64,
}

/// Mutable context for one event dispatch on one bar.
pub struct DispatchContext<'run> {
    pub bars: &'run [Bar],
    pub index: usize,
    pub state: &'run mut RunState,
    pub mtf: &'run mut MultiTimeframeAnalyzer,
    pub symbol: String,
    pub intents: Vec<TradeIntent>,
    pub messages: Vec<MessageEvent>,
    pub chart_commands: Vec<ChartCommand>,
    pub warnings: Vec<Warning>,
    values: HashMap<(String, String), PortValue>,
}

impl<'run> DispatchContext<'run> {
    pub fn new(
        bars: &'run [Bar],
        index: usize,
        state: &'run mut RunState,
        mtf: &'run mut MultiTimeframeAnalyzer,
        symbol: impl Into<String>,
    ) -> Self {
        DispatchContext {
            bars,
            index,
            state,
            mtf,
            symbol: symbol.into(),
            intents: Vec::new(),
            messages: Vec::new(),
            chart_commands: Vec::new(),
            warnings: Vec::new(),
            values: HashMap::new(),
        }
    }

    pub fn bar(&self) -> &Bar {
        &self.bars[self.index]
    }

    fn write(&mut self, node_id: &str, port: &str, value: PortValue) {
        self.values
            .insert((node_id.to_string(), port.to_string()), value);
    }

    fn read(&self, node_id: &str, port: &str) -> Option<&PortValue> {
        self.values.get(&(node_id.to_string(), port.to_string()))
    }
}

// Outcome of walking one node, used by loop constructs.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FlowSignal {
    Continue,
    Break,
    NextIteration,
}

// ============================================================================
// Interpreter
// ============================================================================

/// Compiled form of one strategy: the graph with execution-order annotations
/// and the per-node adjacency needed to walk it.
#[derive(Debug)]
pub struct Interpreter<'a> {
    strategy: &'a Strategy,
    execution: BTreeMap<String, ExecutionInfo>,
    nodes: HashMap<String, &'a Node>,
    // (node, output port) -> flow targets, sorted by the target's block number
    flow_targets: HashMap<(String, String), Vec<String>>,
    // (node, input port) -> (source node, source port), for single-writer inputs
    value_sources: HashMap<(String, String), (String, String)>,
    // node -> every incoming value edge in declaration order (logic gates)
    value_inputs: HashMap<String, Vec<(String, String)>>,
    // indicator node id -> whole-series buffers, computed once per run
    indicator_series: HashMap<String, IndicatorValues>,
}

impl<'a> Interpreter<'a> {
    /// Compile a strategy: validate structure, resolve execution order, and
    /// build the walk tables. Fails fast on structural errors.
    pub fn new(strategy: &'a Strategy) -> Result<Self, EngineError> {
        check_structure(&strategy.nodes, &strategy.edges)?;
        let execution = resolve_execution_order(&strategy.nodes, &strategy.edges);

        let nodes: HashMap<String, &Node> = strategy
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        let mut flow_targets: HashMap<(String, String), Vec<String>> = HashMap::new();
        let mut value_sources: HashMap<(String, String), (String, String)> = HashMap::new();
        let mut value_inputs: HashMap<String, Vec<(String, String)>> = HashMap::new();

        for edge in &strategy.edges {
            let Some(source) = nodes.get(&edge.source_node_id) else {
                continue;
            };
            match source.kind.output_port_kind(&edge.source_port_id) {
                Some(PortKind::Flow) => {
                    flow_targets
                        .entry((edge.source_node_id.clone(), edge.source_port_id.clone()))
                        .or_default()
                        .push(edge.target_node_id.clone());
                }
                Some(_) => {
                    value_sources.insert(
                        (edge.target_node_id.clone(), edge.target_port_id.clone()),
                        (edge.source_node_id.clone(), edge.source_port_id.clone()),
                    );
                    value_inputs
                        .entry(edge.target_node_id.clone())
                        .or_default()
                        .push((edge.source_node_id.clone(), edge.source_port_id.clone()));
                }
                None => {}
            }
        }

        // Sibling continuations run in ascending block-number order
        for targets in flow_targets.values_mut() {
            targets.sort_by_key(|id| execution.get(id).map(|i| i.block_number).unwrap_or(u32::MAX));
        }

        Ok(Interpreter {
            strategy,
            execution,
            nodes,
            flow_targets,
            value_sources,
            value_inputs,
            indicator_series: HashMap::new(),
        })
    }

    pub fn execution_info(&self, node_id: &str) -> Option<&ExecutionInfo> {
        self.execution.get(node_id)
    }

    /// Compute every indicator node's series once for the whole run.
    /// Unknown indicator names read as NaN and produce one warning.
    pub fn prepare(&mut self, bars: &[Bar]) -> Vec<Warning> {
        let mut warnings = Vec::new();
        for node in &self.strategy.nodes {
            if node.kind != NodeKind::Indicator {
                continue;
            }
            let name = node.param_str("indicator").unwrap_or_default().to_string();
            match indicators::compute(&name, bars, &node.parameters) {
                Some(values) => {
                    self.indicator_series.insert(node.id.clone(), values);
                }
                None => warnings.push(Warning::pre_run(format!(
                    "block '{}': unknown indicator '{}', reads as NaN",
                    node.id, name
                ))),
            }
        }
        warnings
    }

    /// Fire one lifecycle event: walk every matching event root's subgraph
    /// independently, roots in block-number order.
    pub fn dispatch(&self, event: EventKind, ctx: &mut DispatchContext) {
        let mut roots: Vec<&Node> = self
            .strategy
            .event_nodes()
            .filter(|n| n.event == Some(event))
            .collect();
        roots.sort_by_key(|n| {
            self.execution
                .get(&n.id)
                .map(|i| i.block_number)
                .unwrap_or(u32::MAX)
        });

        for root in roots {
            for target in self.all_flow_targets(&root.id) {
                self.walk(&target, ctx, 0);
            }
        }
    }

    // All flow successors of a node across its flow output ports, in
    // block-number order.
    fn all_flow_targets(&self, node_id: &str) -> Vec<String> {
        let mut targets: Vec<String> = self
            .flow_targets
            .iter()
            .filter(|((source, _), _)| source == node_id)
            .flat_map(|(_, t)| t.iter().cloned())
            .collect();
        targets.sort_by_key(|id| {
            self.execution
                .get(id)
                .map(|i| i.block_number)
                .unwrap_or(u32::MAX)
        });
        targets
    }

    fn port_targets(&self, node_id: &str, port: &str) -> &[String] {
        self.flow_targets
            .get(&(node_id.to_string(), port.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // Walk one node: evaluate it, then propagate along the taken flow ports.
    fn walk(&self, node_id: &str, ctx: &mut DispatchContext, depth: u32) -> FlowSignal {
        let Some(node) = self.nodes.get(node_id).copied() else {
            return FlowSignal::Continue;
        };

        match node.kind {
            NodeKind::Event => FlowSignal::Continue,

            NodeKind::Branch => {
                let taken = self
                    .pull_value("condition", node, ctx, 0)
                    .map(|v| v.is_truthy())
                    .unwrap_or(false);
                let port = if taken { "true" } else { "false" };
                self.run_targets(node_id, port, ctx, depth)
            }

            NodeKind::Loop => self.run_loop(node, ctx, depth),

            NodeKind::LoopBreak => FlowSignal::Break,
            NodeKind::LoopContinue => FlowSignal::NextIteration,

            _ => {
                self.execute_node(node, ctx, 0);
                for target in self.all_flow_targets(node_id) {
                    let signal = self.walk(&target, ctx, depth);
                    if signal != FlowSignal::Continue {
                        return signal;
                    }
                }
                FlowSignal::Continue
            }
        }
    }

    fn run_targets(
        &self,
        node_id: &str,
        port: &str,
        ctx: &mut DispatchContext,
        depth: u32,
    ) -> FlowSignal {
        for target in self.port_targets(node_id, port).to_vec() {
            let signal = self.walk(&target, ctx, depth);
            if signal != FlowSignal::Continue {
                return signal;
            }
        }
        FlowSignal::Continue
    }

    // Loop constructs re-enter their body up to the iteration cap, then abort
    // with a warning. `break` ends the loop early; `continue` ends only the
    // current pass. The done port runs unless the cap was hit.
    fn run_loop(&self, node: &Node, ctx: &mut DispatchContext, depth: u32) -> FlowSignal {
        let cap = node
            .param_usize("maxIterations")
            .unwrap_or(MAX_LOOP_ITERATIONS);
        let loop_kind = node.param_str("loop").unwrap_or("repeat");

        let mut iterations = 0usize;
        let mut aborted = false;

        loop {
            let proceed = match loop_kind {
                "while" => self
                    .pull_value("condition", node, ctx, 0)
                    .map(|v| v.is_truthy())
                    .unwrap_or(false),
                _ => {
                    let count = self
                        .pull_value("count", node, ctx, 0)
                        .and_then(|v| v.as_f64())
                        .or_else(|| node.param_f64("count"))
                        .unwrap_or(1.0);
                    (iterations as f64) < count
                }
            };
            if !proceed {
                break;
            }

            if iterations >= cap {
                aborted = true;
                ctx.warnings.push(Warning::new(
                    ctx.bar().time,
                    format!(
                        "block '{}': loop exceeded {} iterations and was aborted",
                        node.id, cap
                    ),
                ));
                break;
            }

            ctx.write(&node.id, "index", PortValue::Number(iterations as f64));
            match self.run_targets(&node.id, "body", ctx, depth + 1) {
                FlowSignal::Break => break,
                FlowSignal::NextIteration | FlowSignal::Continue => {}
            }
            iterations += 1;
        }

        if aborted {
            FlowSignal::Continue
        } else {
            self.run_targets(&node.id, "done", ctx, depth)
        }
    }

    // ------------------------------------------------------------------
    // Value resolution
    // ------------------------------------------------------------------

    // Pull the current value of one input port: prefer what this dispatch
    // already produced, otherwise evaluate pure producers on demand.
    fn pull_value(
        &self,
        port: &str,
        node: &Node,
        ctx: &mut DispatchContext,
        depth: u32,
    ) -> Option<PortValue> {
        let (source_id, source_port) = self
            .value_sources
            .get(&(node.id.clone(), port.to_string()))?
            .clone();

        if let Some(value) = ctx.read(&source_id, &source_port) {
            return Some(value.clone());
        }

        let source = self.nodes.get(&source_id).copied()?;
        if !source.kind.is_pure_value() || depth >= MAX_PULL_DEPTH {
            return None;
        }
        self.evaluate_pure(source, &source_port, ctx, depth + 1)
    }

    // Value of a pure producer's port at the previous bar, for crossing
    // comparators. Only indicator buffers and constants have history.
    fn pull_previous(&self, node: &Node, port: &str, ctx: &DispatchContext) -> Option<f64> {
        let (source_id, source_port) = self
            .value_sources
            .get(&(node.id.clone(), port.to_string()))?;
        let source = self.nodes.get(source_id).copied()?;
        if ctx.index == 0 {
            return None;
        }
        match source.kind {
            NodeKind::Indicator => {
                let series = self.indicator_series.get(source_id)?;
                let buffer = normal_buffer(source_port);
                Some(series.value_at(buffer, ctx.index - 1))
            }
            NodeKind::Constant => source.param_f64("value"),
            _ => None,
        }
    }

    // Evaluate a pure value node on demand and return the requested port.
    fn evaluate_pure(
        &self,
        node: &Node,
        port: &str,
        ctx: &mut DispatchContext,
        depth: u32,
    ) -> Option<PortValue> {
        match node.kind {
            NodeKind::Indicator => {
                let series = self.indicator_series.get(&node.id)?;
                Some(PortValue::Number(
                    series.value_at(normal_buffer(port), ctx.index),
                ))
            }
            NodeKind::Constant => Some(PortValue::Number(node.param_f64("value")?)),
            NodeKind::Condition => Some(PortValue::Boolean(self.eval_condition(node, ctx, depth))),
            NodeKind::Logic => Some(PortValue::Boolean(self.eval_logic(node, ctx, depth))),
            NodeKind::MoneyManagement => {
                Some(PortValue::Number(self.eval_money_management(node, ctx)))
            }
            NodeKind::TradeState => Some(PortValue::Boolean(self.eval_trade_state(node, ctx))),
            NodeKind::Mtf => self.eval_mtf(node, port, ctx),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Node evaluators
    // ------------------------------------------------------------------

    // Execute a node for its outputs and side effects; flow routing is the
    // walker's job. Exhaustive over the closed kind set.
    fn execute_node(&self, node: &Node, ctx: &mut DispatchContext, depth: u32) {
        match node.kind {
            // Handled by the walker
            NodeKind::Event
            | NodeKind::Branch
            | NodeKind::Loop
            | NodeKind::LoopBreak
            | NodeKind::LoopContinue => {}

            NodeKind::Indicator => {
                if let Some(series) = self.indicator_series.get(&node.id) {
                    for buffer in series.buffers.keys() {
                        let value = series.value_at(buffer, ctx.index);
                        ctx.write(&node.id, buffer, PortValue::Number(value));
                    }
                }
            }

            NodeKind::Condition => {
                let result = self.eval_condition(node, ctx, depth);
                ctx.write(&node.id, "result", PortValue::Boolean(result));
            }

            NodeKind::Logic => {
                let result = self.eval_logic(node, ctx, depth);
                ctx.write(&node.id, "result", PortValue::Boolean(result));
            }

            NodeKind::Constant => {
                let value = node.param_f64("value").unwrap_or(f64::NAN);
                ctx.write(&node.id, "value", PortValue::Number(value));
            }

            NodeKind::MoneyManagement => {
                let lots = self.eval_money_management(node, ctx);
                ctx.write(&node.id, "lots", PortValue::Number(lots));
                ctx.write(&node.id, "value", PortValue::Number(lots));
            }

            NodeKind::TradeState => {
                let result = self.eval_trade_state(node, ctx);
                ctx.write(&node.id, "result", PortValue::Boolean(result));
            }

            NodeKind::Flag => self.exec_flag(node, ctx),
            NodeKind::Counter => self.exec_counter(node, ctx),
            NodeKind::Variable => self.exec_variable(node, ctx),
            NodeKind::Action => self.exec_action(node, ctx),

            NodeKind::Mtf => {
                if let Some(value) = self.eval_mtf(node, "value", ctx) {
                    ctx.write(&node.id, "value", value);
                }
                if let Some(trend) = self.eval_mtf(node, "trend", ctx) {
                    ctx.write(&node.id, "trend", trend);
                }
            }

            NodeKind::Messaging => {
                let text = self
                    .pull_value("message", node, ctx, depth)
                    .and_then(|v| v.as_text().map(str::to_string))
                    .or_else(|| node.param_str("message").map(str::to_string))
                    .unwrap_or_else(|| "Trading signal triggered".to_string());
                let channel = node.param_str("method").unwrap_or("notification").to_string();
                let time = ctx.bar().time;
                ctx.messages.push(MessageEvent {
                    time,
                    channel,
                    text,
                });
            }

            NodeKind::ChartDraw => {
                let price = self
                    .pull_value("price", node, ctx, depth)
                    .and_then(|v| v.as_f64())
                    .or_else(|| node.param_f64("price"))
                    .unwrap_or_else(|| ctx.bar().close);
                let object = node.param_str("objectType").unwrap_or("arrow").to_string();
                let time = ctx.bar().time;
                ctx.chart_commands.push(ChartCommand {
                    time,
                    object,
                    price,
                });
            }
        }
    }

    fn eval_condition(&self, node: &Node, ctx: &mut DispatchContext, depth: u32) -> bool {
        let op = ValueOp::parse(node.param_str("operator").unwrap_or("gt"));

        let a = self
            .pull_value("a", node, ctx, depth)
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::NAN);
        let b = self
            .pull_value("b", node, ctx, depth)
            .and_then(|v| v.as_f64())
            .or_else(|| node.param_f64("threshold"))
            .unwrap_or(f64::NAN);

        if op.needs_previous() {
            let prev_a = self.pull_previous(node, "a", ctx);
            let prev_b = self
                .pull_previous(node, "b", ctx)
                .or_else(|| node.param_f64("threshold"));
            conditions::compare_values(op, a, b, prev_a, prev_b)
        } else {
            conditions::compare_values(op, a, b, None, None)
        }
    }

    fn eval_logic(&self, node: &Node, ctx: &mut DispatchContext, depth: u32) -> bool {
        let inputs: Vec<bool> = self
            .value_inputs
            .get(&node.id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .to_vec()
            .into_iter()
            .filter_map(|(source_id, source_port)| {
                if let Some(value) = ctx.read(&source_id, &source_port) {
                    return value.as_bool();
                }
                let source = self.nodes.get(&source_id).copied()?;
                if source.kind.is_pure_value() && depth < MAX_PULL_DEPTH {
                    self.evaluate_pure(source, &source_port, ctx, depth + 1)?
                        .as_bool()
                } else {
                    None
                }
            })
            .collect();

        if inputs.is_empty() {
            return false;
        }

        match node.param_str("operator").unwrap_or("AND") {
            "OR" => inputs.iter().any(|&v| v),
            "NOT" => !inputs[0],
            "XOR" => inputs.iter().filter(|&&v| v).count() == 1,
            "NAND" => !inputs.iter().all(|&v| v),
            "NOR" => !inputs.iter().any(|&v| v),
            _ => inputs.iter().all(|&v| v),
        }
    }

    fn eval_money_management(&self, node: &Node, ctx: &DispatchContext) -> f64 {
        let min_lot = node.param_f64("minLotSize").unwrap_or(0.01);
        let max_lot = node.param_f64("maxLotSize").unwrap_or(100.0);
        let pip_value = node.param_f64("pipValue").unwrap_or(10.0);

        let lots = match node.param_str("method").unwrap_or("fixed_lot") {
            "risk_percent" => {
                let risk_percent = node.param_f64("riskPercent").unwrap_or(1.0);
                let stop_loss_pips = node.param_f64("stopLossPips").unwrap_or(50.0);
                let risk_amount = ctx.state.balance * risk_percent / 100.0;
                if stop_loss_pips > 0.0 {
                    risk_amount / (stop_loss_pips * pip_value)
                } else {
                    min_lot
                }
            }
            "balance_percent" => {
                let balance_percent = node.param_f64("balancePercent").unwrap_or(10.0);
                // One standard lot margined at 100k units
                ctx.state.balance * balance_percent / 100.0 / 100_000.0
            }
            _ => node.param_f64("fixedLot").unwrap_or(0.01),
        };

        lots.clamp(min_lot, max_lot)
    }

    fn eval_trade_state(&self, node: &Node, ctx: &DispatchContext) -> bool {
        let state = &*ctx.state;
        let price = ctx.bars[ctx.index].close;
        let op = CountOp::parse(node.param_str("operator").unwrap_or("equal"));
        let count = node.param_i64("count").unwrap_or(0);
        let distance = node.param_f64("distancePips").unwrap_or(50.0);

        match node.param_str("check").unwrap_or("has_trade") {
            "trades_count" => conditions::trades_count_matches(state, op, count),
            "pending_count" => conditions::pending_count_matches(state, op, count),
            "has_trade" => conditions::has_trade(
                state,
                TradeFilter::parse(node.param_str("direction").unwrap_or("any")),
            ),
            "has_pending_order" => conditions::has_pending_order(
                state,
                OrderFilter::parse(node.param_str("orderType").unwrap_or("any")),
            ),
            "no_trade" => !conditions::has_trade(state, TradeFilter::Any),
            "no_pending_order" => !conditions::has_pending_order(state, OrderFilter::Any),
            "no_trade_or_order" => {
                !conditions::has_trade(state, TradeFilter::Any)
                    && !conditions::has_pending_order(state, OrderFilter::Any)
            }
            "no_trade_nearby" => conditions::no_trade_nearby(state, price, distance, PIP_SIZE),
            "no_pending_order_nearby" => {
                conditions::no_order_nearby(state, price, distance, PIP_SIZE)
            }
            _ => false,
        }
    }

    fn exec_flag(&self, node: &Node, ctx: &mut DispatchContext) {
        let name = node.param_str("name").unwrap_or("flag").to_string();
        match node.param_str("op").unwrap_or("set") {
            "get" => {
                let value = ctx.state.get_flag(&name);
                let exists = ctx.state.flag_exists(&name);
                ctx.write(&node.id, "value", PortValue::Boolean(value));
                ctx.write(&node.id, "exists", PortValue::Boolean(exists));
            }
            "toggle" => {
                let value = ctx.state.toggle_flag(&name);
                ctx.write(&node.id, "new_value", PortValue::Boolean(value));
            }
            "reset_all" => {
                let count = ctx.state.reset_all_flags();
                ctx.write(&node.id, "count_reset", PortValue::Number(count as f64));
            }
            _ => {
                let value = self
                    .pull_value("value", node, ctx, 0)
                    .and_then(|v| v.as_bool())
                    .or_else(|| node.param_bool("value"))
                    .unwrap_or(true);
                ctx.state.set_flag(&name, value);
                ctx.write(&node.id, "value", PortValue::Boolean(value));
            }
        }
    }

    fn exec_counter(&self, node: &Node, ctx: &mut DispatchContext) {
        let name = node.param_str("name").unwrap_or("counter").to_string();
        let amount = self
            .pull_value("amount", node, ctx, 0)
            .and_then(|v| v.as_f64())
            .or_else(|| node.param_f64("amount"))
            .unwrap_or(1.0) as i64;

        match node.param_str("op").unwrap_or("increment") {
            "decrement" => {
                let value = ctx.state.decrement_counter(&name, amount);
                ctx.write(&node.id, "new_value", PortValue::Number(value as f64));
                ctx.write(&node.id, "value", PortValue::Number(value as f64));
            }
            "set" => {
                ctx.state.set_counter(&name, amount);
                ctx.write(&node.id, "value", PortValue::Number(amount as f64));
            }
            "reset" => {
                ctx.state.reset_counter(&name);
                ctx.write(&node.id, "value", PortValue::Number(0.0));
            }
            "get" => {
                let value = ctx.state.get_counter(&name);
                let exists = ctx.state.counter_exists(&name);
                ctx.write(&node.id, "value", PortValue::Number(value as f64));
                ctx.write(&node.id, "exists", PortValue::Boolean(exists));
            }
            "threshold" => {
                let op = CountOp::parse(node.param_str("operator").unwrap_or("greater_equal"));
                let threshold = node.param_i64("threshold").unwrap_or(0);
                let current = ctx.state.get_counter(&name);
                let reached = op.compare(current, threshold);
                ctx.write(&node.id, "result", PortValue::Boolean(reached));
                ctx.write(&node.id, "value", PortValue::Number(current as f64));
            }
            _ => {
                let value = ctx.state.increment_counter(&name, amount);
                ctx.write(&node.id, "new_value", PortValue::Number(value as f64));
                ctx.write(&node.id, "value", PortValue::Number(value as f64));
            }
        }
    }

    fn exec_variable(&self, node: &Node, ctx: &mut DispatchContext) {
        let name = node.param_str("name").unwrap_or("var").to_string();
        match node.param_str("op").unwrap_or("set") {
            "get" => {
                let value = ctx
                    .state
                    .get_variable(&name)
                    .cloned()
                    .map(PortValue::Json)
                    .unwrap_or(PortValue::Number(f64::NAN));
                ctx.write(&node.id, "value", value);
            }
            "increment" => {
                let step = node.param_f64("step").unwrap_or(1.0);
                let current = ctx
                    .state
                    .get_variable(&name)
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                let value = current + step;
                ctx.state.set_variable(&name, serde_json::json!(value));
                ctx.write(&node.id, "value", PortValue::Number(value));
            }
            "reset" => {
                ctx.state.delete_variable(&name);
                ctx.write(&node.id, "value", PortValue::Number(0.0));
            }
            _ => {
                let value = self
                    .pull_value("value", node, ctx, 0)
                    .unwrap_or(PortValue::Number(f64::NAN));
                let json = match &value {
                    PortValue::Number(v) => serde_json::json!(v),
                    PortValue::Boolean(b) => serde_json::json!(b),
                    PortValue::Text(s) => serde_json::json!(s),
                    PortValue::Json(j) => j.clone(),
                };
                ctx.state.set_variable(&name, json);
                ctx.write(&node.id, "value", value);
            }
        }
    }

    fn exec_action(&self, node: &Node, ctx: &mut DispatchContext) {
        let lots = self
            .pull_value("lots", node, ctx, 0)
            .and_then(|v| v.as_f64())
            .or_else(|| node.param_f64("lots"))
            .unwrap_or(0.1);
        let stop_loss_pips = node.param_f64("stopLossPips");
        let take_profit_pips = node.param_f64("takeProfitPips");
        let reason = if node.label.is_empty() {
            node.id.clone()
        } else {
            node.label.clone()
        };

        match node.action_kind() {
            ActionKind::Buy => ctx.intents.push(TradeIntent::OpenMarket {
                direction: TradeDirection::Buy,
                lots,
                stop_loss_pips,
                take_profit_pips,
                reason,
            }),
            ActionKind::Sell => ctx.intents.push(TradeIntent::OpenMarket {
                direction: TradeDirection::Sell,
                lots,
                stop_loss_pips,
                take_profit_pips,
                reason,
            }),
            ActionKind::Close => ctx.intents.push(TradeIntent::CloseAll {
                filter: TradeFilter::parse(node.param_str("direction").unwrap_or("any")),
                reason,
            }),
            kind @ (ActionKind::BuyLimit
            | ActionKind::SellLimit
            | ActionKind::BuyStop
            | ActionKind::SellStop) => {
                let price = self
                    .pull_value("price", node, ctx, 0)
                    .and_then(|v| v.as_f64())
                    .or_else(|| node.param_f64("price"))
                    .unwrap_or_else(|| ctx.bar().close);
                let order_kind = match kind {
                    ActionKind::BuyLimit => PendingOrderKind::BuyLimit,
                    ActionKind::SellLimit => PendingOrderKind::SellLimit,
                    ActionKind::BuyStop => PendingOrderKind::BuyStop,
                    _ => PendingOrderKind::SellStop,
                };
                ctx.intents.push(TradeIntent::PlacePending {
                    kind: order_kind,
                    price,
                    lots,
                    stop_loss_pips,
                    take_profit_pips,
                });
            }
            ActionKind::Alert => {
                let text = node
                    .param_str("message")
                    .unwrap_or("Alert")
                    .to_string();
                let time = ctx.bar().time;
                ctx.messages.push(MessageEvent {
                    time,
                    channel: "alert".to_string(),
                    text,
                });
            }
        }
    }

    fn eval_mtf(&self, node: &Node, port: &str, ctx: &mut DispatchContext) -> Option<PortValue> {
        let timeframe = node
            .param_str("timeframe")
            .and_then(Timeframe::parse)
            .unwrap_or(self.strategy.settings.timeframe);
        let symbol = node
            .param_str("symbol")
            .unwrap_or(ctx.symbol.as_str())
            .to_string();

        match port {
            "trend" => {
                let method = match node.param_str("trendMethod") {
                    Some("ma") => TrendMethod::Ma,
                    _ => TrendMethod::Price,
                };
                let period = node.param_usize("period").unwrap_or(20);
                let trend = ctx.mtf.detect_trend(&symbol, timeframe, method, period);
                let label = match trend {
                    Trend::Up => "up",
                    Trend::Down => "down",
                    Trend::Sideways => "sideways",
                };
                Some(PortValue::Text(label.to_string()))
            }
            _ => {
                let indicator = node.param_str("indicator").unwrap_or("sma").to_string();
                let buffer = node.param_str("buffer").unwrap_or(VALUE_BUFFER).to_string();
                let value =
                    ctx.mtf
                        .indicator_value(&symbol, timeframe, &indicator, &buffer, &node.parameters);
                Some(PortValue::Number(value))
            }
        }
    }
}

fn normal_buffer(port: &str) -> &str {
    if port.is_empty() {
        VALUE_BUFFER
    } else {
        port
    }
}
