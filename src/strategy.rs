// src/strategy.rs
// The serialized strategy document: nodes, edges, settings, metadata.
// This is the boundary format shared with the node-editor frontend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::market::Timeframe;

// ============================================================================
// Node kinds
// ============================================================================

/// Closed set of node kinds. The interpreter matches on this exhaustively,
/// so adding a kind is a compile-time exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Event,
    Indicator,
    Condition,
    Logic,
    Branch,
    Loop,
    LoopBreak,
    LoopContinue,
    Action,
    MoneyManagement,
    TradeState,
    Flag,
    Counter,
    Variable,
    Constant,
    Mtf,
    Messaging,
    ChartDraw,
}

/// Lifecycle events a strategy can hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Init,
    Tick,
    Timer,
    Trade,
    Chart,
    Deinit,
}

impl EventKind {
    pub fn label(self) -> &'static str {
        match self {
            EventKind::Init => "init",
            EventKind::Tick => "tick",
            EventKind::Timer => "timer",
            EventKind::Trade => "trade",
            EventKind::Chart => "chart",
            EventKind::Deinit => "deinit",
        }
    }
}

/// What an action node does when its flow input fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Buy,
    Sell,
    Close,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
    Alert,
}

impl ActionKind {
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            ActionKind::BuyLimit | ActionKind::SellLimit | ActionKind::BuyStop | ActionKind::SellStop
        )
    }
}

// ============================================================================
// Ports
// ============================================================================

/// Value kind carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Flow,
    Number,
    Boolean,
    String,
    Object,
}

impl PortKind {
    /// Whether an edge may connect these two port kinds.
    /// `Object` is the generic carrier and accepts any non-flow kind.
    pub fn compatible(source: PortKind, target: PortKind) -> bool {
        if source == target {
            return true;
        }
        match (source, target) {
            (PortKind::Flow, _) | (_, PortKind::Flow) => false,
            (PortKind::Object, _) | (_, PortKind::Object) => true,
            _ => false,
        }
    }
}

fn flow_port(port: &str) -> bool {
    matches!(
        port,
        "flow" | "flow_in" | "flow_out" | "trigger" | "next" | "then" | "else" | "true" | "false"
            | "body" | "done" | "success"
    )
}

impl NodeKind {
    /// Declared kind of an input port, None if the kind has no such input.
    pub fn input_port_kind(self, port: &str) -> Option<PortKind> {
        match self {
            NodeKind::Event | NodeKind::Indicator | NodeKind::Constant | NodeKind::MoneyManagement
            | NodeKind::TradeState | NodeKind::Mtf => None,
            NodeKind::Condition => match port {
                "a" | "b" => Some(PortKind::Number),
                _ => None,
            },
            NodeKind::Logic => Some(PortKind::Boolean),
            NodeKind::Branch => match port {
                "condition" => Some(PortKind::Boolean),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::Loop => match port {
                "count" => Some(PortKind::Number),
                "condition" => Some(PortKind::Boolean),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::LoopBreak | NodeKind::LoopContinue => {
                flow_port(port).then_some(PortKind::Flow)
            }
            NodeKind::Action => match port {
                "lots" | "price" | "stop_loss" | "take_profit" => Some(PortKind::Number),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::Flag => match port {
                "value" => Some(PortKind::Boolean),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::Counter => match port {
                "amount" => Some(PortKind::Number),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::Variable => match port {
                "value" => Some(PortKind::Object),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::Messaging => match port {
                "message" => Some(PortKind::String),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::ChartDraw => match port {
                "price" => Some(PortKind::Number),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
        }
    }

    /// Declared kind of an output port, None if the kind has no such output.
    pub fn output_port_kind(self, port: &str) -> Option<PortKind> {
        match self {
            NodeKind::Event => flow_port(port).then_some(PortKind::Flow),
            // Any named buffer of an indicator is a numeric series tap
            NodeKind::Indicator => Some(PortKind::Number),
            NodeKind::Condition | NodeKind::Logic | NodeKind::TradeState => match port {
                "result" | "value" => Some(PortKind::Boolean),
                _ => None,
            },
            NodeKind::Branch => match port {
                "true" | "false" => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::Loop => match port {
                "body" | "done" => Some(PortKind::Flow),
                "index" => Some(PortKind::Number),
                _ => None,
            },
            NodeKind::LoopBreak | NodeKind::LoopContinue => None,
            NodeKind::Action | NodeKind::Messaging | NodeKind::ChartDraw => {
                flow_port(port).then_some(PortKind::Flow)
            }
            NodeKind::MoneyManagement => match port {
                "lots" | "value" => Some(PortKind::Number),
                _ => None,
            },
            NodeKind::Flag => match port {
                "value" | "new_value" | "exists" => Some(PortKind::Boolean),
                "count_reset" => Some(PortKind::Number),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::Counter => match port {
                "value" | "new_value" => Some(PortKind::Number),
                "result" | "exists" => Some(PortKind::Boolean),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::Variable => match port {
                "value" => Some(PortKind::Object),
                p if flow_port(p) => Some(PortKind::Flow),
                _ => None,
            },
            NodeKind::Constant => match port {
                "value" => Some(PortKind::Number),
                _ => None,
            },
            NodeKind::Mtf => match port {
                "value" => Some(PortKind::Number),
                "trend" => Some(PortKind::String),
                _ => None,
            },
        }
    }

    /// Pure value producers are evaluated lazily when an input port pulls
    /// them, so they do not need to sit on a flow path.
    pub fn is_pure_value(self) -> bool {
        matches!(
            self,
            NodeKind::Indicator
                | NodeKind::Condition
                | NodeKind::Logic
                | NodeKind::Constant
                | NodeKind::MoneyManagement
                | NodeKind::TradeState
                | NodeKind::Mtf
        )
    }
}

// ============================================================================
// Nodes and edges
// ============================================================================

/// One block of strategy logic in the graph.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    /// Which lifecycle event this node roots; only meaningful for Event nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventKind>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Node {
            id: id.into(),
            kind,
            category: String::new(),
            label: String::new(),
            parameters: HashMap::new(),
            event: None,
        }
    }

    pub fn event(id: impl Into<String>, event: EventKind) -> Self {
        let mut node = Node::new(id, NodeKind::Event);
        node.event = Some(event);
        node
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn is_event(&self) -> bool {
        self.kind == NodeKind::Event
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(Value::as_f64)
    }

    // Integer parameters tolerate float JSON values so optimization sweeps
    // can overwrite them with grid points.
    pub fn param_usize(&self, key: &str) -> Option<usize> {
        self.param_f64(key).filter(|v| *v >= 0.0).map(|v| v as usize)
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.param_f64(key).map(|v| v as i64)
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.parameters.get(key).and_then(Value::as_bool)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// Action kind for Action nodes; defaults to Buy when unset so a bare
    /// action block still does something visible.
    pub fn action_kind(&self) -> ActionKind {
        match self.param_str("action") {
            Some("buy") => ActionKind::Buy,
            Some("sell") => ActionKind::Sell,
            Some("close") => ActionKind::Close,
            Some("buy_limit") => ActionKind::BuyLimit,
            Some("sell_limit") => ActionKind::SellLimit,
            Some("buy_stop") => ActionKind::BuyStop,
            Some("sell_stop") => ActionKind::SellStop,
            Some("alert") => ActionKind::Alert,
            _ => ActionKind::Buy,
        }
    }
}

/// A directed connection from one node's output port to another's input port.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_node_id: String,
    pub source_port_id: String,
    pub target_node_id: String,
    pub target_port_id: String,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        Edge {
            id: id.into(),
            source_node_id: source.into(),
            source_port_id: source_port.into(),
            target_node_id: target.into(),
            target_port_id: target_port.into(),
        }
    }
}

// ============================================================================
// Strategy document
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySettings {
    pub timeframe: Timeframe,
    #[serde(default)]
    pub pairs: Vec<String>,
    pub initial_balance: f64,
    pub leverage: f64,
    /// Spread in pips, applied at fill time.
    pub spread: f64,
    /// Commission per lot per round turn, in account currency.
    pub commission: f64,
    /// Slippage in pips, applied at fill time.
    pub slippage: f64,
    /// Risk per trade in percent, used by money-management nodes.
    pub risk_per_trade: f64,
    /// Maximum simultaneously open positions; entry intents over the cap
    /// are dropped with a warning.
    pub max_positions: usize,
    pub use_stop_loss: bool,
    pub use_take_profit: bool,
    /// Interval for the timer event; the timer never fires when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_interval_secs: Option<u64>,
}

impl Default for StrategySettings {
    fn default() -> Self {
        StrategySettings {
            timeframe: Timeframe::H1,
            pairs: vec!["EURUSD".to_string()],
            initial_balance: 10_000.0,
            leverage: 100.0,
            spread: 2.0,
            commission: 7.0,
            slippage: 1.0,
            risk_per_trade: 1.0,
            max_positions: 1,
            use_stop_loss: true,
            use_take_profit: true,
            timer_interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyMetadata {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub is_template: bool,
}

/// The full strategy document produced by the node editor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub settings: StrategySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StrategyMetadata>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Strategy {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Strategy {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: default_version(),
            nodes: Vec::new(),
            edges: Vec::new(),
            settings: StrategySettings::default(),
            metadata: None,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn event_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_event())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_kind_round_trip() {
        let json = serde_json::to_string(&NodeKind::MoneyManagement).unwrap();
        assert_eq!(json, "\"money_management\"");
        let kind: NodeKind = serde_json::from_str("\"chart_draw\"").unwrap();
        assert_eq!(kind, NodeKind::ChartDraw);
    }

    #[test]
    fn test_strategy_document_round_trip() {
        let mut strategy = Strategy::new("s1", "MA Cross");
        strategy.nodes.push(Node::event("ev_tick", EventKind::Tick));
        strategy.nodes.push(
            Node::new("rsi_1", NodeKind::Indicator)
                .with_param("indicator", json!("rsi"))
                .with_param("period", json!(14)),
        );
        strategy
            .edges
            .push(Edge::new("e1", "ev_tick", "flow", "rsi_1", "flow"));

        let text = serde_json::to_string(&strategy).unwrap();
        assert!(text.contains("\"sourceNodeId\""));
        let back: Strategy = serde_json::from_str(&text).unwrap();
        assert_eq!(back.nodes.len(), 2);
        assert_eq!(back.node("rsi_1").unwrap().param_usize("period"), Some(14));
        assert_eq!(back.settings.initial_balance, 10_000.0);
    }

    #[test]
    fn test_port_compatibility() {
        assert!(PortKind::compatible(PortKind::Number, PortKind::Number));
        assert!(PortKind::compatible(PortKind::Number, PortKind::Object));
        assert!(!PortKind::compatible(PortKind::Flow, PortKind::Number));
        assert!(!PortKind::compatible(PortKind::Number, PortKind::Boolean));
    }

    #[test]
    fn test_port_signatures() {
        assert_eq!(
            NodeKind::Event.output_port_kind("flow"),
            Some(PortKind::Flow)
        );
        assert_eq!(
            NodeKind::Branch.output_port_kind("true"),
            Some(PortKind::Flow)
        );
        assert_eq!(
            NodeKind::Condition.input_port_kind("a"),
            Some(PortKind::Number)
        );
        assert_eq!(
            NodeKind::Counter.output_port_kind("value"),
            Some(PortKind::Number)
        );
        assert_eq!(NodeKind::Constant.input_port_kind("value"), None);
    }

    #[test]
    fn test_action_kind_default() {
        let node = Node::new("a1", NodeKind::Action);
        assert_eq!(node.action_kind(), ActionKind::Buy);
        let node = node.with_param("action", json!("sell_stop"));
        assert_eq!(node.action_kind(), ActionKind::SellStop);
        assert!(node.action_kind().is_pending());
    }
}
