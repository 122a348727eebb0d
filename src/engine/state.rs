// src/engine/state.rs
// Per-run mutable state: the simulated book plus named flags, counters and
// variables. Created at run start, discarded at run end; nothing here
// survives across runs or leaks between optimization candidates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Trades and pending orders
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

/// Costs charged at fill time, recorded per trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeCosts {
    pub spread: f64,
    pub slippage: f64,
    pub commission: f64,
}

/// One simulated trade. Mutated only by the backtest engine; immutable once
/// closed except through the single open -> closed transition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: u64,
    #[serde(rename = "type")]
    pub direction: TradeDirection,
    pub entry_time: i64,
    pub entry_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    pub lots: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pips: Option<f64>,
    pub costs: TradeCosts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingOrderKind {
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl PendingOrderKind {
    pub fn direction(self) -> TradeDirection {
        match self {
            PendingOrderKind::BuyLimit | PendingOrderKind::BuyStop => TradeDirection::Buy,
            PendingOrderKind::SellLimit | PendingOrderKind::SellStop => TradeDirection::Sell,
        }
    }
}

/// A resting order waiting for price to touch its level.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrder {
    pub id: u64,
    pub kind: PendingOrderKind,
    pub price: f64,
    pub lots: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
}

// ============================================================================
// Run state
// ============================================================================

/// State store for one strategy run.
#[derive(Debug, Clone)]
pub struct RunState {
    pub balance: f64,
    /// Balance plus open-position mark-to-market, updated per bar.
    pub equity: f64,
    pub open_trades: Vec<Trade>,
    pub closed_trades: Vec<Trade>,
    pub pending_orders: Vec<PendingOrder>,
    flags: HashMap<String, bool>,
    counters: HashMap<String, i64>,
    variables: HashMap<String, Value>,
    next_id: u64,
}

impl RunState {
    pub fn new(initial_balance: f64) -> Self {
        RunState {
            balance: initial_balance,
            equity: initial_balance,
            open_trades: Vec::new(),
            closed_trades: Vec::new(),
            pending_orders: Vec::new(),
            flags: HashMap::new(),
            counters: HashMap::new(),
            variables: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ------------------------------------------------------------------
    // Flags: boolean, default false, keyed by name
    // ------------------------------------------------------------------

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }

    pub fn get_flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn flag_exists(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    /// Flip a flag and return its new value.
    pub fn toggle_flag(&mut self, name: &str) -> bool {
        let value = !self.get_flag(name);
        self.set_flag(name, value);
        value
    }

    /// Clear every flag to false; returns how many were reset.
    pub fn reset_all_flags(&mut self) -> usize {
        let count = self.flags.len();
        for value in self.flags.values_mut() {
            *value = false;
        }
        count
    }

    // ------------------------------------------------------------------
    // Counters: integer, default zero, keyed by name
    // ------------------------------------------------------------------

    pub fn get_counter(&self, name: &str) -> i64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn counter_exists(&self, name: &str) -> bool {
        self.counters.contains_key(name)
    }

    pub fn increment_counter(&mut self, name: &str, amount: i64) -> i64 {
        let value = self.get_counter(name) + amount;
        self.counters.insert(name.to_string(), value);
        value
    }

    pub fn decrement_counter(&mut self, name: &str, amount: i64) -> i64 {
        self.increment_counter(name, -amount)
    }

    pub fn set_counter(&mut self, name: &str, value: i64) {
        self.counters.insert(name.to_string(), value);
    }

    pub fn reset_counter(&mut self, name: &str) {
        self.counters.insert(name.to_string(), 0);
    }

    // ------------------------------------------------------------------
    // Variables: generic values for variable nodes
    // ------------------------------------------------------------------

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn delete_variable(&mut self, name: &str) {
        self.variables.remove(name);
    }

    // ------------------------------------------------------------------
    // Book queries
    // ------------------------------------------------------------------

    pub fn open_trades_in(&self, direction: TradeDirection) -> usize {
        self.open_trades
            .iter()
            .filter(|t| t.direction == direction)
            .count()
    }

    pub fn all_trades(&self) -> impl Iterator<Item = &Trade> {
        self.closed_trades.iter().chain(self.open_trades.iter())
    }
}
