// src/engine/conditions.rs
// Stateless predicates over values and the simulated book.
// NaN never satisfies a comparison: insufficient data reads as false.

use serde::{Deserialize, Serialize};

use crate::engine::state::{PendingOrderKind, RunState, TradeDirection};

/// Tolerance for equality between floating-point port values.
pub const VALUE_EPSILON: f64 = 1e-4;

// ============================================================================
// Comparators
// ============================================================================

/// Comparator for count and threshold checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountOp {
    Equal,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

impl CountOp {
    pub fn parse(s: &str) -> CountOp {
        match s {
            "greater" => CountOp::Greater,
            "less" => CountOp::Less,
            "greater_equal" => CountOp::GreaterEqual,
            "less_equal" => CountOp::LessEqual,
            _ => CountOp::Equal,
        }
    }

    pub fn compare(self, actual: i64, target: i64) -> bool {
        match self {
            CountOp::Equal => actual == target,
            CountOp::Greater => actual > target,
            CountOp::Less => actual < target,
            CountOp::GreaterEqual => actual >= target,
            CountOp::LessEqual => actual <= target,
        }
    }
}

/// Comparator for condition nodes over numeric port values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueOp {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    CrossAbove,
    CrossBelow,
}

impl ValueOp {
    pub fn parse(s: &str) -> ValueOp {
        match s {
            "lt" => ValueOp::Lt,
            "gte" => ValueOp::Gte,
            "lte" => ValueOp::Lte,
            "eq" => ValueOp::Eq,
            "neq" => ValueOp::Neq,
            "cross_above" => ValueOp::CrossAbove,
            "cross_below" => ValueOp::CrossBelow,
            _ => ValueOp::Gt,
        }
    }

    pub fn needs_previous(self) -> bool {
        matches!(self, ValueOp::CrossAbove | ValueOp::CrossBelow)
    }
}

/// Evaluate a comparison. Crossing operators additionally need both sides'
/// previous values; any NaN input makes the result false.
pub fn compare_values(
    op: ValueOp,
    a: f64,
    b: f64,
    previous_a: Option<f64>,
    previous_b: Option<f64>,
) -> bool {
    if a.is_nan() || b.is_nan() {
        return false;
    }

    match op {
        ValueOp::Gt => a > b,
        ValueOp::Lt => a < b,
        ValueOp::Gte => a >= b,
        ValueOp::Lte => a <= b,
        ValueOp::Eq => (a - b).abs() < VALUE_EPSILON,
        ValueOp::Neq => (a - b).abs() >= VALUE_EPSILON,
        ValueOp::CrossAbove | ValueOp::CrossBelow => {
            let (prev_a, prev_b) = match (previous_a, previous_b) {
                (Some(pa), Some(pb)) if !pa.is_nan() && !pb.is_nan() => (pa, pb),
                _ => return false,
            };
            match op {
                ValueOp::CrossAbove => prev_a <= prev_b && a > b,
                _ => prev_a >= prev_b && a < b,
            }
        }
    }
}

// ============================================================================
// Book predicates
// ============================================================================

/// Direction filter for trade existence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeFilter {
    Any,
    Buy,
    Sell,
}

impl TradeFilter {
    pub fn parse(s: &str) -> TradeFilter {
        match s {
            "buy" => TradeFilter::Buy,
            "sell" => TradeFilter::Sell,
            _ => TradeFilter::Any,
        }
    }
}

/// Order-kind filter for pending order checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
    Any,
    Kind(PendingOrderKind),
}

impl OrderFilter {
    pub fn parse(s: &str) -> OrderFilter {
        match s {
            "buy_limit" => OrderFilter::Kind(PendingOrderKind::BuyLimit),
            "sell_limit" => OrderFilter::Kind(PendingOrderKind::SellLimit),
            "buy_stop" => OrderFilter::Kind(PendingOrderKind::BuyStop),
            "sell_stop" => OrderFilter::Kind(PendingOrderKind::SellStop),
            _ => OrderFilter::Any,
        }
    }
}

pub fn trades_count_matches(state: &RunState, op: CountOp, target: i64) -> bool {
    op.compare(state.open_trades.len() as i64, target)
}

pub fn pending_count_matches(state: &RunState, op: CountOp, target: i64) -> bool {
    op.compare(state.pending_orders.len() as i64, target)
}

pub fn has_trade(state: &RunState, filter: TradeFilter) -> bool {
    match filter {
        TradeFilter::Any => !state.open_trades.is_empty(),
        TradeFilter::Buy => state.open_trades_in(TradeDirection::Buy) > 0,
        TradeFilter::Sell => state.open_trades_in(TradeDirection::Sell) > 0,
    }
}

pub fn has_pending_order(state: &RunState, filter: OrderFilter) -> bool {
    match filter {
        OrderFilter::Any => !state.pending_orders.is_empty(),
        OrderFilter::Kind(kind) => state.pending_orders.iter().any(|o| o.kind == kind),
    }
}

/// True when no open trade was entered within `distance_pips` of `price`.
pub fn no_trade_nearby(state: &RunState, price: f64, distance_pips: f64, pip_size: f64) -> bool {
    let distance = distance_pips * pip_size;
    !state
        .open_trades
        .iter()
        .any(|t| (t.entry_price - price).abs() <= distance)
}

/// True when no pending order rests within `distance_pips` of `price`.
pub fn no_order_nearby(state: &RunState, price: f64, distance_pips: f64, pip_size: f64) -> bool {
    let distance = distance_pips * pip_size;
    !state
        .pending_orders
        .iter()
        .any(|o| (o.price - price).abs() <= distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::{PendingOrder, Trade, TradeCosts};

    fn open_trade(state: &mut RunState, direction: TradeDirection, entry_price: f64) {
        let id = state.next_id();
        state.open_trades.push(Trade {
            id,
            direction,
            entry_time: 0,
            entry_price,
            exit_time: None,
            exit_price: None,
            lots: 0.1,
            stop_loss: None,
            take_profit: None,
            profit: None,
            pips: None,
            costs: TradeCosts::default(),
            reason: None,
        });
    }

    #[test]
    fn test_count_op_comparators() {
        assert!(CountOp::Equal.compare(2, 2));
        assert!(CountOp::Greater.compare(3, 2));
        assert!(CountOp::Less.compare(1, 2));
        assert!(CountOp::GreaterEqual.compare(2, 2));
        assert!(CountOp::LessEqual.compare(2, 2));
        assert!(!CountOp::Greater.compare(2, 2));
        assert_eq!(CountOp::parse("greater_equal"), CountOp::GreaterEqual);
        assert_eq!(CountOp::parse("bogus"), CountOp::Equal);
    }

    #[test]
    fn test_nan_comparisons_are_false() {
        assert!(!compare_values(ValueOp::Gt, f64::NAN, 1.0, None, None));
        assert!(!compare_values(ValueOp::Lt, 1.0, f64::NAN, None, None));
        assert!(!compare_values(
            ValueOp::CrossAbove,
            2.0,
            1.0,
            Some(f64::NAN),
            Some(1.0)
        ));
        assert!(!compare_values(ValueOp::Eq, f64::NAN, f64::NAN, None, None));
    }

    #[test]
    fn test_crossings() {
        // Was below, now above
        assert!(compare_values(
            ValueOp::CrossAbove,
            2.0,
            1.5,
            Some(1.0),
            Some(1.5)
        ));
        // Already above: no cross
        assert!(!compare_values(
            ValueOp::CrossAbove,
            2.0,
            1.5,
            Some(1.8),
            Some(1.5)
        ));
        assert!(compare_values(
            ValueOp::CrossBelow,
            1.0,
            1.5,
            Some(2.0),
            Some(1.5)
        ));
        // Missing history: no cross
        assert!(!compare_values(ValueOp::CrossAbove, 2.0, 1.5, None, None));
    }

    #[test]
    fn test_equality_uses_epsilon() {
        assert!(compare_values(ValueOp::Eq, 1.00001, 1.0, None, None));
        assert!(compare_values(ValueOp::Neq, 1.1, 1.0, None, None));
    }

    #[test]
    fn test_trade_predicates() {
        let mut state = RunState::new(1000.0);
        assert!(!has_trade(&state, TradeFilter::Any));
        assert!(trades_count_matches(&state, CountOp::Equal, 0));

        open_trade(&mut state, TradeDirection::Buy, 1.1000);
        assert!(has_trade(&state, TradeFilter::Any));
        assert!(has_trade(&state, TradeFilter::Buy));
        assert!(!has_trade(&state, TradeFilter::Sell));
        assert!(trades_count_matches(&state, CountOp::GreaterEqual, 1));
    }

    #[test]
    fn test_pending_predicates() {
        let mut state = RunState::new(1000.0);
        let id = state.next_id();
        state.pending_orders.push(PendingOrder {
            id,
            kind: PendingOrderKind::BuyLimit,
            price: 1.0950,
            lots: 0.1,
            stop_loss: None,
            take_profit: None,
        });
        assert!(has_pending_order(&state, OrderFilter::Any));
        assert!(has_pending_order(
            &state,
            OrderFilter::Kind(PendingOrderKind::BuyLimit)
        ));
        assert!(!has_pending_order(
            &state,
            OrderFilter::Kind(PendingOrderKind::SellStop)
        ));
        assert!(pending_count_matches(&state, CountOp::Equal, 1));
    }

    #[test]
    fn test_proximity_checks() {
        let mut state = RunState::new(1000.0);
        open_trade(&mut state, TradeDirection::Buy, 1.1000);

        // 30 pips away with a 50-pip exclusion zone: too close
        assert!(!no_trade_nearby(&state, 1.1030, 50.0, 0.0001));
        // 60 pips away: clear
        assert!(no_trade_nearby(&state, 1.1060, 50.0, 0.0001));
        // No orders at all: always clear
        assert!(no_order_nearby(&state, 1.1000, 50.0, 0.0001));
    }
}
