// src/engine/metrics.rs
// Performance metrics and trade statistics, computed once a run completes

use serde::Serialize;

use crate::common::{mean, population_std_dev};
use crate::engine::state::Trade;

/// Sentinel reported as the profit factor when gross loss is zero but gross
/// profit is not; division by zero never propagates.
pub const PROFIT_FACTOR_CAP: f64 = 1000.0;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// One equity-curve sample, appended once per processed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityPoint {
    pub time: i64,
    pub balance: f64,
    pub equity: f64,
    pub drawdown: f64,
    pub drawdown_percent: f64,
}

/// Read-only aggregate over the finished trade list and equity curve.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of trades with positive profit.
    pub win_rate: f64,
    pub total_profit: f64,
    /// Percent return on the initial balance.
    pub total_return: f64,
    pub gross_profit: f64,
    /// Absolute value of summed losses.
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub expectancy: f64,
    pub recovery_factor: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

/// Duration and extreme statistics over the trade list.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStatistics {
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,
    /// Mean time from entry to exit, in minutes.
    pub avg_trade_duration: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
}

/// Compute all metrics from the chronological trade list and equity curve.
pub fn calculate_metrics(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    initial_balance: f64,
) -> PerformanceMetrics {
    let total_trades = trades.len();
    let profits: Vec<f64> = trades.iter().map(|t| t.profit.unwrap_or(0.0)).collect();

    let winning: Vec<f64> = profits.iter().copied().filter(|p| *p > 0.0).collect();
    let losing: Vec<f64> = profits.iter().copied().filter(|p| *p < 0.0).collect();

    let total_profit: f64 = profits.iter().sum();
    let total_return = if initial_balance > 0.0 {
        total_profit / initial_balance * 100.0
    } else {
        0.0
    };

    let gross_profit: f64 = winning.iter().sum();
    let gross_loss: f64 = losing.iter().sum::<f64>().abs();

    let win_rate = if total_trades > 0 {
        winning.len() as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    let profit_factor = if gross_loss > 0.0 {
        (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
    } else if gross_profit > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        0.0
    };

    let avg_win = if winning.is_empty() {
        0.0
    } else {
        gross_profit / winning.len() as f64
    };
    let avg_loss = if losing.is_empty() {
        0.0
    } else {
        gross_loss / losing.len() as f64
    };

    let max_drawdown = equity_curve
        .iter()
        .map(|p| p.drawdown)
        .fold(0.0, f64::max);
    let max_drawdown_percent = equity_curve
        .iter()
        .map(|p| p.drawdown_percent)
        .fold(0.0, f64::max);

    let returns = balance_returns(equity_curve);
    let sharpe_ratio = sharpe(&returns);
    let sortino_ratio = sortino(&returns);

    let expectancy = avg_win * (win_rate / 100.0) - avg_loss * (1.0 - win_rate / 100.0);
    let recovery_factor = if max_drawdown > 0.0 {
        total_profit / max_drawdown
    } else {
        0.0
    };

    let (max_consecutive_wins, max_consecutive_losses) = streaks(&profits);

    PerformanceMetrics {
        total_trades,
        winning_trades: winning.len(),
        losing_trades: losing.len(),
        win_rate,
        total_profit,
        total_return,
        gross_profit,
        gross_loss,
        profit_factor,
        avg_win,
        avg_loss,
        max_drawdown,
        max_drawdown_percent,
        sharpe_ratio,
        sortino_ratio,
        expectancy,
        recovery_factor,
        max_consecutive_wins,
        max_consecutive_losses,
    }
}

/// Compute streak/duration/extreme statistics.
pub fn calculate_statistics(trades: &[Trade]) -> TradeStatistics {
    let profits: Vec<f64> = trades.iter().map(|t| t.profit.unwrap_or(0.0)).collect();
    let (longest_win_streak, longest_loss_streak) = streaks(&profits);

    let durations: Vec<f64> = trades
        .iter()
        .filter_map(|t| t.exit_time.map(|exit| (exit - t.entry_time) as f64 / 60_000.0))
        .collect();
    let avg_trade_duration = if durations.is_empty() {
        0.0
    } else {
        mean(&durations)
    };

    TradeStatistics {
        longest_win_streak,
        longest_loss_streak,
        avg_trade_duration,
        best_trade: profits.iter().copied().fold(0.0, f64::max),
        worst_trade: profits.iter().copied().fold(0.0, f64::min),
    }
}

// Per-bar returns on the balance series.
fn balance_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|w| w[0].balance != 0.0)
        .map(|w| (w[1].balance - w[0].balance) / w[0].balance)
        .collect()
}

// Annualized Sharpe with zero risk-free rate, population standard deviation.
fn sharpe(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let avg = mean(returns);
    let sd = population_std_dev(returns);
    if sd > 0.0 {
        avg / sd * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

// Annualized Sortino over downside deviation.
fn sortino(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let negative: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negative.is_empty() {
        return 0.0;
    }
    let downside_var = negative.iter().map(|r| r * r).sum::<f64>() / negative.len() as f64;
    let downside_dev = downside_var.sqrt();
    if downside_dev > 0.0 {
        mean(returns) / downside_dev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

// Longest win and loss streaks, scanning outcomes in chronological order.
// A zero-profit trade breaks a win streak.
fn streaks(profits: &[f64]) -> (usize, usize) {
    let mut max_wins = 0;
    let mut max_losses = 0;
    let mut wins = 0;
    let mut losses = 0;

    for &profit in profits {
        if profit > 0.0 {
            wins += 1;
            losses = 0;
            max_wins = max_wins.max(wins);
        } else {
            losses += 1;
            wins = 0;
            max_losses = max_losses.max(losses);
        }
    }

    (max_wins, max_losses)
}
