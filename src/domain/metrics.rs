//! Portfolio performance metrics from the equity curve and closed trades.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use super::config::PredictionFrequency;
use super::portfolio::PortfolioState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annual_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of equity points spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub win_rate: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_days: f64,
    pub final_equity: f64,
}

/// Walk the equity curve once, left to right, and the closed-trade list.
pub fn calculate_portfolio_metrics(
    portfolio: &PortfolioState,
    frequency: PredictionFrequency,
    risk_free_rate: f64,
) -> PerformanceMetrics {
    let periods_per_year = frequency.periods_per_year();
    let curve = &portfolio.equity_curve;
    let initial_capital = portfolio.initial_capital;
    let final_equity = portfolio.final_equity();

    let total_return = if initial_capital > 0.0 {
        final_equity / initial_capital - 1.0
    } else {
        0.0
    };

    let n = curve.len() as f64;
    let annual_return = if n > 0.0 && total_return > -1.0 {
        (1.0 + total_return).powf(periods_per_year / n) - 1.0
    } else if total_return <= -1.0 {
        -1.0
    } else {
        0.0
    };

    let (max_drawdown, max_drawdown_duration) = drawdown(curve);

    let returns = periodic_returns(curve);
    let period_rf = risk_free_rate / periods_per_year;
    let risk = risk_adjusted(&returns, period_rf, periods_per_year);

    let mut winning_trades = 0usize;
    let mut losing_trades = 0usize;
    let mut gross_wins = 0.0_f64;
    let mut gross_losses = 0.0_f64;
    let mut largest_win = 0.0_f64;
    let mut largest_loss = 0.0_f64;
    let mut holding_days = 0.0_f64;

    for trade in &portfolio.closed_trades {
        if trade.pnl > 0.0 {
            winning_trades += 1;
            gross_wins += trade.pnl;
            largest_win = largest_win.max(trade.pnl);
        } else if trade.pnl < 0.0 {
            losing_trades += 1;
            gross_losses += trade.pnl.abs();
            largest_loss = largest_loss.max(trade.pnl.abs());
        }
        let held = trade.exit_timestamp - trade.entry_timestamp;
        holding_days += held.num_seconds() as f64 / 86_400.0;
    }

    let total_trades = portfolio.closed_trades.len();
    let win_rate = if total_trades > 0 {
        winning_trades as f64 / total_trades as f64
    } else {
        0.0
    };

    let profit_factor = if gross_losses > 0.0 {
        gross_wins / gross_losses
    } else if gross_wins > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    PerformanceMetrics {
        total_return,
        annual_return,
        volatility: risk.volatility,
        sharpe_ratio: risk.sharpe,
        sortino_ratio: risk.sortino,
        max_drawdown,
        max_drawdown_duration,
        win_rate,
        total_trades,
        winning_trades,
        losing_trades,
        profit_factor,
        avg_win: mean_or_zero(gross_wins, winning_trades),
        avg_loss: mean_or_zero(gross_losses, losing_trades),
        largest_win,
        largest_loss,
        avg_holding_days: mean_or_zero(holding_days, total_trades),
        final_equity,
    }
}

fn mean_or_zero(total: f64, count: usize) -> f64 {
    if count > 0 { total / count as f64 } else { 0.0 }
}

/// Simple returns between consecutive equity points.
pub fn periodic_returns(curve: &BTreeMap<NaiveDateTime, f64>) -> Vec<f64> {
    curve
        .values()
        .zip(curve.values().skip(1))
        .map(|(&prev, &curr)| if prev > 0.0 { (curr - prev) / prev } else { 0.0 })
        .collect()
}

/// Largest peak-to-trough decline as a fraction of the peak, and the longest
/// stretch of points spent under water.
fn drawdown(curve: &BTreeMap<NaiveDateTime, f64>) -> (f64, usize) {
    let mut values = curve.values();
    let Some(&first) = values.next() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut run = 0usize;
    let mut longest = 0usize;

    for &equity in values {
        if equity >= peak {
            peak = equity;
            run = 0;
            continue;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
        run += 1;
        longest = longest.max(run);
    }

    (max_dd, longest)
}

struct RiskAdjusted {
    volatility: f64,
    sharpe: f64,
    sortino: f64,
}

fn risk_adjusted(returns: &[f64], period_rf: f64, periods_per_year: f64) -> RiskAdjusted {
    if returns.is_empty() {
        return RiskAdjusted {
            volatility: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
        };
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let stddev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    let excess = mean - period_rf;
    let annualizer = periods_per_year.sqrt();

    let sharpe = if stddev > 0.0 {
        excess / stddev * annualizer
    } else {
        0.0
    };

    let downside = (returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    let sortino = if downside > 0.0 {
        excess / downside * annualizer
    } else {
        0.0
    };

    RiskAdjusted {
        volatility: stddev * annualizer,
        sharpe,
        sortino,
    }
}
