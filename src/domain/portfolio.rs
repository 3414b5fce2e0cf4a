//! Portfolio state and equity tracking.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use super::execution::TradeExecution;
use super::position::{ClosedTrade, Position};

/// Cash, holdings and the run's history. One instance per backtest, owned by
/// the execution engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<String, Position>,
    pub equity_curve: BTreeMap<NaiveDateTime, f64>,
    pub trade_log: Vec<TradeExecution>,
    pub closed_trades: Vec<ClosedTrade>,
}

impl PortfolioState {
    pub fn new(initial_capital: f64) -> Self {
        PortfolioState {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            equity_curve: BTreeMap::new(),
            trade_log: Vec::new(),
            closed_trades: Vec::new(),
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Units held of `symbol`, 0 when flat.
    pub fn quantity(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).map_or(0.0, |p| p.quantity)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Update each held position's mark from `prices`.
    pub fn mark(&mut self, prices: &BTreeMap<String, f64>) {
        for (symbol, position) in self.positions.iter_mut() {
            if let Some(&price) = prices.get(symbol) {
                position.last_price = price;
            }
        }
    }

    /// Cash plus every position marked at `prices`, falling back to the
    /// position's last mark when a symbol has no price.
    pub fn total_equity(&self, prices: &BTreeMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = prices.get(&pos.symbol).copied().unwrap_or(pos.last_price);
                pos.market_value(price)
            })
            .sum();
        self.cash + position_value
    }

    /// Current weight of each held symbol at `prices`.
    pub fn weights(&self, prices: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let equity = self.total_equity(prices);
        if equity <= 0.0 {
            return BTreeMap::new();
        }
        self.positions
            .values()
            .map(|pos| {
                let price = prices.get(&pos.symbol).copied().unwrap_or(pos.last_price);
                (pos.symbol.clone(), pos.market_value(price) / equity)
            })
            .collect()
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, equity: f64) {
        self.equity_curve.insert(timestamp, equity);
    }

    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .values()
            .next_back()
            .copied()
            .unwrap_or(self.initial_capital)
    }
}
