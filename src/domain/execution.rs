//! Trade execution, cost model and rebalance policy.
//!
//! The engine owns the run's [`PortfolioState`] and advances it one event-loop
//! tick at a time. Every fill pays slippage and commission as a fraction of its
//! gross value:
//!
//! - BUY debits `gross + slippage + commission`
//! - SELL credits `gross - slippage - commission`
//!
//! so, marked at the fill price, equity drops by exactly the costs.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::allocation::AllocationWeights;
use super::config::{BacktestConfig, RebalanceFrequency};
use super::error::{Diagnostic, Stage};
use super::portfolio::PortfolioState;
use super::position::Position;
use super::signal::{Prediction, Signal};

/// Fills smaller than this many units are not executed.
pub const MIN_TRADE_QUANTITY: f64 = 1e-6;

/// Rebalance drifts below this fraction of equity are left alone.
pub const REBALANCE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub confidence_threshold: f64,
    pub rebalance_frequency: RebalanceFrequency,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_rate: 0.001,
            slippage_rate: 0.0005,
            confidence_threshold: 0.6,
            rebalance_frequency: RebalanceFrequency::Monthly,
        }
    }
}

impl From<&BacktestConfig> for ExecutionConfig {
    fn from(config: &BacktestConfig) -> Self {
        ExecutionConfig {
            commission_rate: config.commission_rate,
            slippage_rate: config.slippage_rate,
            confidence_threshold: config.confidence_threshold,
            rebalance_frequency: config.rebalance_frequency,
        }
    }
}

impl ExecutionConfig {
    /// `(slippage, commission)` in currency for a fill worth `gross`.
    pub fn costs(&self, gross: f64) -> (f64, f64) {
        (gross * self.slippage_rate, gross * self.commission_rate)
    }

    /// Units of a `price` asset that `cash` pays for, costs included.
    pub fn affordable_quantity(&self, cash: f64, price: f64) -> f64 {
        if cash <= 0.0 || price <= 0.0 {
            return 0.0;
        }
        cash / (price * (1.0 + self.slippage_rate + self.commission_rate))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// One executed fill. `price` is the market price; costs are separate amounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeExecution {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
    pub slippage: f64,
    /// Produced by a scheduled rebalance rather than a signal.
    pub rebalance: bool,
}

impl TradeExecution {
    pub fn gross(&self) -> f64 {
        self.quantity * self.price
    }

    pub fn costs(&self) -> f64 {
        self.commission + self.slippage
    }

    /// Signed cash movement of the fill.
    pub fn cash_flow(&self) -> f64 {
        match self.action {
            TradeAction::Buy => -(self.gross() + self.costs()),
            TradeAction::Sell => self.gross() - self.costs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BelowMinimum,
    InsufficientCash,
    NoPosition,
    InvalidPrice,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Filled {
        trade: TradeExecution,
        /// The requested quantity was cut down to what cash could pay for.
        scaled: bool,
    },
    Skipped(SkipReason),
}

/// Buy up to `quantity` units at `price`, scaled down to available cash.
pub fn buy(
    portfolio: &mut PortfolioState,
    symbol: &str,
    quantity: f64,
    price: f64,
    timestamp: NaiveDateTime,
    config: &ExecutionConfig,
    rebalance: bool,
) -> FillOutcome {
    if !(price.is_finite() && price > 0.0) {
        return FillOutcome::Skipped(SkipReason::InvalidPrice);
    }
    if quantity < MIN_TRADE_QUANTITY {
        return FillOutcome::Skipped(SkipReason::BelowMinimum);
    }

    let affordable = config.affordable_quantity(portfolio.cash, price);
    let scaled = quantity > affordable;
    let quantity = quantity.min(affordable);
    if quantity < MIN_TRADE_QUANTITY {
        return FillOutcome::Skipped(SkipReason::InsufficientCash);
    }

    let (quantity, slippage, commission, total_cost) = if scaled {
        scaled_fill(portfolio.cash, price, config)
    } else {
        let gross = quantity * price;
        let (slippage, commission) = config.costs(gross);
        (quantity, slippage, commission, gross + slippage + commission)
    };

    portfolio.cash -= total_cost;

    match portfolio.positions.get_mut(symbol) {
        Some(position) => position.add(quantity, total_cost, price),
        None => {
            portfolio.positions.insert(
                symbol.to_string(),
                Position::open(symbol, quantity, total_cost, price, timestamp),
            );
        }
    }

    let trade = TradeExecution {
        timestamp,
        symbol: symbol.to_string(),
        action: TradeAction::Buy,
        quantity,
        price,
        commission,
        slippage,
        rebalance,
    };
    portfolio.trade_log.push(trade.clone());
    FillOutcome::Filled { trade, scaled }
}

/// A fill that spends exactly `cash`. The costs are the remainder after the
/// gross amount, split between slippage and commission in rate proportion, so
/// the total never exceeds the balance.
fn scaled_fill(cash: f64, price: f64, config: &ExecutionConfig) -> (f64, f64, f64, f64) {
    let rate = config.slippage_rate + config.commission_rate;
    let gross = cash / (1.0 + rate);
    let costs = cash - gross;
    let slippage = if rate > 0.0 {
        costs * config.slippage_rate / rate
    } else {
        0.0
    };
    (gross / price, slippage, costs - slippage, cash)
}

/// Sell up to `quantity` units at `price`. A remainder below the minimum trade
/// size is sold too, so positions never linger as dust.
pub fn sell(
    portfolio: &mut PortfolioState,
    symbol: &str,
    quantity: f64,
    price: f64,
    timestamp: NaiveDateTime,
    config: &ExecutionConfig,
    rebalance: bool,
) -> FillOutcome {
    if !(price.is_finite() && price > 0.0) {
        return FillOutcome::Skipped(SkipReason::InvalidPrice);
    }
    let Some(position) = portfolio.positions.get_mut(symbol) else {
        return FillOutcome::Skipped(SkipReason::NoPosition);
    };
    let held = position.quantity;

    let mut quantity = quantity.min(held);
    if quantity < MIN_TRADE_QUANTITY {
        return FillOutcome::Skipped(SkipReason::BelowMinimum);
    }
    if held - quantity < MIN_TRADE_QUANTITY {
        quantity = held;
    }

    let gross = quantity * price;
    let (slippage, commission) = config.costs(gross);
    let proceeds = gross - slippage - commission;

    position.reduce(quantity, proceeds, price);
    if quantity >= held {
        // flat again: the round trip is complete
        let closed = position.round_trip(timestamp);
        portfolio.positions.remove(symbol);
        portfolio.closed_trades.push(closed);
    }
    portfolio.cash += proceeds;

    let trade = TradeExecution {
        timestamp,
        symbol: symbol.to_string(),
        action: TradeAction::Sell,
        quantity,
        price,
        commission,
        slippage,
        rebalance,
    };
    portfolio.trade_log.push(trade.clone());
    FillOutcome::Filled {
        trade,
        scaled: false,
    }
}

/// Run-level counters reported in the result object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub total_periods: usize,
    pub total_executions: usize,
    pub total_buys: usize,
    pub total_sells: usize,
    pub rebalance_events: usize,
    pub rebalance_executions: usize,
    pub skipped_low_confidence: usize,
    pub skipped_missing_price: usize,
    pub skipped_insufficient_cash: usize,
    pub total_commission: f64,
    pub total_slippage: f64,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub timestamp: NaiveDateTime,
    pub rebalanced: bool,
    pub executions: usize,
    pub buys: usize,
    pub sells: usize,
    /// Equity marked at this tick's prices before any fill.
    pub equity_before: f64,
    pub equity_after: f64,
    pub costs: f64,
}

/// Stateful executor over one portfolio.
#[derive(Debug)]
pub struct ExecutionEngine {
    config: ExecutionConfig,
    portfolio: PortfolioState,
    summary: ExecutionSummary,
    diagnostics: Vec<Diagnostic>,
    last_timestamp: Option<NaiveDateTime>,
}

impl ExecutionEngine {
    pub fn new(config: ExecutionConfig, initial_capital: f64) -> Self {
        ExecutionEngine {
            config,
            portfolio: PortfolioState::new(initial_capital),
            summary: ExecutionSummary::default(),
            diagnostics: Vec::new(),
            last_timestamp: None,
        }
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn summary(&self) -> &ExecutionSummary {
        &self.summary
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (PortfolioState, ExecutionSummary, Vec<Diagnostic>) {
        (self.portfolio, self.summary, self.diagnostics)
    }

    /// Advance the portfolio by one tick.
    ///
    /// `current_prices` must only hold prices known at `timestamp`. Held
    /// symbols absent from it are valued at their last mark. Ticks must arrive
    /// in increasing time order.
    pub fn execute_portfolio_signals(
        &mut self,
        timestamp: NaiveDateTime,
        signals: &BTreeMap<String, Signal>,
        current_prices: &BTreeMap<String, f64>,
        target_allocations: &AllocationWeights,
    ) -> TickSummary {
        self.portfolio.mark(current_prices);
        let equity_before = self.portfolio.total_equity(current_prices);
        let log_start = self.portfolio.trade_log.len();

        let rebalanced = match self.last_timestamp {
            Some(prev) => self.config.rebalance_frequency.is_boundary(prev, timestamp),
            None => false,
        };
        if rebalanced {
            self.summary.rebalance_events += 1;
            self.rebalance(timestamp, current_prices, target_allocations);
        }

        for (symbol, signal) in signals {
            self.execute_signal(timestamp, symbol, signal, current_prices, target_allocations);
        }

        let equity_after = self.portfolio.total_equity(current_prices);
        self.portfolio.record_equity(timestamp, equity_after);
        self.last_timestamp = Some(timestamp);
        self.summary.total_periods += 1;

        let fills = &self.portfolio.trade_log[log_start..];
        let buys = fills.iter().filter(|t| t.action == TradeAction::Buy).count();
        let costs: f64 = fills.iter().map(TradeExecution::costs).sum();
        for fill in fills {
            self.summary.total_commission += fill.commission;
            self.summary.total_slippage += fill.slippage;
        }
        self.summary.total_executions += fills.len();
        self.summary.total_buys += buys;
        self.summary.total_sells += fills.len() - buys;

        TickSummary {
            timestamp,
            rebalanced,
            executions: fills.len(),
            buys,
            sells: fills.len() - buys,
            equity_before,
            equity_after,
            costs,
        }
    }

    fn execute_signal(
        &mut self,
        timestamp: NaiveDateTime,
        symbol: &str,
        signal: &Signal,
        prices: &BTreeMap<String, f64>,
        targets: &AllocationWeights,
    ) {
        let Some(&price) = prices.get(symbol) else {
            self.summary.skipped_missing_price += 1;
            self.diagnostics.push(
                Diagnostic::warning(Stage::Execution, "signal has no price; skipped for this tick")
                    .for_symbol(symbol)
                    .at(timestamp),
            );
            return;
        };

        let prediction = signal.effective_prediction(self.config.confidence_threshold);
        if prediction == Prediction::Hold && signal.prediction != Prediction::Hold {
            self.summary.skipped_low_confidence += 1;
            tracing::debug!(
                symbol,
                confidence = signal.confidence,
                threshold = self.config.confidence_threshold,
                "signal below confidence threshold"
            );
        }

        match prediction {
            Prediction::Hold => {}
            Prediction::Buy => {
                let weight = targets.get(symbol);
                let equity = self.portfolio.total_equity(prices);
                let target_quantity = weight * equity / price;
                let delta = target_quantity - self.portfolio.quantity(symbol);
                if delta < MIN_TRADE_QUANTITY {
                    tracing::debug!(symbol, weight, "already at or above target; buy ignored");
                    return;
                }
                let outcome = buy(
                    &mut self.portfolio,
                    symbol,
                    delta,
                    price,
                    timestamp,
                    &self.config,
                    false,
                );
                self.note_fill(symbol, timestamp, &outcome);
            }
            Prediction::Sell => {
                let held = self.portfolio.quantity(symbol);
                if held < MIN_TRADE_QUANTITY {
                    return;
                }
                let outcome = sell(
                    &mut self.portfolio,
                    symbol,
                    held,
                    price,
                    timestamp,
                    &self.config,
                    false,
                );
                self.note_fill(symbol, timestamp, &outcome);
            }
        }
    }

    /// Move every position toward its target weight. Sells go first so their
    /// proceeds fund the buys.
    fn rebalance(
        &mut self,
        timestamp: NaiveDateTime,
        prices: &BTreeMap<String, f64>,
        targets: &AllocationWeights,
    ) {
        let equity = self.portfolio.total_equity(prices);
        if equity <= 0.0 {
            return;
        }

        let symbols: BTreeSet<String> = targets
            .iter()
            .map(|(s, _)| s.clone())
            .chain(self.portfolio.positions.keys().cloned())
            .collect();

        let mut sells = Vec::new();
        let mut buys = Vec::new();
        for symbol in symbols {
            let Some(&price) = prices.get(&symbol) else {
                if self.portfolio.quantity(&symbol) > 0.0 || targets.get(&symbol) > 0.0 {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            Stage::Execution,
                            "no price known at rebalance; symbol left as is",
                        )
                        .for_symbol(&symbol)
                        .at(timestamp),
                    );
                }
                continue;
            };
            let target_value = targets.get(&symbol) * equity;
            let drift = target_value - self.portfolio.quantity(&symbol) * price;
            if drift.abs() < REBALANCE_TOLERANCE * equity {
                continue;
            }
            if drift < 0.0 {
                sells.push((symbol, -drift / price, price));
            } else {
                buys.push((symbol, drift / price, price));
            }
        }

        tracing::debug!(%timestamp, sells = sells.len(), buys = buys.len(), "rebalancing");

        for (symbol, quantity, price) in sells {
            let outcome = sell(
                &mut self.portfolio,
                &symbol,
                quantity,
                price,
                timestamp,
                &self.config,
                true,
            );
            self.note_fill(&symbol, timestamp, &outcome);
        }
        for (symbol, quantity, price) in buys {
            let outcome = buy(
                &mut self.portfolio,
                &symbol,
                quantity,
                price,
                timestamp,
                &self.config,
                true,
            );
            self.note_fill(&symbol, timestamp, &outcome);
        }
    }

    fn note_fill(&mut self, symbol: &str, timestamp: NaiveDateTime, outcome: &FillOutcome) {
        match outcome {
            FillOutcome::Filled { trade, scaled } => {
                if trade.rebalance {
                    self.summary.rebalance_executions += 1;
                }
                tracing::debug!(
                    symbol,
                    action = ?trade.action,
                    quantity = trade.quantity,
                    price = trade.price,
                    scaled,
                    "fill"
                );
            }
            FillOutcome::Skipped(SkipReason::InsufficientCash) => {
                self.summary.skipped_insufficient_cash += 1;
                self.diagnostics.push(
                    Diagnostic::warning(Stage::Execution, "insufficient cash for buy")
                        .for_symbol(symbol)
                        .at(timestamp),
                );
            }
            FillOutcome::Skipped(reason) => {
                tracing::debug!(symbol, ?reason, "fill skipped");
            }
        }
    }
}
