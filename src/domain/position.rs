//! Open positions and realized round trips.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Long-only holding in one symbol. `quantity` is never negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    /// All-in cost per unit, entry slippage and commission included.
    pub average_cost: f64,
    pub opened_at: NaiveDateTime,
    /// Most recent price the position was marked or filled at.
    pub last_price: f64,
    /// Units and all-in cash spent on every BUY since the position opened.
    pub entry_quantity: f64,
    pub entry_cost: f64,
    /// Units and gross value of every SELL since the position opened.
    pub exit_quantity: f64,
    pub exit_value: f64,
    /// Net P&L of the units sold so far, against the average cost at each sale.
    pub realized_pnl: f64,
}

impl Position {
    pub fn open(symbol: &str, quantity: f64, total_cost: f64, price: f64, at: NaiveDateTime) -> Self {
        Position {
            symbol: symbol.to_string(),
            quantity,
            average_cost: total_cost / quantity,
            opened_at: at,
            last_price: price,
            entry_quantity: quantity,
            entry_cost: total_cost,
            exit_quantity: 0.0,
            exit_value: 0.0,
            realized_pnl: 0.0,
        }
    }

    /// Add `quantity` units that cost `total_cost` in cash, re-averaging the basis.
    pub fn add(&mut self, quantity: f64, total_cost: f64, price: f64) {
        let basis = self.average_cost * self.quantity + total_cost;
        self.quantity += quantity;
        self.average_cost = basis / self.quantity;
        self.last_price = price;
        self.entry_quantity += quantity;
        self.entry_cost += total_cost;
    }

    /// Remove `quantity` units sold at `price` for `proceeds` net of exit costs.
    /// The average cost is unchanged.
    pub fn reduce(&mut self, quantity: f64, proceeds: f64, price: f64) {
        self.realized_pnl += proceeds - quantity * self.average_cost;
        self.quantity -= quantity;
        self.exit_quantity += quantity;
        self.exit_value += quantity * price;
        self.last_price = price;
    }

    /// Summarize the round trip from the first BUY to `exit_timestamp`.
    pub fn round_trip(&self, exit_timestamp: NaiveDateTime) -> ClosedTrade {
        ClosedTrade {
            symbol: self.symbol.clone(),
            quantity: self.entry_quantity,
            entry_price: per_unit(self.entry_cost, self.entry_quantity),
            exit_price: per_unit(self.exit_value, self.exit_quantity),
            entry_timestamp: self.opened_at,
            exit_timestamp,
            pnl: self.realized_pnl,
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.average_cost)
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.average_cost
    }
}

fn per_unit(total: f64, quantity: f64) -> f64 {
    if quantity > 0.0 { total / quantity } else { 0.0 }
}

/// One round trip in a symbol: from flat, through any number of BUY and SELL
/// fills, back to flat. Partial sells along the way accumulate into `pnl`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub symbol: String,
    /// Total units bought during the trip.
    pub quantity: f64,
    /// Volume-weighted all-in entry cost per unit.
    pub entry_price: f64,
    /// Volume-weighted gross exit price per unit.
    pub exit_price: f64,
    pub entry_timestamp: NaiveDateTime,
    pub exit_timestamp: NaiveDateTime,
    /// Net of entry and exit costs.
    pub pnl: f64,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
