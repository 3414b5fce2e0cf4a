//! Backtest configuration record and its enumerated options.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::MultitraderError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    Equal,
    RiskParity,
    /// Explicit weights. Symbols missing from the map receive weight 0.
    Custom(BTreeMap<String, f64>),
}

impl AllocationStrategy {
    pub const EXPECTED: &'static str = "equal, risk_parity, custom";

    /// Resolve a strategy name, attaching `custom_weights` when the name is `custom`.
    pub fn from_name(
        name: &str,
        custom_weights: Option<BTreeMap<String, f64>>,
    ) -> Result<Self, MultitraderError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "equal" => Ok(AllocationStrategy::Equal),
            "risk_parity" => Ok(AllocationStrategy::RiskParity),
            "custom" => custom_weights.map(AllocationStrategy::Custom).ok_or_else(|| {
                MultitraderError::ConfigMissing {
                    section: "allocation".into(),
                    key: "weight.<SYMBOL>".into(),
                }
            }),
            _ => Err(MultitraderError::UnknownVariant {
                kind: "allocation_strategy",
                value: name.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AllocationStrategy::Equal => "equal",
            AllocationStrategy::RiskParity => "risk_parity",
            AllocationStrategy::Custom(_) => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceFrequency {
    Never,
    Weekly,
    Monthly,
    Quarterly,
}

impl RebalanceFrequency {
    /// Whether moving from `prev` to `curr` crosses a calendar boundary.
    pub fn is_boundary(self, prev: NaiveDateTime, curr: NaiveDateTime) -> bool {
        let (p, c) = (prev.date(), curr.date());
        match self {
            RebalanceFrequency::Never => false,
            RebalanceFrequency::Weekly => {
                let (pw, cw) = (p.iso_week(), c.iso_week());
                (pw.year(), pw.week()) != (cw.year(), cw.week())
            }
            RebalanceFrequency::Monthly => (p.year(), p.month()) != (c.year(), c.month()),
            RebalanceFrequency::Quarterly => {
                (p.year(), p.month0() / 3) != (c.year(), c.month0() / 3)
            }
        }
    }
}

impl FromStr for RebalanceFrequency {
    type Err = MultitraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(RebalanceFrequency::Never),
            "weekly" => Ok(RebalanceFrequency::Weekly),
            "monthly" => Ok(RebalanceFrequency::Monthly),
            "quarterly" => Ok(RebalanceFrequency::Quarterly),
            _ => Err(MultitraderError::UnknownVariant {
                kind: "rebalance_frequency",
                value: s.to_string(),
                expected: "never, weekly, monthly, quarterly",
            }),
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebalanceFrequency::Never => "never",
            RebalanceFrequency::Weekly => "weekly",
            RebalanceFrequency::Monthly => "monthly",
            RebalanceFrequency::Quarterly => "quarterly",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl PredictionFrequency {
    pub fn periods_per_year(self) -> f64 {
        match self {
            PredictionFrequency::Daily => 252.0,
            PredictionFrequency::Weekly => 52.0,
            PredictionFrequency::Monthly => 12.0,
        }
    }

    /// Bucket a date into its prediction period.
    pub fn period_key(self, date: NaiveDate) -> (i32, u32) {
        match self {
            PredictionFrequency::Daily => (date.year(), date.ordinal()),
            PredictionFrequency::Weekly => {
                let w = date.iso_week();
                (w.year(), w.week())
            }
            PredictionFrequency::Monthly => (date.year(), date.month()),
        }
    }
}

impl FromStr for PredictionFrequency {
    type Err = MultitraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(PredictionFrequency::Daily),
            "weekly" => Ok(PredictionFrequency::Weekly),
            "monthly" => Ok(PredictionFrequency::Monthly),
            _ => Err(MultitraderError::UnknownVariant {
                kind: "prediction_frequency",
                value: s.to_string(),
                expected: "daily, weekly, monthly",
            }),
        }
    }
}

impl fmt::Display for PredictionFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PredictionFrequency::Daily => "daily",
            PredictionFrequency::Weekly => "weekly",
            PredictionFrequency::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

/// Parameters of one portfolio backtest. Built once, validated, then only read.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbols: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub model_type: String,
    pub allocation_strategy: AllocationStrategy,
    pub confidence_threshold: f64,
    pub lookback_days: u32,
    pub prediction_frequency: PredictionFrequency,
    pub rebalance_frequency: RebalanceFrequency,
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub use_cache: bool,
    pub interval: String,
    pub risk_free_rate: f64,
}

impl BacktestConfig {
    /// A config with the documented defaults for everything but the universe and range.
    pub fn new(symbols: Vec<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        BacktestConfig {
            symbols,
            start_date,
            end_date,
            initial_capital: 10_000.0,
            model_type: "ensemble".to_string(),
            allocation_strategy: AllocationStrategy::Equal,
            confidence_threshold: 0.6,
            lookback_days: 60,
            prediction_frequency: PredictionFrequency::Daily,
            rebalance_frequency: RebalanceFrequency::Monthly,
            commission_rate: 0.001,
            slippage_rate: 0.0005,
            use_cache: true,
            interval: "1d".to_string(),
            risk_free_rate: 0.0,
        }
    }

    /// First date of price history to load: room for the lookback window.
    pub fn data_start_date(&self) -> NaiveDate {
        self.start_date - chrono::Duration::days(i64::from(self.lookback_days))
    }

    pub fn validate(&self) -> Result<(), MultitraderError> {
        if self.symbols.is_empty() {
            return Err(invalid("backtest", "symbols", "at least one symbol is required"));
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(invalid("backtest", "initial_capital", "initial_capital must be positive"));
        }
        if self.start_date >= self.end_date {
            return Err(invalid("backtest", "start_date", "start_date must be before end_date"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid(
                "backtest",
                "confidence_threshold",
                "confidence_threshold must be between 0 and 1",
            ));
        }
        if !(0.0..1.0).contains(&self.commission_rate) {
            return Err(invalid(
                "execution",
                "commission_rate",
                "commission_rate must be in [0, 1)",
            ));
        }
        if !(0.0..1.0).contains(&self.slippage_rate) {
            return Err(invalid(
                "execution",
                "slippage_rate",
                "slippage_rate must be in [0, 1)",
            ));
        }
        if !(0.0..1.0).contains(&self.risk_free_rate) {
            return Err(invalid(
                "backtest",
                "risk_free_rate",
                "risk_free_rate must be in [0, 1)",
            ));
        }
        if let AllocationStrategy::Custom(weights) = &self.allocation_strategy {
            super::allocation::validate_custom_weights(weights)?;
        }
        Ok(())
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> MultitraderError {
    MultitraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
