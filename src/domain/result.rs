//! The result object returned by a portfolio backtest run.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;

use super::allocation::AllocationWeights;
use super::config::{BacktestConfig, PredictionFrequency, RebalanceFrequency};
use super::diversification::{CorrelationMatrix, DiversificationMetrics};
use super::error::{Diagnostic, MultitraderError};
use super::execution::{ExecutionSummary, TradeExecution};
use super::metrics::PerformanceMetrics;
use super::position::ClosedTrade;
use super::universe::SkippedSymbol;

/// Echo of the run parameters under `backtest_config`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigEcho {
    pub symbols: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub model_type: String,
    pub allocation_strategy: String,
    pub prediction_frequency: PredictionFrequency,
    pub rebalance_frequency: RebalanceFrequency,
    pub confidence_threshold: f64,
    pub lookback_days: u32,
    pub commission_rate: f64,
    pub slippage_rate: f64,
}

impl From<&BacktestConfig> for ConfigEcho {
    fn from(config: &BacktestConfig) -> Self {
        ConfigEcho {
            symbols: config.symbols.clone(),
            start_date: config.start_date,
            end_date: config.end_date,
            initial_capital: config.initial_capital,
            model_type: config.model_type.clone(),
            allocation_strategy: config.allocation_strategy.name().to_string(),
            prediction_frequency: config.prediction_frequency,
            rebalance_frequency: config.rebalance_frequency,
            confidence_threshold: config.confidence_threshold,
            lookback_days: config.lookback_days,
            commission_rate: config.commission_rate,
            slippage_rate: config.slippage_rate,
        }
    }
}

/// A completed run. Serialized keys form the public result contract; the
/// run history fields are kept for callers but not serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub status: &'static str,
    pub backtest_config: ConfigEcho,
    pub portfolio_metrics: PerformanceMetrics,
    pub target_allocations: AllocationWeights,
    pub diversification: DiversificationMetrics,
    pub correlation_matrix: CorrelationMatrix,
    pub symbols_loaded: Vec<String>,
    pub total_predictions: usize,
    pub execution_summary: ExecutionSummary,
    pub final_equity: f64,
    pub symbols_failed: Vec<SkippedSymbol>,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip)]
    pub equity_curve: BTreeMap<NaiveDateTime, f64>,
    #[serde(skip)]
    pub trade_log: Vec<TradeExecution>,
    #[serde(skip)]
    pub closed_trades: Vec<ClosedTrade>,
}

/// Either a report or `{ "error": "..." }`. Never a panic or a bare error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BacktestOutcome {
    Success(Box<BacktestReport>),
    Failure { error: String },
}

impl BacktestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BacktestOutcome::Success(_))
    }

    pub fn report(&self) -> Option<&BacktestReport> {
        match self {
            BacktestOutcome::Success(report) => Some(report),
            BacktestOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BacktestOutcome::Success(_) => None,
            BacktestOutcome::Failure { error } => Some(error),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, MultitraderError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl From<Result<BacktestReport, MultitraderError>> for BacktestOutcome {
    fn from(result: Result<BacktestReport, MultitraderError>) -> Self {
        match result {
            Ok(report) => BacktestOutcome::Success(Box::new(report)),
            Err(e) => BacktestOutcome::Failure {
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::Stage;

    #[test]
    fn failure_serializes_to_error_only() {
        let outcome = BacktestOutcome::from(Err(MultitraderError::NoUsableSymbols {
            stage: Stage::DataLoad,
        }));
        assert!(!outcome.is_success());
        assert_eq!(outcome.error(), Some("no usable symbols after data load"));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "error": "no usable symbols after data load" })
        );
    }

    #[test]
    fn config_echo_uses_strategy_name() {
        let config = BacktestConfig::new(
            vec!["AAPL".into()],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        );
        let echo = ConfigEcho::from(&config);
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["allocation_strategy"], "equal");
        assert_eq!(json["rebalance_frequency"], "monthly");
        assert_eq!(json["start_date"], "2024-01-01");
    }
}
