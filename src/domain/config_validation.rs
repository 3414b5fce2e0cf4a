//! Build and validate a [`BacktestConfig`] from a configuration source.
//!
//! Every key is checked before a run starts. Unknown enum values, malformed
//! numbers and out-of-range settings are reported as config errors.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::domain::config::{
    AllocationStrategy, BacktestConfig, PredictionFrequency, RebalanceFrequency,
};
use crate::domain::error::MultitraderError;
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;

const WEIGHT_PREFIX: &str = "weight.";

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, MultitraderError> {
    let symbols = required_string(config, "backtest", "symbols")?;
    let symbols = parse_symbols(&symbols).map_err(|e| MultitraderError::ConfigInvalid {
        section: "backtest".into(),
        key: "symbols".into(),
        reason: e.to_string(),
    })?;
    let start_date = required_date(config, "start_date")?;
    let end_date = required_date(config, "end_date")?;

    let mut built = BacktestConfig::new(symbols, start_date, end_date);

    if let Some(v) = config.get_double("backtest", "initial_capital")? {
        built.initial_capital = v;
    }
    if let Some(v) = config.get_string("backtest", "model_type") {
        let v = v.trim();
        if v.is_empty() {
            return Err(invalid("backtest", "model_type", "model_type must not be empty"));
        }
        built.model_type = v.to_string();
    }
    if let Some(v) = config.get_string("backtest", "prediction_frequency") {
        built.prediction_frequency = PredictionFrequency::from_str(&v)?;
    }
    if let Some(v) = config.get_int("backtest", "lookback_days")? {
        built.lookback_days = u32::try_from(v)
            .map_err(|_| invalid("backtest", "lookback_days", "lookback_days must be non-negative"))?;
    }
    if let Some(v) = config.get_double("backtest", "confidence_threshold")? {
        built.confidence_threshold = v;
    }
    if let Some(v) = config.get_bool("backtest", "use_cache")? {
        built.use_cache = v;
    }
    if let Some(v) = config.get_string("backtest", "interval") {
        built.interval = v.trim().to_string();
    }
    if let Some(v) = config.get_double("backtest", "risk_free_rate")? {
        built.risk_free_rate = v;
    }

    if let Some(v) = config.get_double("execution", "commission_rate")? {
        built.commission_rate = v;
    }
    if let Some(v) = config.get_double("execution", "slippage_rate")? {
        built.slippage_rate = v;
    }
    if let Some(v) = config.get_string("execution", "rebalance_frequency") {
        built.rebalance_frequency = RebalanceFrequency::from_str(&v)?;
    }

    if let Some(name) = config.get_string("allocation", "strategy") {
        built.allocation_strategy = AllocationStrategy::from_name(&name, custom_weights(config)?)?;
    }

    built.validate()?;
    Ok(built)
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), MultitraderError> {
    build_backtest_config(config).map(|_| ())
}

/// `weight.<SYMBOL>` keys of `[allocation]`, or `None` when there are none.
fn custom_weights(
    config: &dyn ConfigPort,
) -> Result<Option<BTreeMap<String, f64>>, MultitraderError> {
    let mut weights = BTreeMap::new();
    for key in config.keys("allocation") {
        let Some(symbol) = key.strip_prefix(WEIGHT_PREFIX) else {
            continue;
        };
        if symbol.trim().is_empty() {
            return Err(invalid("allocation", &key, "weight key has no symbol"));
        }
        if let Some(w) = config.get_double("allocation", &key)? {
            weights.insert(symbol.trim().to_uppercase(), w);
        }
    }
    Ok(if weights.is_empty() { None } else { Some(weights) })
}

fn required_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, MultitraderError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(MultitraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn required_date(config: &dyn ConfigPort, field: &str) -> Result<NaiveDate, MultitraderError> {
    let value = required_string(config, "backtest", field)?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        invalid(
            "backtest",
            field,
            &format!("invalid {field} format, expected YYYY-MM-DD"),
        )
    })
}

fn invalid(section: &str, key: &str, reason: &str) -> MultitraderError {
    MultitraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
