//! Symbol universe: parsing symbol lists and loading their price history.
//!
//! Symbols that fail to load, or load too little history, are excluded with a
//! recorded reason. Only an empty result is fatal.

use crate::domain::error::{Diagnostic, MultitraderError, Stage};
use crate::domain::prices::PriceBook;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// A symbol needs at least this many bars to yield one return.
pub const MIN_PRICE_BARS: usize = 2;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    LoadFailed { reason: String },
    NoData,
    InsufficientBars { bars: usize },
    SignalFailed { reason: String },
    NoPredictions,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::LoadFailed { reason } => write!(f, "load failed: {reason}"),
            SkipReason::NoData => f.write_str("no data found"),
            SkipReason::InsufficientBars { bars } => {
                write!(f, "only {bars} bars, minimum {MIN_PRICE_BARS} required")
            }
            SkipReason::SignalFailed { reason } => write!(f, "signal generation failed: {reason}"),
            SkipReason::NoPredictions => f.write_str("no predictions in the backtest window"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub stage: Stage,
    pub reason: SkipReason,
}

impl SkippedSymbol {
    pub fn new(symbol: &str, stage: Stage, reason: SkipReason) -> Self {
        SkippedSymbol {
            symbol: symbol.to_string(),
            stage,
            reason,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::warning(self.stage, format!("excluded: {}", self.reason)).for_symbol(&self.symbol)
    }
}

#[derive(Debug, Clone)]
pub struct LoadedUniverse {
    pub prices: PriceBook,
    /// Symbols with usable history, in configured order.
    pub loaded: Vec<String>,
    pub skipped: Vec<SkippedSymbol>,
}

/// Load every symbol in parallel and split the results into usable and skipped.
pub fn load_universe(
    data_port: &dyn DataPort,
    symbols: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
    interval: &str,
    use_cache: bool,
) -> Result<LoadedUniverse, MultitraderError> {
    let mut results =
        data_port.load_multiple_symbols(symbols, start_date, end_date, interval, use_cache);

    let mut prices = PriceBook::new();
    let mut loaded = Vec::new();
    let mut skipped = Vec::new();

    for symbol in symbols {
        let outcome = results.remove(symbol).unwrap_or_else(|| {
            Err(MultitraderError::Data {
                symbol: symbol.clone(),
                reason: "provider returned no result".into(),
            })
        });

        let reason = match outcome {
            Err(e) => SkipReason::LoadFailed {
                reason: e.to_string(),
            },
            Ok(bars) if bars.is_empty() => SkipReason::NoData,
            Ok(bars) if bars.len() < MIN_PRICE_BARS => {
                SkipReason::InsufficientBars { bars: bars.len() }
            }
            Ok(bars) => {
                tracing::info!(symbol = %symbol, bars = bars.len(), "price history loaded");
                prices.insert(symbol, bars);
                loaded.push(symbol.clone());
                continue;
            }
        };
        skipped.push(SkippedSymbol::new(symbol, Stage::DataLoad, reason));
    }

    if loaded.is_empty() {
        return Err(MultitraderError::NoUsableSymbols {
            stage: Stage::DataLoad,
        });
    }

    if !skipped.is_empty() {
        tracing::warn!(
            loaded = loaded.len(),
            requested = symbols.len(),
            "some symbols were excluded at data load"
        );
    }

    Ok(LoadedUniverse {
        prices,
        loaded,
        skipped,
    })
}
