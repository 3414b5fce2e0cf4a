//! Portfolio backtest orchestration.
//!
//! Stages, in order:
//! 1. parallel price load (window widened by `lookback_days`)
//! 2. parallel walk-forward signal generation per symbol
//! 3. daily return series for risk parity and correlation
//! 4. target allocations
//! 5. single-threaded event loop over the unified signal timeline
//! 6. performance and diversification analytics
//!
//! A stage that leaves no usable symbol ends the run with an error. Any other
//! per-symbol problem excludes that symbol and is reported as a diagnostic.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::BTreeMap;

use crate::domain::allocation::calculate_target_allocations;
use crate::domain::config::BacktestConfig;
use crate::domain::diversification::{calculate_correlation_matrix, calculate_diversification_metrics};
use crate::domain::error::{Diagnostic, MultitraderError, Stage};
use crate::domain::execution::{ExecutionConfig, ExecutionEngine};
use crate::domain::metrics::calculate_portfolio_metrics;
use crate::domain::prices::PriceBook;
use crate::domain::result::{BacktestOutcome, BacktestReport, ConfigEcho};
use crate::domain::returns::{HistoricalReturns, daily_returns};
use crate::domain::signal::{RawSignal, Signal};
use crate::domain::timeline::{SymbolSignals, build_unified_timeline, date_window, signals_at};
use crate::domain::universe::{SkipReason, SkippedSymbol, load_universe};
use crate::ports::data_port::DataPort;
use crate::ports::signal_port::SignalPort;

/// Run a backtest and fold any error into the structured failure result.
pub fn run_portfolio_backtest(
    data_port: &dyn DataPort,
    signal_port: &dyn SignalPort,
    config: &BacktestConfig,
) -> BacktestOutcome {
    let result = try_run_portfolio_backtest(data_port, signal_port, config);
    if let Err(e) = &result {
        tracing::error!(error = %e, "backtest failed");
    }
    BacktestOutcome::from(result)
}

pub fn try_run_portfolio_backtest(
    data_port: &dyn DataPort,
    signal_port: &dyn SignalPort,
    config: &BacktestConfig,
) -> Result<BacktestReport, MultitraderError> {
    config.validate()?;

    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut skipped: Vec<SkippedSymbol> = Vec::new();

    // Stage 1: Load price history
    tracing::info!(
        symbols = config.symbols.len(),
        from = %config.data_start_date(),
        to = %config.end_date,
        "loading price history"
    );
    let universe = load_universe(
        data_port,
        &config.symbols,
        config.data_start_date(),
        config.end_date,
        &config.interval,
        config.use_cache,
    )?;
    skipped.extend(universe.skipped.iter().cloned());

    // Stage 2: Generate signals
    let streams = generate_signals(
        signal_port,
        config,
        &universe.prices,
        &universe.loaded,
        &mut skipped,
        &mut diagnostics,
    )?;
    let active: Vec<String> = streams.iter().map(|s| s.symbol.clone()).collect();
    let total_predictions: usize = streams.iter().map(SymbolSignals::len).sum();
    tracing::info!(
        symbols = active.len(),
        predictions = total_predictions,
        "signals generated"
    );

    // Stage 3: Historical returns
    let historical_returns: HistoricalReturns = active
        .iter()
        .filter_map(|s| {
            universe
                .prices
                .bars(s)
                .map(|bars| (s.clone(), daily_returns(bars)))
        })
        .collect();

    // Stage 4: Target allocations
    let (targets, allocation_diagnostics) = calculate_target_allocations(
        &config.allocation_strategy,
        &active,
        Some(&historical_returns),
        config.start_date,
        config.lookback_days as usize,
    )?;
    diagnostics.extend(allocation_diagnostics);

    // Stage 5: Event loop
    let timeline = build_unified_timeline(&streams);
    tracing::info!(ticks = timeline.len(), "running event loop");

    let mut engine = ExecutionEngine::new(ExecutionConfig::from(config), config.initial_capital);
    for &timestamp in &timeline {
        let signals = signals_at(&streams, timestamp);
        let prices = tick_prices(&universe.prices, &active, &signals, timestamp);
        engine.execute_portfolio_signals(timestamp, &signals, &prices, &targets);
    }
    let (portfolio, execution_summary, execution_diagnostics) = engine.into_parts();
    diagnostics.extend(execution_diagnostics);

    // Stage 6: Analytics
    let portfolio_metrics =
        calculate_portfolio_metrics(&portfolio, config.prediction_frequency, config.risk_free_rate);
    let correlation_matrix = calculate_correlation_matrix(&historical_returns);
    let diversification = calculate_diversification_metrics(&correlation_matrix, &targets);

    diagnostics.extend(skipped.iter().map(SkippedSymbol::to_diagnostic));
    for diagnostic in &diagnostics {
        diagnostic.log();
    }

    tracing::info!(
        final_equity = portfolio.final_equity(),
        trades = execution_summary.total_executions,
        "backtest complete"
    );

    Ok(BacktestReport {
        status: "success",
        backtest_config: ConfigEcho::from(config),
        portfolio_metrics,
        target_allocations: targets,
        diversification,
        correlation_matrix,
        symbols_loaded: active,
        total_predictions,
        execution_summary,
        final_equity: portfolio.final_equity(),
        symbols_failed: skipped,
        diagnostics,
        equity_curve: portfolio.equity_curve,
        trade_log: portfolio.trade_log,
        closed_trades: portfolio.closed_trades,
    })
}

/// Run the signal provider for every loaded symbol in parallel and align the
/// results. Symbols that fail or produce nothing inside the window are skipped.
fn generate_signals(
    signal_port: &dyn SignalPort,
    config: &BacktestConfig,
    prices: &PriceBook,
    symbols: &[String],
    skipped: &mut Vec<SkippedSymbol>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<SymbolSignals>, MultitraderError> {
    let generated: Vec<(String, Result<Vec<RawSignal>, MultitraderError>)> = symbols
        .par_iter()
        .map(|symbol| {
            let bars = prices.bars(symbol).unwrap_or_default();
            let raw = signal_port.walk_forward_backtest(
                symbol,
                bars,
                config.start_date,
                config.end_date,
                config.prediction_frequency,
                config.lookback_days,
            );
            (symbol.clone(), raw)
        })
        .collect();

    let window = date_window(config.start_date, config.end_date);
    let mut streams = Vec::with_capacity(generated.len());

    for (symbol, raw) in generated {
        match raw {
            Err(e) => skipped.push(SkippedSymbol::new(
                &symbol,
                Stage::SignalGeneration,
                SkipReason::SignalFailed {
                    reason: e.to_string(),
                },
            )),
            Ok(raw) => {
                let (stream, alignment) = SymbolSignals::from_raw(&symbol, raw, window);
                diagnostics.extend(alignment);
                if stream.is_empty() {
                    skipped.push(SkippedSymbol::new(
                        &symbol,
                        Stage::SignalGeneration,
                        SkipReason::NoPredictions,
                    ));
                } else {
                    streams.push(stream);
                }
            }
        }
    }

    if streams.is_empty() {
        return Err(MultitraderError::NoUsableSymbols {
            stage: Stage::SignalGeneration,
        });
    }
    Ok(streams)
}

/// Prices known at `timestamp`: a signal's own price when it carries a valid
/// one, otherwise the latest close at or before `timestamp`.
fn tick_prices(
    book: &PriceBook,
    symbols: &[String],
    signals: &BTreeMap<String, Signal>,
    timestamp: NaiveDateTime,
) -> BTreeMap<String, f64> {
    symbols
        .iter()
        .filter_map(|symbol| {
            let quoted = signals
                .get(symbol)
                .and_then(|s| s.current_price)
                .filter(|p| p.is_finite() && *p > 0.0);
            quoted
                .or_else(|| book.price_as_of(symbol, timestamp))
                .map(|price| (symbol.clone(), price))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prices::PricePoint;
    use crate::domain::signal::Prediction;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bar(symbol: &str, day: u32, close: f64) -> PricePoint {
        PricePoint {
            symbol: symbol.into(),
            timestamp: ts(day),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    #[test]
    fn tick_prices_prefers_signal_price() {
        let mut book = PriceBook::new();
        book.insert("A", vec![bar("A", 1, 100.0)]);
        let signals: BTreeMap<String, Signal> = [(
            "A".to_string(),
            Signal {
                symbol: "A".into(),
                timestamp: ts(2),
                prediction: Prediction::Buy,
                confidence: 1.0,
                current_price: Some(101.5),
            },
        )]
        .into();

        let prices = tick_prices(&book, &["A".to_string()], &signals, ts(2));
        assert_eq!(prices.get("A"), Some(&101.5));
    }

    #[test]
    fn tick_prices_never_uses_future_bars() {
        let mut book = PriceBook::new();
        book.insert("A", vec![bar("A", 1, 100.0), bar("A", 3, 300.0)]);
        book.insert("B", vec![bar("B", 5, 50.0)]);

        let prices = tick_prices(
            &book,
            &["A".to_string(), "B".to_string()],
            &BTreeMap::new(),
            ts(2),
        );
        assert_eq!(prices.get("A"), Some(&100.0));
        assert!(!prices.contains_key("B"));
    }

    #[test]
    fn tick_prices_ignores_invalid_signal_price() {
        let mut book = PriceBook::new();
        book.insert("A", vec![bar("A", 1, 100.0)]);
        let signals: BTreeMap<String, Signal> = [(
            "A".to_string(),
            Signal {
                symbol: "A".into(),
                timestamp: ts(2),
                prediction: Prediction::Hold,
                confidence: 1.0,
                current_price: Some(0.0),
            },
        )]
        .into();
        let prices = tick_prices(&book, &["A".to_string()], &signals, ts(2));
        assert_eq!(prices.get("A"), Some(&100.0));
    }
}
