//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_signal_adapter::CsvSignalAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::try_run_portfolio_backtest;
use crate::domain::config::BacktestConfig;
use crate::domain::config_validation::build_backtest_config;
use crate::domain::error::MultitraderError;
use crate::domain::result::{BacktestOutcome, BacktestReport};
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_PRICE_DIR: &str = "data/prices";
const DEFAULT_SIGNAL_DIR: &str = "data/signals";

#[derive(Parser, Debug)]
#[command(name = "multitrader", about = "Multi-asset walk-forward portfolio backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a portfolio backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the JSON result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated symbols, replacing [backtest] symbols
        #[arg(long)]
        symbols: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a backtest configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            symbols,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, symbols.as_deref())
            } else {
                run_backtest(&config, output.as_deref(), symbols.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = MultitraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// A config source with `[backtest] symbols` replaced from the command line.
struct SymbolOverride<'a> {
    inner: &'a dyn ConfigPort,
    symbols: &'a str,
}

impl ConfigPort for SymbolOverride<'_> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        if section.eq_ignore_ascii_case("backtest") && key.eq_ignore_ascii_case("symbols") {
            Some(self.symbols.to_string())
        } else {
            self.inner.get_string(section, key)
        }
    }

    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, MultitraderError> {
        self.inner.get_int(section, key)
    }

    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, MultitraderError> {
        self.inner.get_double(section, key)
    }

    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, MultitraderError> {
        self.inner.get_bool(section, key)
    }

    fn keys(&self, section: &str) -> Vec<String> {
        self.inner.keys(section)
    }
}

/// Load and validate the config file, applying a `--symbols` override.
fn resolve_config(
    config_path: &Path,
    symbols_override: Option<&str>,
) -> Result<(FileConfigAdapter, BacktestConfig), ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;

    if let Some(symbols) = symbols_override
        && let Err(e) = parse_symbols(symbols)
    {
        eprintln!("error: failed to parse --symbols: {e}");
        return Err(ExitCode::from(2));
    }

    let built = match symbols_override {
        Some(symbols) => build_backtest_config(&SymbolOverride {
            inner: &adapter,
            symbols,
        }),
        None => build_backtest_config(&adapter),
    };
    match built {
        Ok(config) => Ok((adapter, config)),
        Err(e) => {
            eprintln!("error: {e}");
            Err((&e).into())
        }
    }
}

/// `[data]` directories, resolved against the config file's directory when relative.
pub fn data_dirs(adapter: &dyn ConfigPort, config_path: &Path) -> (PathBuf, PathBuf) {
    let base = config_path.parent().unwrap_or_else(|| Path::new(""));
    let resolve = |key: &str, default: &str| {
        let dir = PathBuf::from(
            adapter
                .get_string("data", key)
                .unwrap_or_else(|| default.to_string()),
        );
        if dir.is_absolute() { dir } else { base.join(dir) }
    };
    (
        resolve("price_dir", DEFAULT_PRICE_DIR),
        resolve("signal_dir", DEFAULT_SIGNAL_DIR),
    )
}

fn run_backtest(
    config_path: &Path,
    output_path: Option<&Path>,
    symbols_override: Option<&str>,
) -> ExitCode {
    // Stage 1: Load and validate config
    let (adapter, config) = match resolve_config(config_path, symbols_override) {
        Ok(c) => c,
        Err(code) => return code,
    };

    // Stage 2: Wire adapters
    let (price_dir, signal_dir) = data_dirs(&adapter, config_path);
    eprintln!(
        "Backtesting {} symbols from {} to {} ({} model)",
        config.symbols.len(),
        config.start_date,
        config.end_date,
        config.model_type
    );
    let data_port = CsvAdapter::new(price_dir);
    let signal_port = CsvSignalAdapter::new(signal_dir, config.model_type.clone());

    // Stage 3: Run
    let result = try_run_portfolio_backtest(&data_port, &signal_port, &config);
    let exit = match &result {
        Ok(report) => {
            print_summary(report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            e.into()
        }
    };

    // Stage 4: Emit result
    let outcome = BacktestOutcome::from(result);
    match output_path {
        Some(path) => {
            if let Err(e) = JsonReportAdapter::new().write(&outcome, &path.display().to_string()) {
                eprintln!("error: failed to write report: {e}");
                return (&e).into();
            }
            eprintln!("Result written to {}", path.display());
        }
        None => match outcome.to_json_pretty() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        },
    }

    exit
}

fn print_summary(report: &BacktestReport) {
    let m = &report.portfolio_metrics;
    let s = &report.execution_summary;

    eprintln!("\nSymbols loaded: {}", report.symbols_loaded.join(", "));
    for skipped in &report.symbols_failed {
        eprintln!("  skipped {} ({}): {}", skipped.symbol, skipped.stage, skipped.reason);
    }

    eprintln!("\nTarget allocations:");
    for (symbol, weight) in report.target_allocations.iter() {
        eprintln!("  {:<10} {:>7.2}%", symbol, weight * 100.0);
    }

    eprintln!("\nPredictions:       {}", report.total_predictions);
    eprintln!("Executions:        {} ({} buys, {} sells)", s.total_executions, s.total_buys, s.total_sells);
    eprintln!("Rebalance events:  {}", s.rebalance_events);
    eprintln!("Costs:             {:.2}", s.total_commission + s.total_slippage);

    eprintln!("\nFinal equity:      {:.2}", report.final_equity);
    eprintln!("Total return:      {:.2}%", m.total_return * 100.0);
    eprintln!("Annual return:     {:.2}%", m.annual_return * 100.0);
    eprintln!("Sharpe ratio:      {:.3}", m.sharpe_ratio);
    eprintln!("Max drawdown:      {:.2}%", m.max_drawdown * 100.0);
    eprintln!("Win rate:          {:.1}%", m.win_rate * 100.0);
    eprintln!("Effective bets:    {:.2}", report.diversification.effective_bets);

    if !report.diagnostics.is_empty() {
        eprintln!("\n{} diagnostics (see result JSON)", report.diagnostics.len());
    }
}

pub fn run_dry_run(config_path: &Path, symbols_override: Option<&str>) -> ExitCode {
    let (adapter, config) = match resolve_config(config_path, symbols_override) {
        Ok(c) => c,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");

    let (price_dir, signal_dir) = data_dirs(&adapter, config_path);

    eprintln!("\nUniverse:");
    eprintln!("  symbols: {}", config.symbols.join(", "));
    eprintln!("  window:  {} to {}", config.start_date, config.end_date);
    eprintln!("  history: from {} ({} lookback days)", config.data_start_date(), config.lookback_days);

    eprintln!("\nModel:");
    eprintln!("  model_type:           {}", config.model_type);
    eprintln!("  prediction_frequency: {}", config.prediction_frequency);
    eprintln!("  confidence_threshold: {}", config.confidence_threshold);

    eprintln!("\nPortfolio:");
    eprintln!("  initial_capital:     {}", config.initial_capital);
    eprintln!("  allocation_strategy: {}", config.allocation_strategy.name());
    eprintln!("  rebalance_frequency: {}", config.rebalance_frequency);
    eprintln!("  commission_rate:     {}", config.commission_rate);
    eprintln!("  slippage_rate:       {}", config.slippage_rate);

    eprintln!("\nData:");
    eprintln!("  price_dir:  {}", price_dir.display());
    eprintln!("  signal_dir: {}", signal_dir.display());

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    match resolve_config(config_path, None) {
        Ok((_, config)) => {
            eprintln!(
                "Configuration is valid: {} symbols, {} allocation",
                config.symbols.len(),
                config.allocation_strategy.name()
            );
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}
