#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use multitrader::domain::config::{BacktestConfig, PredictionFrequency, RebalanceFrequency};
use multitrader::domain::error::MultitraderError;
pub use multitrader::domain::prices::PricePoint;
use multitrader::domain::signal::{Prediction, RawSignal, RawTimestamp};
use multitrader::ports::data_port::DataPort;
use multitrader::ports::signal_port::SignalPort;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<PricePoint>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        _interval: &str,
        _use_cache: bool,
    ) -> Result<Vec<PricePoint>, MultitraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(MultitraderError::Data {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| {
                        let d = b.timestamp.date();
                        d >= start_date && d <= end_date
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Replays fixed prediction streams and records the latest bar it was shown.
pub struct MockSignalPort {
    pub signals: HashMap<String, Vec<RawSignal>>,
    pub errors: HashMap<String, String>,
    pub latest_bar_seen: Mutex<HashMap<String, NaiveDateTime>>,
}

impl MockSignalPort {
    pub fn new() -> Self {
        Self {
            signals: HashMap::new(),
            errors: HashMap::new(),
            latest_bar_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_signals(mut self, symbol: &str, signals: Vec<RawSignal>) -> Self {
        self.signals.insert(symbol.to_string(), signals);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl SignalPort for MockSignalPort {
    fn walk_forward_backtest(
        &self,
        symbol: &str,
        data: &[PricePoint],
        _start_date: NaiveDate,
        _end_date: NaiveDate,
        _prediction_frequency: PredictionFrequency,
        _lookback_days: u32,
    ) -> Result<Vec<RawSignal>, MultitraderError> {
        if let Some(last) = data.last() {
            self.latest_bar_seen
                .lock()
                .unwrap()
                .insert(symbol.to_string(), last.timestamp);
        }
        if let Some(reason) = self.errors.get(symbol) {
            return Err(MultitraderError::SignalGeneration {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self.signals.get(symbol).cloned().unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn midnight(s: &str) -> NaiveDateTime {
    parse_date(s).and_hms_opt(0, 0, 0).unwrap()
}

pub fn make_bar(symbol: &str, date: &str, close: f64) -> PricePoint {
    PricePoint {
        symbol: symbol.to_string(),
        timestamp: midnight(date),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1000.0,
    }
}

/// One bar per calendar day from `start`, with closes taken from `closes`.
pub fn daily_bars(symbol: &str, start: &str, closes: &[f64]) -> Vec<PricePoint> {
    let first = parse_date(start);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let day = first + chrono::Duration::days(i as i64);
            make_bar(symbol, &day.format("%Y-%m-%d").to_string(), close)
        })
        .collect()
}

/// A flat series at `close` covering every calendar day in `[start, end]`.
pub fn flat_bars(symbol: &str, start: &str, end: &str, close: f64) -> Vec<PricePoint> {
    let days = (parse_date(end) - parse_date(start)).num_days() + 1;
    daily_bars(symbol, start, &vec![close; days as usize])
}

pub fn make_signal(date: &str, prediction: Prediction, confidence: f64, price: Option<f64>) -> RawSignal {
    RawSignal {
        timestamp: RawTimestamp::Naive(midnight(date)),
        prediction,
        confidence,
        current_price: price,
    }
}

pub fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Defaults with zero lookback and no rebalancing, so scenarios control every trade.
pub fn sample_config(list: &[&str], start: &str, end: &str) -> BacktestConfig {
    let mut config = BacktestConfig::new(symbols(list), parse_date(start), parse_date(end));
    config.lookback_days = 0;
    config.rebalance_frequency = RebalanceFrequency::Never;
    config
}
