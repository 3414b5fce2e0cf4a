//! Price history and as-of price lookup.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// One OHLCV bar for one symbol. Timestamps are canonical (see
/// [`crate::domain::timeline::canonicalize`]).
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Per-symbol price histories sorted by timestamp.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    series: BTreeMap<String, Vec<PricePoint>>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, mut bars: Vec<PricePoint>) {
        bars.sort_by_key(|b| b.timestamp);
        self.series.insert(symbol.to_string(), bars);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.series.keys()
    }

    pub fn bars(&self, symbol: &str) -> Option<&[PricePoint]> {
        self.series.get(symbol).map(Vec::as_slice)
    }

    /// Close of the latest bar at or before `at`. Never looks past `at`.
    pub fn price_as_of(&self, symbol: &str, at: NaiveDateTime) -> Option<f64> {
        let bars = self.series.get(symbol)?;
        let idx = bars.partition_point(|b| b.timestamp <= at);
        if idx == 0 {
            None
        } else {
            Some(bars[idx - 1].close)
        }
    }

    /// As-of closes for every symbol that has traded by `at`.
    pub fn prices_as_of(&self, at: NaiveDateTime) -> BTreeMap<String, f64> {
        self.series
            .keys()
            .filter_map(|symbol| {
                self.price_as_of(symbol, at)
                    .map(|price| (symbol.clone(), price))
            })
            .collect()
    }
}
