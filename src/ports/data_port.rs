//! Historical price data port.

use crate::domain::error::MultitraderError;
use crate::domain::prices::PricePoint;
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Per-symbol outcome of a bulk load.
pub type SymbolLoads = BTreeMap<String, Result<Vec<PricePoint>, MultitraderError>>;

pub trait DataPort: Send + Sync {
    /// Bars for `symbol` dated within `[start_date, end_date]`, oldest first.
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        interval: &str,
        use_cache: bool,
    ) -> Result<Vec<PricePoint>, MultitraderError>;

    /// Fetch every symbol in parallel. One symbol failing never affects another.
    fn load_multiple_symbols(
        &self,
        symbols: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
        interval: &str,
        use_cache: bool,
    ) -> SymbolLoads {
        symbols
            .par_iter()
            .map(|symbol| {
                let bars = self.fetch_prices(symbol, start_date, end_date, interval, use_cache);
                (symbol.clone(), bars)
            })
            .collect()
    }
}
