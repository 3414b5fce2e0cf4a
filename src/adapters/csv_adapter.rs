//! CSV file price data adapter.
//!
//! One file per symbol, `<base>/<SYMBOL>.csv`, with a header row and the
//! columns `timestamp,open,high,low,close,volume`.

use crate::domain::error::MultitraderError;
use crate::domain::prices::PricePoint;
use crate::domain::signal::RawTimestamp;
use crate::domain::timeline::canonicalize;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }
}

fn field(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    symbol: &str,
) -> Result<f64, MultitraderError> {
    record
        .get(index)
        .ok_or_else(|| MultitraderError::Data {
            symbol: symbol.to_string(),
            reason: format!("missing {name} column"),
        })?
        .trim()
        .parse()
        .map_err(|e| MultitraderError::Data {
            symbol: symbol.to_string(),
            reason: format!("invalid {name} value: {e}"),
        })
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        interval: &str,
        use_cache: bool,
    ) -> Result<Vec<PricePoint>, MultitraderError> {
        tracing::debug!(symbol, interval, use_cache, "reading price csv");

        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| MultitraderError::Data {
            symbol: symbol.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| MultitraderError::Data {
                symbol: symbol.to_string(),
                reason: format!("CSV parse error: {e}"),
            })?;

            let ts_str = record.get(0).ok_or_else(|| MultitraderError::Data {
                symbol: symbol.to_string(),
                reason: "missing timestamp column".into(),
            })?;
            let timestamp = RawTimestamp::parse(ts_str)
                .map(canonicalize)
                .ok_or_else(|| MultitraderError::Data {
                    symbol: symbol.to_string(),
                    reason: format!("invalid timestamp '{ts_str}'"),
                })?;

            let date = timestamp.date();
            if date < start_date || date > end_date {
                continue;
            }

            bars.push(PricePoint {
                symbol: symbol.to_string(),
                timestamp,
                open: field(&record, 1, "open", symbol)?,
                high: field(&record, 2, "high", symbol)?,
                low: field(&record, 3, "low", symbol)?,
                close: field(&record, 4, "close", symbol)?,
                volume: field(&record, 5, "volume", symbol)?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "timestamp,open,high,low,close,volume\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000.5\n";
        fs::write(path.join("AAPL.csv"), csv_content).unwrap();

        fs::write(
            path.join("BTC-USD.csv"),
            "timestamp,open,high,low,close,volume\n\
             2024-01-15T23:00:00-02:00,1,1,1,42000,1\n",
        )
        .unwrap();

        fs::write(
            path.join("BAD.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15,1,1,1,abc,1\n",
        )
        .unwrap();

        (dir, path)
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn fetch_prices_returns_sorted_bars() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch_prices("AAPL", d(15), d(17), "1d", true).unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].timestamp.date(), d(15));
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].high, 110.0);
        assert_eq!(bars[0].low, 90.0);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[1].volume, 60000.5);
        assert_eq!(bars[2].close, 115.0);
    }

    #[test]
    fn fetch_prices_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch_prices("AAPL", d(16), d(16), "1d", true).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp.date(), d(16));
    }

    #[test]
    fn zoned_timestamps_are_canonicalized_to_utc() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch_prices("BTC-USD", d(1), d(31), "1d", false).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp.date(), d(16));
        assert_eq!(bars[0].timestamp.hour(), 1);
    }

    #[test]
    fn missing_file_is_data_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let err = adapter.fetch_prices("XYZ", d(1), d(31), "1d", true).unwrap_err();
        assert!(matches!(err, MultitraderError::Data { ref symbol, .. } if symbol == "XYZ"));
    }

    #[test]
    fn malformed_value_is_data_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert!(adapter.fetch_prices("BAD", d(1), d(31), "1d", true).is_err());
    }

    #[test]
    fn load_multiple_symbols_keeps_each_result() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let symbols = vec!["AAPL".to_string(), "XYZ".to_string()];
        let loads = adapter.load_multiple_symbols(&symbols, d(1), d(31), "1d", true);
        assert_eq!(loads.len(), 2);
        assert!(loads["AAPL"].is_ok());
        assert!(loads["XYZ"].is_err());
    }
}
