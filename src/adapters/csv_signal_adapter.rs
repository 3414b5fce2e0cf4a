//! CSV replay of a pre-computed walk-forward prediction stream.
//!
//! Files live at `<base>/<SYMBOL>_<model_type>.csv`, or `<base>/<SYMBOL>.csv`
//! when no model-specific file exists. Columns:
//! `timestamp,prediction,confidence[,current_price]`.
//!
//! Windowing, ordering and resampling here use the provider's wall clock.
//! Offsets are left for timestamp alignment to interpret.

use crate::domain::config::PredictionFrequency;
use crate::domain::error::MultitraderError;
use crate::domain::prices::PricePoint;
use crate::domain::signal::{Prediction, RawSignal, RawTimestamp, is_valid_confidence};
use crate::ports::signal_port::SignalPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

pub struct CsvSignalAdapter {
    base_path: PathBuf,
    model_type: String,
}

impl CsvSignalAdapter {
    pub fn new(base_path: PathBuf, model_type: impl Into<String>) -> Self {
        Self {
            base_path,
            model_type: model_type.into(),
        }
    }

    fn resolve_path(&self, symbol: &str) -> Option<PathBuf> {
        [
            self.base_path.join(format!("{symbol}_{}.csv", self.model_type)),
            self.base_path.join(format!("{symbol}.csv")),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    fn error(symbol: &str, reason: String) -> MultitraderError {
        MultitraderError::SignalGeneration {
            symbol: symbol.to_string(),
            reason,
        }
    }

    fn parse_row(symbol: &str, record: &csv::StringRecord) -> Result<RawSignal, MultitraderError> {
        let column = |idx: usize, name: &str| {
            record
                .get(idx)
                .map(str::trim)
                .ok_or_else(|| Self::error(symbol, format!("missing {name} column")))
        };

        let ts_str = column(0, "timestamp")?;
        let timestamp = RawTimestamp::parse(ts_str)
            .ok_or_else(|| Self::error(symbol, format!("invalid timestamp '{ts_str}'")))?;

        let prediction: Prediction = column(1, "prediction")?
            .parse()
            .map_err(|e: MultitraderError| Self::error(symbol, e.to_string()))?;

        let conf_str = column(2, "confidence")?;
        let confidence: f64 = conf_str
            .parse()
            .map_err(|e| Self::error(symbol, format!("invalid confidence '{conf_str}': {e}")))?;
        if !is_valid_confidence(confidence) {
            return Err(Self::error(
                symbol,
                format!("confidence {confidence} outside [0, 1]"),
            ));
        }

        let current_price = match record.get(3).map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(s) => Some(
                s.parse::<f64>()
                    .map_err(|e| Self::error(symbol, format!("invalid current_price '{s}': {e}")))?,
            ),
        };

        Ok(RawSignal {
            timestamp,
            prediction,
            confidence,
            current_price,
        })
    }
}

/// Keep the first prediction of each period. Daily streams pass through.
fn resample(
    rows: Vec<(NaiveDateTime, RawSignal)>,
    frequency: PredictionFrequency,
) -> Vec<RawSignal> {
    if frequency == PredictionFrequency::Daily {
        return rows.into_iter().map(|(_, s)| s).collect();
    }
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|(ts, _)| seen.insert(frequency.period_key(ts.date())))
        .map(|(_, s)| s)
        .collect()
}

impl SignalPort for CsvSignalAdapter {
    fn walk_forward_backtest(
        &self,
        symbol: &str,
        data: &[PricePoint],
        start_date: NaiveDate,
        end_date: NaiveDate,
        prediction_frequency: PredictionFrequency,
        lookback_days: u32,
    ) -> Result<Vec<RawSignal>, MultitraderError> {
        let path = self.resolve_path(symbol).ok_or_else(|| {
            Self::error(
                symbol,
                format!(
                    "no prediction file for model '{}' in {}",
                    self.model_type,
                    self.base_path.display()
                ),
            )
        })?;
        tracing::debug!(symbol, path = %path.display(), lookback_days, "replaying predictions");

        let content = fs::read_to_string(&path)
            .map_err(|e| Self::error(symbol, format!("failed to read {}: {e}", path.display())))?;

        // A prediction cannot precede the history it was made from.
        let first_bar = data.first().map(|b| b.timestamp);

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| Self::error(symbol, format!("CSV parse error: {e}")))?;
            let signal = Self::parse_row(symbol, &record)?;
            let ts = signal.timestamp.wall_clock();

            let date = ts.date();
            if date < start_date || date > end_date {
                continue;
            }
            if first_bar.is_some_and(|first| ts < first) {
                tracing::debug!(symbol, timestamp = %ts, "prediction precedes price history, dropped");
                continue;
            }
            rows.push((ts, signal));
        }

        // Stable: rows sharing a timestamp keep file order.
        rows.sort_by_key(|(ts, _)| *ts);
        Ok(resample(rows, prediction_frequency))
    }
}
