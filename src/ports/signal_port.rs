//! Walk-forward prediction port.

use crate::domain::config::PredictionFrequency;
use crate::domain::error::MultitraderError;
use crate::domain::prices::PricePoint;
use crate::domain::signal::RawSignal;
use chrono::NaiveDate;

/// A predictive model run in walk-forward mode over one symbol's history.
///
/// Implementations are built for one model type. Each returned signal may only
/// depend on `data` dated at or before the signal's own timestamp.
pub trait SignalPort: Send + Sync {
    fn walk_forward_backtest(
        &self,
        symbol: &str,
        data: &[PricePoint],
        start_date: NaiveDate,
        end_date: NaiveDate,
        prediction_frequency: PredictionFrequency,
        lookback_days: u32,
    ) -> Result<Vec<RawSignal>, MultitraderError>;
}
