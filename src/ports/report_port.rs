//! Report output port trait.

use crate::domain::error::MultitraderError;
use crate::domain::result::BacktestOutcome;

pub trait ReportPort {
    fn write(&self, outcome: &BacktestOutcome, output_path: &str) -> Result<(), MultitraderError>;
}
