//! JSON report adapter implementing ReportPort.

use std::fs;
use std::path::Path;

use crate::domain::error::MultitraderError;
use crate::domain::result::BacktestOutcome;
use crate::ports::report_port::ReportPort;

#[derive(Debug, Default)]
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, outcome: &BacktestOutcome, output_path: &str) -> Result<(), MultitraderError> {
        let json = outcome.to_json_pretty()?;

        if let Some(parent) = Path::new(output_path).parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, json + "\n")?;

        tracing::info!(path = output_path, success = outcome.is_success(), "report written");
        Ok(())
    }
}
