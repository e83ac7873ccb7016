//! Report generation port trait.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RotatorError;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), RotatorError>;

    /// Default implementation: writes each result on its own.
    fn write_multi(&self, results: &[BacktestResult], output_dir: &Path) -> Result<(), RotatorError> {
        for result in results {
            self.write(result, output_dir)?;
        }
        Ok(())
    }
}
