//! CSV report adapter implementing ReportPort.
//!
//! Per symbol: `<SYMBOL>_trades.csv` and `<SYMBOL>_equity.csv`. For a
//! multi-symbol run, `summary.csv` with one row per symbol.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RotatorError;
use crate::domain::metrics::Metrics;
use crate::ports::report_port::ReportPort;

pub struct CsvReportWriter;

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    symbol: &'a str,
    starting_cash: f64,
    final_equity: f64,
    total_return: f64,
    max_drawdown: f64,
    max_drawdown_duration: usize,
    trades: usize,
    win_rate: f64,
    realized_pnl: f64,
    total_fees: f64,
    profit_factor: f64,
    orders_filled: usize,
    orders_discarded: usize,
    decisions_dropped: usize,
    orders_expired: usize,
}

impl<'a> SummaryRow<'a> {
    fn from_result(result: &'a BacktestResult) -> Self {
        let metrics = Metrics::compute(result);
        SummaryRow {
            symbol: &result.symbol,
            starting_cash: result.starting_cash,
            final_equity: result.final_equity,
            total_return: result.total_return,
            max_drawdown: result.max_drawdown,
            max_drawdown_duration: metrics.max_drawdown_duration,
            trades: result.trade_count(),
            win_rate: metrics.win_rate,
            realized_pnl: metrics.realized_pnl,
            total_fees: result.total_fees,
            profit_factor: metrics.profit_factor,
            orders_filled: result.stats.orders_filled,
            orders_discarded: result.stats.orders_discarded,
            decisions_dropped: result.stats.decisions_dropped,
            orders_expired: result.stats.orders_expired,
        }
    }
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), RotatorError> {
    let csv_error = |e: csv::Error| RotatorError::Data {
        reason: format!("failed to write {}: {}", path.display(), e),
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

impl ReportPort for CsvReportWriter {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), RotatorError> {
        fs::create_dir_all(output_dir)?;

        // A header-only file still needs a row type, so an empty trade list
        // gets its header written by hand.
        let trades_path = output_dir.join(format!("{}_trades.csv", result.symbol));
        if result.trades.is_empty() {
            fs::write(
                &trades_path,
                "symbol,side,size,price,timestamp,realized_pnl,fee\n",
            )?;
        } else {
            write_rows(&trades_path, &result.trades)?;
        }

        let equity_path = output_dir.join(format!("{}_equity.csv", result.symbol));
        write_rows(&equity_path, &result.equity_curve)?;
        Ok(())
    }

    fn write_multi(&self, results: &[BacktestResult], output_dir: &Path) -> Result<(), RotatorError> {
        for result in results {
            self.write(result, output_dir)?;
        }
        write_rows(
            &output_dir.join("summary.csv"),
            results.iter().map(SummaryRow::from_result),
        )
    }
}
