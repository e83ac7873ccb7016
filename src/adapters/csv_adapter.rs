//! CSV file price source.
//!
//! One file per symbol, `<data_dir>/<SYMBOL>.csv`, with a header row. The
//! timestamp is the first column; the price is the column named `close` or
//! `price`. Other columns are ignored.

use crate::domain::bar::{Bar, validate_series};
use crate::domain::error::RotatorError;
use crate::ports::data_port::PriceSource;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvPriceSource {
    base_path: PathBuf,
}

impl CsvPriceSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, RFC 3339 (converted
/// to UTC) or a bare date at midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl PriceSource for CsvPriceSource {
    fn fetch_prices(&self, symbol: &str) -> Result<Vec<Bar>, RotatorError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| RotatorError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = rdr.headers().map_err(|e| RotatorError::Data {
            reason: format!("CSV header error in {}: {}", path.display(), e),
        })?;
        let price_col = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("close"))
            .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case("price")))
            .ok_or_else(|| RotatorError::Data {
                reason: format!("{} has no close or price column", path.display()),
            })?;

        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| RotatorError::Data {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let line = row + 2;

            let Some(timestamp) = record.get(0).and_then(parse_timestamp) else {
                warn!(symbol, line, "skipping row with unparseable timestamp");
                continue;
            };

            let price = record
                .get(price_col)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(f64::NAN);
            let bar = Bar::new(timestamp, price);
            if !bar.has_valid_price() {
                warn!(symbol, line, price, "skipping row with invalid price");
                continue;
            }

            bars.push(bar);
        }

        bars.sort_by_key(|b| b.timestamp);

        // Duplicate timestamps: the later row wins.
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }
        validate_series(symbol, &deduped)?;
        Ok(deduped)
    }

    fn list_symbols(&self) -> Result<Vec<String>, RotatorError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| RotatorError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| RotatorError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(symbol) = name_str.strip_suffix(".csv") {
                if !symbol.is_empty() {
                    symbols.push(symbol.to_string());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
