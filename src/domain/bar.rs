//! Price bar representation.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::error::RotatorError;

/// One sample of the price series. A sequence of bars is the unit of
/// simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub price: f64,
}

impl Bar {
    pub fn new(timestamp: NaiveDateTime, price: f64) -> Self {
        Bar { timestamp, price }
    }

    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Check a whole series up front: non-empty, positive finite prices,
/// strictly increasing timestamps.
pub fn validate_series(symbol: &str, bars: &[Bar]) -> Result<(), RotatorError> {
    if bars.is_empty() {
        return Err(RotatorError::EmptySeries {
            symbol: symbol.to_string(),
        });
    }

    let mut previous: Option<NaiveDateTime> = None;
    for (index, bar) in bars.iter().enumerate() {
        check_bar(symbol, index, bar, previous)?;
        previous = Some(bar.timestamp);
    }
    Ok(())
}

pub(crate) fn check_bar(
    symbol: &str,
    index: usize,
    bar: &Bar,
    previous: Option<NaiveDateTime>,
) -> Result<(), RotatorError> {
    if !bar.has_valid_price() {
        return Err(RotatorError::InvalidPrice {
            symbol: symbol.to_string(),
            index,
            price: bar.price,
        });
    }
    if let Some(prev) = previous {
        if bar.timestamp <= prev {
            return Err(RotatorError::NonMonotonicTimestamp {
                symbol: symbol.to_string(),
                index,
                previous: prev,
                current: bar.timestamp,
            });
        }
    }
    Ok(())
}
