//! Price data access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::RotatorError;

/// A source of historical price series, one per symbol.
///
/// Implementations filter out unusable rows themselves; what they return is
/// sorted by strictly increasing timestamp.
pub trait PriceSource {
    fn fetch_prices(&self, symbol: &str) -> Result<Vec<Bar>, RotatorError>;

    fn list_symbols(&self) -> Result<Vec<String>, RotatorError>;
}
