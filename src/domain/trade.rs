//! Executed-order records.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// A closed (sold) tranche. Only sells produce trades: a buy has no realized
/// P&L until it is closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub price: f64,
    pub timestamp: NaiveDateTime,
    /// FIFO realized P&L, gross of fees.
    pub realized_pnl: f64,
    /// Fee charged on this sell.
    pub fee: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.realized_pnl > 0.0
    }
}
