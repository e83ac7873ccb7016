//! Domain error types.
//!
//! Simulation defects (oversell, negative cash, lot shortfall) indicate a bug
//! in upstream size clamping and abort the run. Degenerate orders never reach
//! this type: the execution engine discards them silently.

use chrono::NaiveDateTime;

/// Top-level error type for rotator.
#[derive(Debug, thiserror::Error)]
pub enum RotatorError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown decision policy: {name}")]
    UnknownPolicy { name: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("empty price series for {symbol}")]
    EmptySeries { symbol: String },

    #[error("invalid price {price} for {symbol} at bar {index}")]
    InvalidPrice {
        symbol: String,
        index: usize,
        price: f64,
    },

    #[error(
        "timestamps must be strictly increasing for {symbol}: bar {index} at {current} follows {previous}"
    )]
    NonMonotonicTimestamp {
        symbol: String,
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("ledger size must be positive and finite, got {size}")]
    InvalidOrderSize { size: f64 },

    #[error("buy requires {required:.8} cash but only {available:.8} is available")]
    InsufficientCash { required: f64, available: f64 },

    #[error("sell of {requested:.8} exceeds held quantity {held:.8}")]
    Oversell { requested: f64, held: f64 },

    #[error("lot tracker asked to close {requested:.8} but only {available:.8} is open")]
    LotShortfall { requested: f64, available: f64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RotatorError {
    /// True for errors raised by the ledger or lot tracker, which mean the
    /// clamping logic upstream let an impossible order through.
    pub fn is_caller_defect(&self) -> bool {
        matches!(
            self,
            RotatorError::InvalidOrderSize { .. }
                | RotatorError::InsufficientCash { .. }
                | RotatorError::Oversell { .. }
                | RotatorError::LotShortfall { .. }
        )
    }
}

impl From<&RotatorError> for std::process::ExitCode {
    fn from(err: &RotatorError) -> Self {
        let code: u8 = match err {
            RotatorError::Io(_) => 1,
            RotatorError::ConfigParse { .. }
            | RotatorError::ConfigMissing { .. }
            | RotatorError::ConfigInvalid { .. } => 2,
            RotatorError::Data { .. }
            | RotatorError::EmptySeries { .. }
            | RotatorError::InvalidPrice { .. }
            | RotatorError::NonMonotonicTimestamp { .. } => 3,
            RotatorError::UnknownPolicy { .. } => 4,
            RotatorError::InvalidOrderSize { .. }
            | RotatorError::InsufficientCash { .. }
            | RotatorError::Oversell { .. }
            | RotatorError::LotShortfall { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
