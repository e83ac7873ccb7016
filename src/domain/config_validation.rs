//! Configuration validation.
//!
//! Validates every `[backtest]` and `[strategy]` field before a run starts.
//! Missing keys fall back to defaults; present keys must be in range.

use crate::domain::error::RotatorError;
use crate::domain::policy::PolicyKind;
use crate::ports::config_port::ConfigPort;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    validate_starting_cash(config)?;
    validate_execution_lag(config)?;
    validate_fee_rate(config)?;
    validate_fraction(config, "backtest", "max_position_fraction", 0.55)?;
    validate_at_least(config, "backtest", "history_window", 200, 1)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let kind = validate_kind(config)?;
    validate_fraction(config, "strategy", "max_position_pct", 0.55)?;
    validate_at_least(config, "strategy", "fill_timeout_bars", 5, 0)?;

    match kind {
        PolicyKind::MomentumRotator => validate_momentum(config),
        PolicyKind::BuyAndHold => validate_at_least(config, "strategy", "warmup_bars", 1, 0),
    }
}

fn validate_starting_cash(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let value = config.get_double("backtest", "starting_cash", 10_000.0);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid("backtest", "starting_cash", "starting_cash must be positive"));
    }
    Ok(())
}

fn validate_execution_lag(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    validate_at_least(config, "backtest", "execution_lag_bars", 1, 0)
}

fn validate_fee_rate(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let value = config.get_double("backtest", "fee_rate", 0.001);
    if !value.is_finite() || value < 0.0 {
        return Err(invalid("backtest", "fee_rate", "fee_rate must be non-negative"));
    }
    Ok(())
}

fn validate_kind(config: &dyn ConfigPort) -> Result<PolicyKind, RotatorError> {
    match config.get_string("strategy", "kind") {
        None => Ok(PolicyKind::MomentumRotator),
        Some(s) if s.trim().is_empty() => Err(RotatorError::ConfigMissing {
            section: "strategy".to_string(),
            key: "kind".to_string(),
        }),
        Some(s) => s.parse(),
    }
}

fn validate_momentum(config: &dyn ConfigPort) -> Result<(), RotatorError> {
    let short_ma = config.get_int("strategy", "short_ma", 96);
    let long_ma = config.get_int("strategy", "long_ma", 336);
    if short_ma < 1 {
        return Err(invalid("strategy", "short_ma", "short_ma must be at least 1"));
    }
    if long_ma < short_ma {
        return Err(invalid(
            "strategy",
            "long_ma",
            "long_ma must not be shorter than short_ma",
        ));
    }
    validate_at_least(config, "strategy", "confirmation_bars", 3, 0)?;
    validate_at_least(config, "strategy", "lookback_for_peak", 336, 1)?;
    validate_fraction(config, "strategy", "max_drawdown_exit", 0.15)?;

    let threshold = config.get_double("strategy", "rebalance_threshold", 0.01);
    if !(0.0..1.0).contains(&threshold) {
        return Err(invalid(
            "strategy",
            "rebalance_threshold",
            "rebalance_threshold must be between 0 and 1",
        ));
    }
    let notional = config.get_double("strategy", "min_trade_notional", 200.0);
    if !notional.is_finite() || notional < 0.0 {
        return Err(invalid(
            "strategy",
            "min_trade_notional",
            "min_trade_notional must be non-negative",
        ));
    }
    Ok(())
}

/// A real in (0, 1].
fn validate_fraction(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<(), RotatorError> {
    let value = config.get_double(section, key, default);
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(section, key, &format!("{key} must be in (0, 1]")));
    }
    Ok(())
}

fn validate_at_least(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    min: i64,
) -> Result<(), RotatorError> {
    let value = config.get_int(section, key, default);
    if value < min {
        return Err(invalid(section, key, &format!("{key} must be at least {min}")));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> RotatorError {
    RotatorError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
