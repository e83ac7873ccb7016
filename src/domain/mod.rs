//! Core domain types and simulation logic.

pub mod bar;
pub mod portfolio;
pub mod lots;
pub mod trade;
pub mod execution;
pub mod policy;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
