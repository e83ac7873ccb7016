//! Decision policy interface and configuration-driven construction.
//!
//! A policy is a capability, not a base class: anything implementing
//! [`DecisionPolicy`] can drive a backtest. Concrete policies are picked by
//! [`PolicyKind`] from configuration and built fresh for every run.

pub mod buy_and_hold;
pub mod momentum;

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

use super::error::RotatorError;
use super::portfolio::Portfolio;
use super::trade::OrderSide;

pub use buy_and_hold::{BuyAndHold, BuyAndHoldParams};
pub use momentum::{MomentumParams, MomentumRotator};

/// Everything a policy may look at for one bar. The window ends at the
/// current bar; later prices are never visible.
#[derive(Debug, Clone, Copy)]
pub struct MarketSnapshot<'a> {
    pub symbol: &'a str,
    /// Recent prices, oldest first, newest (current) last.
    pub prices: &'a [f64],
    pub current_price: f64,
    pub timestamp: NaiveDateTime,
    pub portfolio: &'a Portfolio,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Hold { reason: String },
    Buy { size: f64, reason: String },
    Sell { size: f64, reason: String },
}

impl Decision {
    pub fn hold(reason: impl Into<String>) -> Self {
        Decision::Hold {
            reason: reason.into(),
        }
    }

    pub fn buy(size: f64, reason: impl Into<String>) -> Self {
        Decision::Buy {
            size,
            reason: reason.into(),
        }
    }

    pub fn sell(size: f64, reason: impl Into<String>) -> Self {
        Decision::Sell {
            size,
            reason: reason.into(),
        }
    }

    pub fn side(&self) -> Option<OrderSide> {
        match self {
            Decision::Hold { .. } => None,
            Decision::Buy { .. } => Some(OrderSide::Buy),
            Decision::Sell { .. } => Some(OrderSide::Sell),
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            Decision::Hold { .. } => 0.0,
            Decision::Buy { size, .. } | Decision::Sell { size, .. } => *size,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Decision::Hold { reason }
            | Decision::Buy { reason, .. }
            | Decision::Sell { reason, .. } => reason,
        }
    }

    /// A buy or sell with a finite, strictly positive size.
    pub fn is_actionable(&self) -> bool {
        let size = self.size();
        self.side().is_some() && size.is_finite() && size > 0.0
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Hold { reason } => write!(f, "hold ({reason})"),
            Decision::Buy { size, reason } => write!(f, "buy {size:.6} ({reason})"),
            Decision::Sell { size, reason } => write!(f, "sell {size:.6} ({reason})"),
        }
    }
}

pub trait DecisionPolicy {
    fn name(&self) -> &str;

    /// Produce the decision for the current bar.
    fn decide(&mut self, snapshot: &MarketSnapshot<'_>) -> Decision;

    /// Called once, right after an order this policy emitted has executed.
    /// Never called for discarded or expired orders.
    fn on_fill(&mut self, decision: &Decision, price: f64, size: f64, timestamp: NaiveDateTime);

    /// Clear all internal state before a fresh run.
    fn reset(&mut self);
}

impl<P: DecisionPolicy + ?Sized> DecisionPolicy for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn decide(&mut self, snapshot: &MarketSnapshot<'_>) -> Decision {
        (**self).decide(snapshot)
    }

    fn on_fill(&mut self, decision: &Decision, price: f64, size: f64, timestamp: NaiveDateTime) {
        (**self).on_fill(decision, price, size, timestamp)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Tracks an emitted order the policy has not yet seen fill.
///
/// Discards and expiries are never reported back, so the flag lapses on its
/// own after `timeout` bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AwaitFill {
    side: Option<OrderSide>,
    bars_waiting: usize,
}

impl AwaitFill {
    pub(crate) fn arm(&mut self, side: OrderSide) {
        self.side = Some(side);
        self.bars_waiting = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.side.is_some()
    }

    /// Counts one more bar of waiting. Returns false once nothing is pending
    /// or the timeout has lapsed.
    pub(crate) fn is_waiting(&mut self, timeout: usize) -> bool {
        if self.side.is_none() {
            return false;
        }
        self.bars_waiting += 1;
        if self.bars_waiting > timeout {
            self.clear();
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    MomentumRotator,
    BuyAndHold,
}

impl FromStr for PolicyKind {
    type Err = RotatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "momentum_rotator" | "momentum" => Ok(PolicyKind::MomentumRotator),
            "buy_and_hold" | "buyhold" => Ok(PolicyKind::BuyAndHold),
            other => Err(RotatorError::UnknownPolicy {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::MomentumRotator => write!(f, "momentum_rotator"),
            PolicyKind::BuyAndHold => write!(f, "buy_and_hold"),
        }
    }
}

/// Typed `[strategy]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub kind: PolicyKind,
    pub momentum: MomentumParams,
    pub buy_and_hold: BuyAndHoldParams,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            kind: PolicyKind::MomentumRotator,
            momentum: MomentumParams::default(),
            buy_and_hold: BuyAndHoldParams::default(),
        }
    }
}

impl StrategyParams {
    /// Build a fresh policy instance. The target exposure is capped at
    /// `max_position_fraction` so the policy never aims above what the
    /// execution engine will fill.
    pub fn build(&self, max_position_fraction: f64) -> Box<dyn DecisionPolicy + Send> {
        match self.kind {
            PolicyKind::MomentumRotator => {
                let mut params = self.momentum.clone();
                params.max_position_pct = params.max_position_pct.min(max_position_fraction);
                Box::new(MomentumRotator::new(params))
            }
            PolicyKind::BuyAndHold => {
                let mut params = self.buy_and_hold.clone();
                params.max_position_pct = params.max_position_pct.min(max_position_fraction);
                Box::new(BuyAndHold::new(params))
            }
        }
    }
}
