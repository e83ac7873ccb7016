//! Order queue and fill simulation.
//!
//! The engine holds at most one pending order. A decision taken at bar `i`
//! is scheduled for bar `i + execution_lag_bars` and fills at the first bar
//! whose index reaches that point, at that bar's price. Sizes are re-clamped
//! against the portfolio at fill time; an order that clamps to nothing is
//! discarded rather than treated as an error.

use chrono::NaiveDateTime;
use tracing::debug;

use super::bar::Bar;
use super::error::RotatorError;
use super::lots::LotTracker;
use super::policy::Decision;
use super::portfolio::Portfolio;
use super::trade::{OrderSide, Trade};

/// Orders that clamp to this size or below are discarded.
pub const MIN_ORDER_SIZE: f64 = 1e-12;

/// Execution frictions for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub execution_lag_bars: usize,
    pub fee_rate: f64,
    /// Largest fraction of pre-trade equity a single buy may spend.
    pub max_position_fraction: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            execution_lag_bars: 1,
            fee_rate: 0.001,
            max_position_fraction: 0.55,
        }
    }
}

/// Proportional fee on the traded notional.
pub fn calculate_fee(notional: f64, fee_rate: f64) -> f64 {
    notional * fee_rate
}

/// Largest buy the portfolio can carry at `price`: bounded by the request,
/// by cash net of fee, and by the position-fraction cap on equity.
pub fn clamp_buy_size(
    requested: f64,
    price: f64,
    portfolio: &Portfolio,
    config: &ExecutionConfig,
) -> f64 {
    let affordable = portfolio.cash() / (price * (1.0 + config.fee_rate));
    let capped = portfolio.value(price) * config.max_position_fraction / price;
    requested.min(affordable).min(capped)
}

/// Largest sell both the ledger and the open lots can cover.
pub fn clamp_sell_size(requested: f64, portfolio: &Portfolio, lots: &LotTracker) -> f64 {
    requested.min(portfolio.quantity()).min(lots.open_size())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub side: OrderSide,
    pub size: f64,
    pub scheduled_bar_index: usize,
    /// The decision that produced this order, handed back to the policy on fill.
    pub decision: Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued { scheduled_bar_index: usize },
    /// An order is already in flight; the decision had no effect.
    Dropped,
    /// Hold, or a non-positive/non-finite size.
    Ignored,
}

/// An executed order.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub side: OrderSide,
    pub size: f64,
    pub price: f64,
    pub fee: f64,
    pub timestamp: NaiveDateTime,
    pub decision: Decision,
    /// Present for sells only.
    pub trade: Option<Trade>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Idle,
    NotDue,
    Filled(Fill),
    Discarded { side: OrderSide, reason: &'static str },
}

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    symbol: String,
    config: ExecutionConfig,
    pending: Option<PendingOrder>,
    lots: LotTracker,
}

impl ExecutionEngine {
    pub fn new(symbol: impl Into<String>, config: ExecutionConfig) -> Self {
        ExecutionEngine {
            symbol: symbol.into(),
            config,
            pending: None,
            lots: LotTracker::new(),
        }
    }

    pub fn pending(&self) -> Option<&PendingOrder> {
        self.pending.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    pub fn lots(&self) -> &LotTracker {
        &self.lots
    }

    /// Queue a policy decision taken at `bar_index`.
    pub fn submit(&mut self, decision: &Decision, bar_index: usize) -> SubmitOutcome {
        let Some(side) = decision.side() else {
            return SubmitOutcome::Ignored;
        };
        if !decision.is_actionable() {
            return SubmitOutcome::Ignored;
        }
        if self.pending.is_some() {
            return SubmitOutcome::Dropped;
        }

        let scheduled_bar_index = bar_index + self.config.execution_lag_bars;
        self.pending = Some(PendingOrder {
            side,
            size: decision.size(),
            scheduled_bar_index,
            decision: decision.clone(),
        });
        SubmitOutcome::Queued {
            scheduled_bar_index,
        }
    }

    /// Fill the pending order if it is due at `bar_index`.
    ///
    /// Errors are ledger or lot defects and mean the clamping above let an
    /// impossible order through.
    pub fn execute_due(
        &mut self,
        bar_index: usize,
        bar: &Bar,
        portfolio: &mut Portfolio,
    ) -> Result<ExecutionOutcome, RotatorError> {
        match &self.pending {
            None => return Ok(ExecutionOutcome::Idle),
            Some(order) if bar_index < order.scheduled_bar_index => {
                return Ok(ExecutionOutcome::NotDue);
            }
            Some(_) => {}
        }
        let Some(order) = self.pending.take() else {
            return Ok(ExecutionOutcome::Idle);
        };

        let price = bar.price;
        if !price.is_finite() || price <= 0.0 {
            return Ok(self.discard(&order, "non_positive_price"));
        }

        match order.side {
            OrderSide::Buy => {
                let size = clamp_buy_size(order.size, price, portfolio, &self.config);
                if size <= MIN_ORDER_SIZE {
                    return Ok(self.discard(&order, "clamped_to_zero"));
                }
                let cost = size * price;
                let fee = calculate_fee(cost, self.config.fee_rate);
                portfolio.apply_buy(size, cost, fee)?;
                self.lots.add_lot(size, price);
                debug!(
                    symbol = %self.symbol,
                    bar = bar_index,
                    size,
                    price,
                    fee,
                    "buy filled"
                );
                Ok(ExecutionOutcome::Filled(Fill {
                    side: OrderSide::Buy,
                    size,
                    price,
                    fee,
                    timestamp: bar.timestamp,
                    decision: order.decision,
                    trade: None,
                }))
            }
            OrderSide::Sell => {
                let size = clamp_sell_size(order.size, portfolio, &self.lots);
                if size <= MIN_ORDER_SIZE {
                    return Ok(self.discard(&order, "nothing_held"));
                }
                let proceeds = size * price;
                let fee = calculate_fee(proceeds, self.config.fee_rate);
                let realized_pnl = self.lots.consume(size, price)?;
                // Closing the last lot closes the position: ledger and lots
                // must both end flat, whatever rounding each one saw.
                let ledger_size = if self.lots.is_empty() {
                    portfolio.quantity()
                } else {
                    size
                };
                portfolio.apply_sell(ledger_size, proceeds, fee)?;
                if portfolio.quantity() <= MIN_ORDER_SIZE {
                    self.lots.clear();
                }
                debug!(
                    symbol = %self.symbol,
                    bar = bar_index,
                    size,
                    price,
                    fee,
                    realized_pnl,
                    "sell filled"
                );
                let trade = Trade {
                    symbol: self.symbol.clone(),
                    side: OrderSide::Sell,
                    size,
                    price,
                    timestamp: bar.timestamp,
                    realized_pnl,
                    fee,
                };
                Ok(ExecutionOutcome::Filled(Fill {
                    side: OrderSide::Sell,
                    size,
                    price,
                    fee,
                    timestamp: bar.timestamp,
                    decision: order.decision,
                    trade: Some(trade),
                }))
            }
        }
    }

    /// Drop whatever is still queued. Used at the end of a series.
    pub fn discard_pending(&mut self) -> Option<PendingOrder> {
        self.pending.take()
    }

    fn discard(&self, order: &PendingOrder, reason: &'static str) -> ExecutionOutcome {
        debug!(
            symbol = %self.symbol,
            side = %order.side,
            size = order.size,
            reason,
            "order discarded"
        );
        ExecutionOutcome::Discarded {
            side: order.side,
            reason,
        }
    }
}
