//! Enter once after a short warm-up and never sell.

use chrono::NaiveDateTime;

use super::{AwaitFill, Decision, DecisionPolicy, MarketSnapshot};
use crate::domain::trade::OrderSide;

const EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct BuyAndHoldParams {
    pub warmup_bars: usize,
    pub max_position_pct: f64,
    pub fill_timeout_bars: usize,
}

impl Default for BuyAndHoldParams {
    fn default() -> Self {
        BuyAndHoldParams {
            warmup_bars: 1,
            max_position_pct: 0.55,
            fill_timeout_bars: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuyAndHold {
    params: BuyAndHoldParams,
    bars_seen: usize,
    await_fill: AwaitFill,
}

impl BuyAndHold {
    pub fn new(params: BuyAndHoldParams) -> Self {
        BuyAndHold {
            params,
            bars_seen: 0,
            await_fill: AwaitFill::default(),
        }
    }
}

impl DecisionPolicy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn decide(&mut self, snapshot: &MarketSnapshot<'_>) -> Decision {
        self.bars_seen += 1;

        if snapshot.portfolio.quantity() > EPS {
            return Decision::hold("holding");
        }
        if self.bars_seen < self.params.warmup_bars {
            return Decision::hold("warming_up");
        }
        if self.await_fill.is_waiting(self.params.fill_timeout_bars) {
            return Decision::hold("await_fill");
        }

        let price = snapshot.current_price.max(EPS);
        let equity = snapshot.portfolio.value(price);
        let size = (equity * self.params.max_position_pct / price)
            .min(snapshot.portfolio.cash() / price);
        if size <= EPS {
            return Decision::hold("insufficient_cash");
        }

        self.await_fill.arm(OrderSide::Buy);
        Decision::buy(size, "initial_entry")
    }

    fn on_fill(&mut self, _decision: &Decision, _price: f64, size: f64, _timestamp: NaiveDateTime) {
        if size > 0.0 {
            self.await_fill.clear();
        }
    }

    fn reset(&mut self) {
        self.bars_seen = 0;
        self.await_fill.clear();
    }
}
