//! Momentum rotator: long while the short moving average leads the long one,
//! out on a deep drawdown or a break below the long average.

use chrono::NaiveDateTime;
use std::collections::VecDeque;

use super::{AwaitFill, Decision, DecisionPolicy, MarketSnapshot};
use crate::domain::trade::OrderSide;

const EPS: f64 = 1e-12;

/// Minimum buffered bars before any decision is made.
const WARMUP_BARS: usize = 24;

/// Before `long_ma` bars exist, an uptrend means this many bars of momentum...
const WARMUP_MOMENTUM_BARS: usize = 96;
/// ...with at least this gain.
const WARMUP_MOMENTUM_GAIN: f64 = 0.04;

/// Exit when price falls this far under the long average.
const LONG_MA_EXIT_RATIO: f64 = 0.95;

/// Extra room kept in the close buffer beyond the longest lookback.
const BUFFER_SLACK: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumParams {
    pub short_ma: usize,
    pub long_ma: usize,
    /// Consecutive uptrend bars required before entering from flat.
    ///
    /// Entry from flat is gated on this count, and the count also advances
    /// during warm-up. This is a deliberate tightening over entering on the
    /// first uptrend bar; 0 disables the gate.
    pub confirmation_bars: usize,
    pub max_drawdown_exit: f64,
    pub lookback_for_peak: usize,
    pub rebalance_threshold: f64,
    pub max_position_pct: f64,
    pub min_trade_notional: f64,
    /// Bars to wait for a fill before assuming the order was discarded.
    pub fill_timeout_bars: usize,
}

impl Default for MomentumParams {
    fn default() -> Self {
        MomentumParams {
            short_ma: 96,
            long_ma: 336,
            confirmation_bars: 3,
            max_drawdown_exit: 0.15,
            lookback_for_peak: 336,
            rebalance_threshold: 0.01,
            max_position_pct: 0.55,
            min_trade_notional: 200.0,
            fill_timeout_bars: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MomentumRotator {
    params: MomentumParams,
    closes: VecDeque<f64>,
    capacity: usize,
    last_timestamp: Option<NaiveDateTime>,
    await_fill: AwaitFill,
    bars_in_uptrend: usize,
}

impl MomentumRotator {
    pub fn new(params: MomentumParams) -> Self {
        let capacity = params.long_ma.max(params.lookback_for_peak) + BUFFER_SLACK;
        MomentumRotator {
            params,
            closes: VecDeque::with_capacity(capacity),
            capacity,
            last_timestamp: None,
            await_fill: AwaitFill::default(),
            bars_in_uptrend: 0,
        }
    }

    pub fn params(&self) -> &MomentumParams {
        &self.params
    }

    pub fn buffered(&self) -> usize {
        self.closes.len()
    }

    fn push_close(&mut self, close: f64) {
        if !(close.is_finite() && close > 0.0) {
            return;
        }
        if self.closes.len() == self.capacity {
            self.closes.pop_front();
        }
        self.closes.push_back(close);
    }

    /// Seed from the whole window on the first bar, then append one close per
    /// new timestamp. A repeated timestamp is ignored.
    fn update_buffer(&mut self, snapshot: &MarketSnapshot<'_>) {
        if self.closes.is_empty() && !snapshot.prices.is_empty() {
            for &price in snapshot.prices {
                self.push_close(price);
            }
            self.last_timestamp = Some(snapshot.timestamp);
            return;
        }

        if let Some(last) = self.last_timestamp {
            if snapshot.timestamp <= last {
                return;
            }
        }

        self.push_close(snapshot.current_price);
        self.last_timestamp = Some(snapshot.timestamp);
    }

    fn sma(&self, period: usize) -> f64 {
        let n = self.closes.len();
        if n == 0 || period == 0 {
            return 0.0;
        }
        let take = period.min(n);
        self.closes.iter().skip(n - take).sum::<f64>() / take as f64
    }

    fn last_close(&self) -> f64 {
        self.closes.back().copied().unwrap_or(0.0)
    }

    /// Evaluates the trend and advances the consecutive-uptrend counter.
    fn in_uptrend(&mut self) -> bool {
        let n = self.closes.len();
        let is_uptrend = if n < self.params.long_ma {
            if n < WARMUP_MOMENTUM_BARS {
                false
            } else {
                let first = self.closes[n - WARMUP_MOMENTUM_BARS];
                first > 0.0 && self.last_close() / first - 1.0 > WARMUP_MOMENTUM_GAIN
            }
        } else {
            let price = self.last_close();
            let short = self.sma(self.params.short_ma);
            let long = self.sma(self.params.long_ma);
            short > long && price > short
        };

        if is_uptrend {
            self.bars_in_uptrend += 1;
        } else {
            self.bars_in_uptrend = 0;
        }
        is_uptrend
    }

    fn drawdown_exit(&self) -> bool {
        let n = self.closes.len();
        if n < self.params.lookback_for_peak {
            return false;
        }

        let current = self.last_close();
        if n >= self.params.long_ma && current < self.sma(self.params.long_ma) * LONG_MA_EXIT_RATIO {
            return true;
        }

        let peak = self
            .closes
            .iter()
            .skip(n - self.params.lookback_for_peak)
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if peak <= 0.0 {
            return false;
        }
        (peak - current) / peak >= self.params.max_drawdown_exit
    }
}

impl DecisionPolicy for MomentumRotator {
    fn name(&self) -> &str {
        "momentum_rotator"
    }

    fn decide(&mut self, snapshot: &MarketSnapshot<'_>) -> Decision {
        self.update_buffer(snapshot);

        if self.closes.len() < WARMUP_BARS {
            return Decision::hold("warming_up");
        }

        if self.await_fill.is_waiting(self.params.fill_timeout_bars) {
            return Decision::hold("await_fill");
        }

        let portfolio = snapshot.portfolio;
        let price = self.last_close();
        let equity = portfolio.value(price).max(EPS);
        let current_pct = portfolio.quantity() * price / equity;
        let holding = portfolio.quantity() > EPS;

        let target_pct = if self.in_uptrend() {
            if holding || self.bars_in_uptrend >= self.params.confirmation_bars {
                self.params.max_position_pct
            } else {
                0.0
            }
        } else if holding && !self.drawdown_exit() {
            self.params.max_position_pct
        } else {
            0.0
        };

        let diff_pct = target_pct - current_pct;
        if diff_pct.abs() < self.params.rebalance_threshold {
            return Decision::hold("within_band");
        }

        let trade_notional = diff_pct.abs() * equity;
        if trade_notional < self.params.min_trade_notional {
            return Decision::hold("notional_floor");
        }

        let size = trade_notional / price.max(EPS);

        if diff_pct > 0.0 {
            let affordable = portfolio.cash() / price.max(EPS);
            let size = size.min(affordable);
            if size <= EPS {
                return Decision::hold("insufficient_cash");
            }
            self.await_fill.arm(OrderSide::Buy);
            return Decision::buy(size, "uptrend_entry");
        }

        let size = size.min(portfolio.quantity());
        if size <= EPS {
            return Decision::hold("no_position");
        }
        self.await_fill.arm(OrderSide::Sell);
        Decision::sell(size, "trend_exit")
    }

    fn on_fill(&mut self, _decision: &Decision, _price: f64, size: f64, _timestamp: NaiveDateTime) {
        if size <= 0.0 {
            return;
        }
        self.await_fill.clear();
    }

    fn reset(&mut self) {
        self.closes.clear();
        self.last_timestamp = None;
        self.await_fill.clear();
        self.bars_in_uptrend = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::Portfolio;
    use chrono::{Duration, NaiveDate};

    fn ts(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(i as i64)
    }

    fn fast_params() -> MomentumParams {
        MomentumParams {
            short_ma: 5,
            long_ma: 20,
            confirmation_bars: 3,
            max_drawdown_exit: 0.15,
            lookback_for_peak: 20,
            rebalance_threshold: 0.01,
            max_position_pct: 0.55,
            min_trade_notional: 200.0,
            fill_timeout_bars: 5,
        }
    }

    /// Feed bars one at a time. With `fill_immediately`, every actionable
    /// decision is acknowledged straight away (the portfolio is not touched).
    fn feed(
        policy: &mut MomentumRotator,
        prices: &[f64],
        portfolio: &Portfolio,
        fill_immediately: bool,
    ) -> Vec<Decision> {
        (0..prices.len())
            .map(|i| {
                let snapshot = MarketSnapshot {
                    symbol: "BTC-USD",
                    prices: &prices[..=i],
                    current_price: prices[i],
                    timestamp: ts(i),
                    portfolio,
                };
                let decision = policy.decide(&snapshot);
                if fill_immediately && decision.is_actionable() {
                    policy.on_fill(&decision, prices[i], decision.size(), ts(i));
                }
                decision
            })
            .collect()
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn holds_during_warmup() {
        let mut policy = MomentumRotator::new(fast_params());
        let portfolio = Portfolio::new(10_000.0);
        let decisions = feed(&mut policy, &rising(10), &portfolio, false);
        assert!(decisions.iter().all(|d| d.reason() == "warming_up"));
    }

    #[test]
    fn enters_after_confirmation() {
        let mut policy = MomentumRotator::new(fast_params());
        let portfolio = Portfolio::new(10_000.0);
        let decisions = feed(&mut policy, &rising(27), &portfolio, false);

        // Uptrend is first evaluated at bar 23; three confirming bars put the
        // entry on bar 25.
        let first = decisions.iter().position(|d| d.is_actionable()).unwrap();
        assert_eq!(first, 25);
        assert_eq!(decisions[23].reason(), "within_band");

        // 0.55 * 10_000 / 125
        assert_eq!(decisions[25].side(), Some(OrderSide::Buy));
        assert!((decisions[25].size() - 44.0).abs() < 1e-9);
        assert_eq!(decisions[26].reason(), "await_fill");
    }

    #[test]
    fn await_fill_expires_after_timeout() {
        let mut policy = MomentumRotator::new(fast_params());
        let portfolio = Portfolio::new(10_000.0);
        let decisions = feed(&mut policy, &rising(33), &portfolio, false);

        for d in &decisions[26..=30] {
            assert_eq!(d.reason(), "await_fill");
        }
        assert_eq!(decisions[31].side(), Some(OrderSide::Buy));
    }

    #[test]
    fn fill_clears_await_flag() {
        let mut policy = MomentumRotator::new(fast_params());
        let prices = rising(27);
        let flat = Portfolio::new(10_000.0);
        let decisions = feed(&mut policy, &prices[..26], &flat, false);
        let entry = &decisions[25];
        policy.on_fill(entry, 125.0, 44.0, ts(25));

        let mut held = Portfolio::new(10_000.0);
        held.apply_buy(44.0, 5_500.0, 0.0).unwrap();
        let snapshot = MarketSnapshot {
            symbol: "BTC-USD",
            prices: &prices[..=26],
            current_price: prices[26],
            timestamp: ts(26),
            portfolio: &held,
        };
        assert_eq!(policy.decide(&snapshot).reason(), "within_band");
    }

    #[test]
    fn exits_on_crash_below_long_average() {
        let mut policy = MomentumRotator::new(fast_params());
        let mut prices = rising(30);
        prices.push(100.0);

        let mut held = Portfolio::new(5_000.0);
        held.apply_buy(40.0, 4_000.0, 0.0).unwrap();

        let decisions = feed(&mut policy, &prices, &held, true);
        let last = decisions.last().unwrap();
        assert_eq!(last.side(), Some(OrderSide::Sell));
        assert_eq!(last.reason(), "trend_exit");
        assert!((last.size() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn first_window_preloads_history() {
        let mut policy = MomentumRotator::new(fast_params());
        let prices = rising(30);
        let portfolio = Portfolio::new(10_000.0);
        let snapshot = MarketSnapshot {
            symbol: "BTC-USD",
            prices: &prices,
            current_price: prices[29],
            timestamp: ts(29),
            portfolio: &portfolio,
        };
        let decision = policy.decide(&snapshot);
        assert_eq!(policy.buffered(), 30);
        assert_ne!(decision.reason(), "warming_up");
    }

    #[test]
    fn repeated_timestamp_is_not_appended() {
        let mut policy = MomentumRotator::new(fast_params());
        let prices = rising(3);
        let portfolio = Portfolio::new(10_000.0);
        feed(&mut policy, &prices, &portfolio, false);
        assert_eq!(policy.buffered(), 3);

        let snapshot = MarketSnapshot {
            symbol: "BTC-USD",
            prices: &prices,
            current_price: 500.0,
            timestamp: ts(2),
            portfolio: &portfolio,
        };
        policy.decide(&snapshot);
        assert_eq!(policy.buffered(), 3);
    }

    #[test]
    fn buffer_is_bounded() {
        let mut policy = MomentumRotator::new(fast_params());
        let portfolio = Portfolio::new(10_000.0);
        feed(&mut policy, &rising(100), &portfolio, true);
        assert_eq!(policy.buffered(), 30);
    }

    #[test]
    fn reset_clears_state() {
        let mut policy = MomentumRotator::new(fast_params());
        let portfolio = Portfolio::new(10_000.0);
        feed(&mut policy, &rising(26), &portfolio, false);
        policy.reset();
        assert_eq!(policy.buffered(), 0);
        assert_eq!(policy.bars_in_uptrend, 0);
        assert!(!policy.await_fill.is_armed());
    }
}
