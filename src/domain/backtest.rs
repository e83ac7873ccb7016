//! Backtest runner and per-bar event loop.
//!
//! Each bar runs the same four steps in order: fill a due order, show the
//! policy a window ending at the current bar, queue its decision, record
//! equity. A run owns its policy, portfolio, lot tracker and order queue
//! outright, so independent runs can go in parallel.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info};

use super::bar::{Bar, check_bar};
use super::error::RotatorError;
use super::execution::{ExecutionConfig, ExecutionEngine, ExecutionOutcome, SubmitOutcome};
use super::lots::LotTracker;
use super::metrics::{self, EquityPoint, PerformanceTracker};
use super::policy::{DecisionPolicy, MarketSnapshot};
use super::portfolio::Portfolio;
use super::trade::Trade;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub starting_cash: f64,
    pub execution_lag_bars: usize,
    pub fee_rate: f64,
    pub max_position_fraction: f64,
    /// Number of most recent prices (current bar included) shown to the policy.
    pub history_window: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            starting_cash: 10_000.0,
            execution_lag_bars: 1,
            fee_rate: 0.001,
            max_position_fraction: 0.55,
            history_window: 200,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), RotatorError> {
        if !self.starting_cash.is_finite() || self.starting_cash <= 0.0 {
            return Err(invalid("starting_cash", "must be a positive number"));
        }
        if !self.fee_rate.is_finite() || self.fee_rate < 0.0 {
            return Err(invalid("fee_rate", "must be a non-negative number"));
        }
        if !(self.max_position_fraction > 0.0 && self.max_position_fraction <= 1.0) {
            return Err(invalid("max_position_fraction", "must be in (0, 1]"));
        }
        if self.history_window == 0 {
            return Err(invalid("history_window", "must be at least 1"));
        }
        Ok(())
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            execution_lag_bars: self.execution_lag_bars,
            fee_rate: self.fee_rate,
            max_position_fraction: self.max_position_fraction,
        }
    }
}

fn invalid(key: &str, reason: &str) -> RotatorError {
    RotatorError::ConfigInvalid {
        section: "backtest".into(),
        key: key.into(),
        reason: reason.into(),
    }
}

/// What the order queue did over a run.
///
/// Every queued order ends exactly one way, so
/// `orders_queued == orders_filled + orders_discarded + orders_expired`
/// once the run is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub orders_queued: usize,
    pub orders_filled: usize,
    pub orders_discarded: usize,
    /// Buy/sell decisions that arrived while another order was in flight.
    pub decisions_dropped: usize,
    /// Orders still queued when the series ran out.
    pub orders_expired: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub starting_cash: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub total_fees: f64,
    pub stats: RunStats,
}

impl BacktestResult {
    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn win_rate(&self) -> f64 {
        metrics::win_rate(&self.trades)
    }
}

/// A single-instrument simulation driven one bar at a time.
#[derive(Debug)]
pub struct Backtest<P> {
    symbol: String,
    config: BacktestConfig,
    policy: P,
    portfolio: Portfolio,
    engine: ExecutionEngine,
    tracker: PerformanceTracker,
    trades: Vec<Trade>,
    total_fees: f64,
    stats: RunStats,
    prices: Vec<f64>,
    bar_index: usize,
    last_timestamp: Option<NaiveDateTime>,
}

impl<P: DecisionPolicy> Backtest<P> {
    /// Validates the configuration and resets the policy, once, before any
    /// bar is seen.
    pub fn new(
        symbol: impl Into<String>,
        config: BacktestConfig,
        mut policy: P,
    ) -> Result<Self, RotatorError> {
        config.validate()?;
        policy.reset();
        let symbol = symbol.into();
        Ok(Backtest {
            engine: ExecutionEngine::new(symbol.clone(), config.execution_config()),
            portfolio: Portfolio::new(config.starting_cash),
            symbol,
            config,
            policy,
            tracker: PerformanceTracker::new(),
            trades: Vec::new(),
            total_fees: 0.0,
            stats: RunStats::default(),
            prices: Vec::new(),
            bar_index: 0,
            last_timestamp: None,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn lots(&self) -> &LotTracker {
        self.engine.lots()
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn bars_processed(&self) -> usize {
        self.bar_index
    }

    /// Advance the simulation by one bar.
    pub fn step(&mut self, bar: Bar) -> Result<(), RotatorError> {
        let index = self.bar_index;
        check_bar(&self.symbol, index, &bar, self.last_timestamp)?;

        self.execute_pending(index, &bar)?;

        self.push_price(bar.price);
        let start = self.prices.len().saturating_sub(self.config.history_window);
        let snapshot = MarketSnapshot {
            symbol: &self.symbol,
            prices: &self.prices[start..],
            current_price: bar.price,
            timestamp: bar.timestamp,
            portfolio: &self.portfolio,
        };
        let decision = self.policy.decide(&snapshot);

        match self.engine.submit(&decision, index) {
            SubmitOutcome::Queued {
                scheduled_bar_index,
            } => {
                self.stats.orders_queued += 1;
                debug!(
                    symbol = %self.symbol,
                    bar = index,
                    scheduled_bar_index,
                    %decision,
                    "order queued"
                );
            }
            SubmitOutcome::Dropped => self.stats.decisions_dropped += 1,
            SubmitOutcome::Ignored => {}
        }

        // Zero lag fills on the bar the decision was taken.
        self.execute_pending(index, &bar)?;

        self.tracker
            .record(bar.timestamp, self.portfolio.value(bar.price));
        self.last_timestamp = Some(bar.timestamp);
        self.bar_index += 1;
        Ok(())
    }

    /// Expire an order left in flight at the end of the series.
    pub fn finish(&mut self) {
        if let Some(order) = self.engine.discard_pending() {
            self.stats.orders_expired += 1;
            debug!(
                symbol = %self.symbol,
                side = %order.side,
                scheduled_bar_index = order.scheduled_bar_index,
                "pending order expired at end of series"
            );
        }
    }

    /// Build the result from the state so far. Does not mutate anything.
    pub fn finalize(&self) -> BacktestResult {
        let starting_cash = self.config.starting_cash;
        let final_equity = self.tracker.last_equity().unwrap_or(starting_cash);
        BacktestResult {
            symbol: self.symbol.clone(),
            starting_cash,
            final_equity,
            total_return: metrics::total_return(final_equity, starting_cash),
            max_drawdown: self.tracker.max_drawdown(),
            trades: self.trades.clone(),
            equity_curve: self.tracker.equity_curve().to_vec(),
            total_fees: self.total_fees,
            stats: self.stats,
        }
    }

    fn execute_pending(&mut self, index: usize, bar: &Bar) -> Result<(), RotatorError> {
        match self.engine.execute_due(index, bar, &mut self.portfolio)? {
            ExecutionOutcome::Filled(fill) => {
                self.stats.orders_filled += 1;
                self.total_fees += fill.fee;
                self.policy
                    .on_fill(&fill.decision, fill.price, fill.size, fill.timestamp);
                if let Some(trade) = fill.trade {
                    self.trades.push(trade);
                }
            }
            ExecutionOutcome::Discarded { .. } => self.stats.orders_discarded += 1,
            ExecutionOutcome::Idle | ExecutionOutcome::NotDue => {}
        }
        Ok(())
    }

    fn push_price(&mut self, price: f64) {
        let window = self.config.history_window;
        if self.prices.len() >= window.saturating_mul(2).max(64) {
            let excess = self.prices.len() - (window - 1);
            self.prices.drain(..excess);
        }
        self.prices.push(price);
    }
}

/// Run `policy` over a complete series.
pub fn run_backtest<P: DecisionPolicy>(
    symbol: &str,
    bars: &[Bar],
    config: &BacktestConfig,
    policy: P,
) -> Result<BacktestResult, RotatorError> {
    if bars.is_empty() {
        return Err(RotatorError::EmptySeries {
            symbol: symbol.to_string(),
        });
    }

    let mut backtest = Backtest::new(symbol, config.clone(), policy)?;
    info!(
        symbol,
        policy = backtest.policy().name(),
        bars = bars.len(),
        "backtest started"
    );
    for bar in bars {
        if let Err(err) = backtest.step(*bar) {
            if err.is_caller_defect() {
                error!(symbol, bar = backtest.bars_processed(), %err, "simulation aborted");
            }
            return Err(err);
        }
    }
    backtest.finish();

    let result = backtest.finalize();
    info!(
        symbol,
        final_equity = result.final_equity,
        total_return = result.total_return,
        max_drawdown = result.max_drawdown,
        trades = result.trade_count(),
        "backtest finished"
    );
    Ok(result)
}

/// Run one backtest per series in parallel, each with a freshly built
/// policy. Results keep the input order; the first failure is returned.
pub fn run_universe<P, F>(
    series: &[(String, Vec<Bar>)],
    config: &BacktestConfig,
    make_policy: F,
) -> Result<Vec<BacktestResult>, RotatorError>
where
    P: DecisionPolicy,
    F: Fn() -> P + Sync,
{
    config.validate()?;
    series
        .par_iter()
        .map(|(symbol, bars)| run_backtest(symbol, bars, config, make_policy()))
        .collect()
}
