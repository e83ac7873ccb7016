//! Equity tracking, drawdown, and summary statistics.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::backtest::BacktestResult;
use super::trade::Trade;

/// Mark-to-market equity sampled once per bar, after that bar's mutations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Running equity curve with peak and maximum drawdown kept up to date in a
/// single left-to-right pass.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    curve: Vec<EquityPoint>,
    peak: f64,
    max_drawdown: f64,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        PerformanceTracker {
            curve: Vec::new(),
            peak: f64::NEG_INFINITY,
            max_drawdown: 0.0,
        }
    }
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, timestamp: NaiveDateTime, equity: f64) {
        self.peak = self.peak.max(equity);
        self.max_drawdown = self.max_drawdown.max(drawdown(self.peak, equity));
        self.curve.push(EquityPoint { timestamp, equity });
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.curve
    }

    pub fn last_equity(&self) -> Option<f64> {
        self.curve.last().map(|p| p.equity)
    }
}

/// Fractional decline from `peak`; zero when the peak is not positive.
pub fn drawdown(peak: f64, equity: f64) -> f64 {
    if peak > 0.0 {
        (peak - equity) / peak
    } else {
        0.0
    }
}

pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        max_dd = max_dd.max(drawdown(peak, value));
    }
    max_dd
}

/// Fraction of trades with positive realized P&L.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades.iter().filter(|t| t.is_win()).count();
    wins as f64 / trades.len() as f64
}

pub fn total_return(final_equity: f64, starting_cash: f64) -> f64 {
    if starting_cash > 0.0 {
        final_equity / starting_cash - 1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    /// Longest run of consecutive bars spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub realized_pnl: f64,
    pub total_fees: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

impl Metrics {
    pub fn compute(result: &BacktestResult) -> Self {
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        for trade in &result.trades {
            let pnl = trade.realized_pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
        }

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };

        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        Metrics {
            total_return: result.total_return,
            max_drawdown: result.max_drawdown,
            max_drawdown_duration: drawdown_duration(&result.equity_curve),
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate: result.win_rate(),
            realized_pnl: total_wins - total_losses,
            total_fees: result.total_fees,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
        }
    }
}

fn drawdown_duration(curve: &[EquityPoint]) -> usize {
    let mut peak = f64::NEG_INFINITY;
    let mut current = 0usize;
    let mut longest = 0usize;

    for point in curve {
        if point.equity >= peak {
            peak = point.equity;
            current = 0;
        } else {
            current += 1;
            longest = longest.max(current);
        }
    }

    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::RunStats;
    use crate::domain::trade::OrderSide;
    use chrono::{Duration, NaiveDate};

    fn ts(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(i as i64)
    }

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                timestamp: ts(i),
                equity,
            })
            .collect()
    }

    fn sell(pnl: f64) -> Trade {
        Trade {
            symbol: "BTC-USD".into(),
            side: OrderSide::Sell,
            size: 1.0,
            price: 100.0,
            timestamp: ts(0),
            realized_pnl: pnl,
            fee: 0.1,
        }
    }

    fn result(trades: Vec<Trade>, equity: &[f64]) -> BacktestResult {
        let final_equity = *equity.last().unwrap();
        BacktestResult {
            symbol: "BTC-USD".into(),
            starting_cash: 10_000.0,
            final_equity,
            total_return: total_return(final_equity, 10_000.0),
            max_drawdown: max_drawdown(equity),
            total_fees: trades.iter().map(|t| t.fee).sum(),
            trades,
            equity_curve: curve(equity),
            stats: RunStats::default(),
        }
    }

    #[test]
    fn tracker_starts_with_negative_infinite_peak() {
        let t = PerformanceTracker::new();
        assert_eq!(t.peak, f64::NEG_INFINITY);
        assert_eq!(t.max_drawdown(), 0.0);
        assert!(t.last_equity().is_none());
    }

    #[test]
    fn tracker_matches_batch_drawdown() {
        let values = [10_000.0, 9_994.5, 10_544.5, 9_439.55, 9_439.55];
        let mut t = PerformanceTracker::new();
        for (i, &v) in values.iter().enumerate() {
            t.record(ts(i), v);
        }
        let expected = (10_544.5 - 9_439.55) / 10_544.5;
        assert!((t.max_drawdown() - expected).abs() < 1e-12);
        assert!((max_drawdown(&values) - expected).abs() < 1e-12);
        assert_eq!(t.peak, 10_544.5);
        assert_eq!(t.equity_curve().len(), 5);
    }

    #[test]
    fn drawdown_is_zero_for_non_positive_peak() {
        assert_eq!(drawdown(0.0, -5.0), 0.0);
        assert_eq!(max_drawdown(&[-1.0, -2.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn monotonic_curve_has_no_drawdown() {
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn win_rate_counts_strictly_positive() {
        assert_eq!(win_rate(&[]), 0.0);
        let trades = [sell(10.0), sell(0.0), sell(-5.0), sell(3.0)];
        assert!((win_rate(&trades) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn total_return_relative_to_start() {
        assert!((total_return(11_000.0, 10_000.0) - 0.1).abs() < 1e-12);
        assert_eq!(total_return(5.0, 0.0), 0.0);
    }

    #[test]
    fn compute_trade_stats() {
        let r = result(
            vec![sell(100.0), sell(-40.0), sell(60.0), sell(0.0)],
            &[10_000.0, 10_120.0],
        );
        let m = Metrics::compute(&r);

        assert_eq!(m.trades_won, 2);
        assert_eq!(m.trades_lost, 1);
        assert_eq!(m.trades_breakeven, 1);
        assert!((m.win_rate - 0.5).abs() < f64::EPSILON);
        assert!((m.realized_pnl - 120.0).abs() < 1e-9);
        assert!((m.profit_factor - 4.0).abs() < 1e-9);
        assert!((m.avg_win - 80.0).abs() < 1e-9);
        assert!((m.avg_loss - 40.0).abs() < 1e-9);
        assert!((m.largest_win - 100.0).abs() < f64::EPSILON);
        assert!((m.largest_loss - 40.0).abs() < f64::EPSILON);
        assert!((m.total_fees - 0.4).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_without_losses() {
        let m = Metrics::compute(&result(vec![sell(5.0)], &[10_000.0]));
        assert_eq!(m.profit_factor, f64::INFINITY);

        let m = Metrics::compute(&result(vec![], &[10_000.0]));
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.win_rate, 0.0);
    }

    #[test]
    fn drawdown_duration_counts_longest_underwater_run() {
        let r = result(vec![], &[100.0, 90.0, 95.0, 101.0, 99.0, 98.0, 97.0, 102.0]);
        assert_eq!(Metrics::compute(&r).max_drawdown_duration, 3);
    }
}
