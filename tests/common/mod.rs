#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rotator::domain::bar::Bar;
use rotator::domain::error::RotatorError;
use rotator::domain::policy::{Decision, DecisionPolicy, MarketSnapshot};
use rotator::ports::data_port::PriceSource;
use std::collections::HashMap;

pub fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::hours(i as i64)
}

/// Hourly bars starting 2024-01-01 00:00.
pub fn make_bars(prices: &[f64]) -> Vec<Bar> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| Bar::new(ts(i), p))
        .collect()
}

/// Smooth series around `start_price` with a deterministic wobble.
pub fn generate_prices(count: usize, start_price: f64, drift: f64) -> Vec<f64> {
    (0..count)
        .map(|i| {
            let wobble = ((i as f64) * 0.7).sin() * start_price * 0.02;
            (start_price + drift * i as f64 + wobble).max(1.0)
        })
        .collect()
}

pub struct Fill {
    pub decision: Decision,
    pub price: f64,
    pub size: f64,
    pub timestamp: NaiveDateTime,
}

/// Emits the decision scheduled for each bar (hold otherwise) and records
/// every fill it is told about.
#[derive(Default)]
pub struct ScriptedPolicy {
    pub script: HashMap<usize, Decision>,
    pub bar: usize,
    pub fills: Vec<Fill>,
    pub resets: usize,
}

impl ScriptedPolicy {
    pub fn new(script: impl IntoIterator<Item = (usize, Decision)>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl DecisionPolicy for ScriptedPolicy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&mut self, _snapshot: &MarketSnapshot<'_>) -> Decision {
        let decision = self
            .script
            .get(&self.bar)
            .cloned()
            .unwrap_or_else(|| Decision::hold("scripted"));
        self.bar += 1;
        decision
    }

    fn on_fill(&mut self, decision: &Decision, price: f64, size: f64, timestamp: NaiveDateTime) {
        self.fills.push(Fill {
            decision: decision.clone(),
            price,
            size,
            timestamp,
        });
    }

    fn reset(&mut self) {
        self.bar = 0;
        self.fills.clear();
        self.resets += 1;
    }
}

/// Records everything it is shown and always holds.
#[derive(Default)]
pub struct RecordingPolicy {
    pub windows: Vec<Vec<f64>>,
    pub current_prices: Vec<f64>,
    pub timestamps: Vec<NaiveDateTime>,
    pub cash_seen: Vec<f64>,
}

impl DecisionPolicy for RecordingPolicy {
    fn name(&self) -> &str {
        "recording"
    }

    fn decide(&mut self, snapshot: &MarketSnapshot<'_>) -> Decision {
        self.windows.push(snapshot.prices.to_vec());
        self.current_prices.push(snapshot.current_price);
        self.timestamps.push(snapshot.timestamp);
        self.cash_seen.push(snapshot.portfolio.cash());
        Decision::hold("recording")
    }

    fn on_fill(&mut self, _decision: &Decision, _price: f64, _size: f64, _ts: NaiveDateTime) {}

    fn reset(&mut self) {
        self.windows.clear();
        self.current_prices.clear();
        self.timestamps.clear();
        self.cash_seen.clear();
    }
}

pub struct MockPriceSource {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_prices(mut self, symbol: &str, prices: &[f64]) -> Self {
        self.data.insert(symbol.to_string(), make_bars(prices));
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl PriceSource for MockPriceSource {
    fn fetch_prices(&self, symbol: &str) -> Result<Vec<Bar>, RotatorError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(RotatorError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, RotatorError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}
