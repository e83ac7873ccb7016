//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::csv_adapter::CsvPriceSource;
use crate::adapters::csv_report_adapter::CsvReportWriter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestResult, run_universe};
use crate::domain::config_validation::{validate_backtest_config, validate_strategy_config};
use crate::domain::error::RotatorError;
use crate::domain::policy::{BuyAndHoldParams, MomentumParams, PolicyKind, StrategyParams};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceSource;
use crate::ports::report_port::ReportPort;

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(name = "rotator", about = "Momentum rotation backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over one or more symbols
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated symbols, overriding the config
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Directory for CSV reports
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            symbols,
            data_dir,
            output,
        } => run_backtest(&config, &symbols, data_dir.as_deref(), output.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn run_backtest(
    config_path: &Path,
    symbol_overrides: &[String],
    data_dir_override: Option<&Path>,
    output_dir: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let prepared = validate_backtest_config(&adapter)
        .and_then(|()| validate_strategy_config(&adapter))
        .and_then(|()| Ok((build_backtest_config(&adapter)?, build_strategy_params(&adapter)?)));
    let (bt_config, strategy) = match prepared {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let data_dir = data_dir_override
        .map(Path::to_path_buf)
        .or_else(|| adapter.get_string("backtest", "data_dir").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let source = CsvPriceSource::new(data_dir);

    let symbols = match resolve_symbols(symbol_overrides, &adapter, &source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!(
        "Running {} on {} symbol(s), lag {} bar(s), fee {:.4}",
        strategy.kind,
        symbols.len(),
        bt_config.execution_lag_bars,
        bt_config.fee_rate,
    );

    let results = match run_pipeline(&source, &bt_config, &strategy, &symbols) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    println!("{}", format_summary(&results));

    if let Some(dir) = output_dir {
        if let Err(e) = CsvReportWriter.write_multi(&results, dir) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("\nReports written to: {}", dir.display());
    }

    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let checked = validate_backtest_config(&adapter)
        .and_then(|()| validate_strategy_config(&adapter))
        .and_then(|()| build_backtest_config(&adapter))
        .and_then(|config| Ok((config, build_strategy_params(&adapter)?)));

    match checked {
        Ok((config, strategy)) => {
            eprintln!("  Policy:            {}", strategy.kind);
            eprintln!("  Starting cash:     {:.2}", config.starting_cash);
            eprintln!("  Execution lag:     {} bar(s)", config.execution_lag_bars);
            eprintln!("  Fee rate:          {}", config.fee_rate);
            eprintln!("  Max position:      {:.2}%", config.max_position_fraction * 100.0);
            eprintln!("\nConfiguration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, RotatorError> {
    let defaults = BacktestConfig::default();
    let config = BacktestConfig {
        starting_cash: adapter.get_double("backtest", "starting_cash", defaults.starting_cash),
        execution_lag_bars: get_usize(
            adapter,
            "backtest",
            "execution_lag_bars",
            defaults.execution_lag_bars,
        )?,
        fee_rate: adapter.get_double("backtest", "fee_rate", defaults.fee_rate),
        max_position_fraction: adapter.get_double(
            "backtest",
            "max_position_fraction",
            defaults.max_position_fraction,
        ),
        history_window: get_usize(adapter, "backtest", "history_window", defaults.history_window)?,
    };
    config.validate()?;
    Ok(config)
}

pub fn build_strategy_params(adapter: &dyn ConfigPort) -> Result<StrategyParams, RotatorError> {
    let kind = match adapter.get_string("strategy", "kind") {
        Some(s) => s.parse()?,
        None => PolicyKind::MomentumRotator,
    };

    let m = MomentumParams::default();
    let momentum = MomentumParams {
        short_ma: get_usize(adapter, "strategy", "short_ma", m.short_ma)?,
        long_ma: get_usize(adapter, "strategy", "long_ma", m.long_ma)?,
        confirmation_bars: get_usize(adapter, "strategy", "confirmation_bars", m.confirmation_bars)?,
        max_drawdown_exit: adapter.get_double("strategy", "max_drawdown_exit", m.max_drawdown_exit),
        lookback_for_peak: get_usize(adapter, "strategy", "lookback_for_peak", m.lookback_for_peak)?,
        rebalance_threshold: adapter.get_double(
            "strategy",
            "rebalance_threshold",
            m.rebalance_threshold,
        ),
        max_position_pct: adapter.get_double("strategy", "max_position_pct", m.max_position_pct),
        min_trade_notional: adapter.get_double(
            "strategy",
            "min_trade_notional",
            m.min_trade_notional,
        ),
        fill_timeout_bars: get_usize(adapter, "strategy", "fill_timeout_bars", m.fill_timeout_bars)?,
    };

    let b = BuyAndHoldParams::default();
    let buy_and_hold = BuyAndHoldParams {
        warmup_bars: get_usize(adapter, "strategy", "warmup_bars", b.warmup_bars)?,
        max_position_pct: adapter.get_double("strategy", "max_position_pct", b.max_position_pct),
        fill_timeout_bars: get_usize(adapter, "strategy", "fill_timeout_bars", b.fill_timeout_bars)?,
    };

    Ok(StrategyParams {
        kind,
        momentum,
        buy_and_hold,
    })
}

fn get_usize(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, RotatorError> {
    let value = adapter.get_int(section, key, default as i64);
    usize::try_from(value).map_err(|_| RotatorError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: format!("{key} must be a non-negative integer"),
    })
}

/// Symbols from the command line, else `[backtest] symbols`, else every
/// series the source knows about. Duplicates are dropped, order is kept.
pub fn resolve_symbols(
    overrides: &[String],
    config: &dyn ConfigPort,
    source: &dyn PriceSource,
) -> Result<Vec<String>, RotatorError> {
    let candidates: Vec<String> = if !overrides.is_empty() {
        overrides.iter().map(|s| s.trim().to_string()).collect()
    } else {
        let configured = config.get_list("backtest", "symbols");
        if configured.is_empty() {
            source.list_symbols()?
        } else {
            configured
        }
    };

    let mut symbols: Vec<String> = Vec::with_capacity(candidates.len());
    for symbol in candidates {
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }

    if symbols.is_empty() {
        return Err(RotatorError::ConfigMissing {
            section: "backtest".into(),
            key: "symbols".into(),
        });
    }
    Ok(symbols)
}

/// Fetch every series, then backtest them in parallel with a fresh policy
/// per symbol.
pub fn run_pipeline(
    source: &dyn PriceSource,
    config: &BacktestConfig,
    strategy: &StrategyParams,
    symbols: &[String],
) -> Result<Vec<BacktestResult>, RotatorError> {
    let mut series = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let bars = source.fetch_prices(symbol)?;
        info!(symbol = %symbol, bars = bars.len(), "loaded price series");
        series.push((symbol.clone(), bars));
    }

    run_universe(&series, config, || {
        strategy.build(config.max_position_fraction)
    })
}

pub fn format_summary(results: &[BacktestResult]) -> String {
    let combined_start: f64 = results.iter().map(|r| r.starting_cash).sum();
    let combined_end: f64 = results.iter().map(|r| r.final_equity).sum();
    let combined_return = if combined_start > 0.0 {
        combined_end / combined_start - 1.0
    } else {
        0.0
    };

    let mut out = String::from("\n=== Momentum Rotator Backtest Summary ===\n");
    for r in results {
        out.push_str(&format!(
            "{}: Return={:.2}%, MaxDD={:.2}%, Trades={}, WinRate={:.2}%\n",
            r.symbol,
            r.total_return * 100.0,
            r.max_drawdown * 100.0,
            r.trade_count(),
            r.win_rate() * 100.0,
        ));
    }
    out.push_str(&format!("Combined Return: {:.2}%", combined_return * 100.0));
    out
}
