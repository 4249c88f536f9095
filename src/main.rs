use anyhow::Result;
use breakout_engine::bars::slice_range;
use breakout_engine::config::RunConfig;
use breakout_engine::engine::Engine;
use breakout_engine::loader::load_instruments;
use breakout_engine::models::{GridRow, MetricSet};
use breakout_engine::optimizer::GridSearchOptimizer;
use breakout_engine::param_utils::format_parameters;
use breakout_engine::performance::PerformanceCalculator;
use breakout_engine::strategy::{BreakoutConfig, BreakoutStrategy};
use breakout_engine::walkforward::WalkForwardRunner;
use breakout_engine::walkforward_optimizer::WalkForwardOptimizer;
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "breakout-engine")]
#[command(about = "Breakout strategy evaluation over daily futures data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest over the full configured date range
    Backtest {
        /// Path to the JSON run configuration
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        /// Directory holding one <symbol>.csv file per instrument
        #[arg(long = "data-dir", value_name = "PATH")]
        data_dir: PathBuf,
    },
    /// Replay fixed parameters over rolling out-of-sample windows
    Walkforward {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        #[arg(long = "data-dir", value_name = "PATH")]
        data_dir: PathBuf,
    },
    /// Sweep the configured parameter grid and rank by composite score
    GridSearch {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        #[arg(long = "data-dir", value_name = "PATH")]
        data_dir: PathBuf,
        /// Per-evaluation time budget in seconds; overruns become failed rows
        #[arg(long = "deadline-secs")]
        deadline_secs: Option<u64>,
        /// Number of top-ranked parameter sets to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Re-optimize on each train window and trade the pick out-of-sample
    WalkforwardOptimize {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        #[arg(long = "data-dir", value_name = "PATH")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest { config, data_dir } => run_backtest(&config, &data_dir),
        Commands::Walkforward { config, data_dir } => run_walkforward(&config, &data_dir),
        Commands::GridSearch {
            config,
            data_dir,
            deadline_secs,
            top,
        } => run_grid_search(&config, &data_dir, deadline_secs, top),
        Commands::WalkforwardOptimize { config, data_dir } => {
            run_walkforward_optimize(&config, &data_dir)
        }
    }
}

fn run_backtest(config_path: &Path, data_dir: &Path) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let instruments = load_instruments(data_dir, &config.symbols)?;
    let instruments = slice_range(&instruments, config.start_date, config.end_date);

    let strategy_config =
        BreakoutConfig::from_parameters(&config.strategy, config.multipliers());
    strategy_config.validate()?;
    let mut strategy = BreakoutStrategy::new(strategy_config);
    let engine = Engine::new(config.initial_cash, config.costs());

    info!(
        "Backtesting {} instruments from {} to {}",
        instruments.len(),
        config.start_date,
        config.end_date
    );
    let outcome = engine.run(&mut strategy, &instruments)?;
    let metrics = PerformanceCalculator::metric_set(&outcome.records);

    println!("\n=== Backtest Results ===");
    println!("Initial Cash: ${:.2}", config.initial_cash);
    println!("Final Equity: ${:.2}", outcome.final_equity);
    println!("Closed Trades: {}", outcome.records.len());
    print_metrics(&metrics);

    let trade_log = strategy.take_trade_log();
    for (symbol, trades) in &trade_log {
        let pnl: f64 = trades.iter().map(|trade| trade.pnl).sum();
        println!("  {}: {} trades, PnL ${:.2}", symbol, trades.len(), pnl);
    }

    Ok(())
}

fn run_walkforward(config_path: &Path, data_dir: &Path) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let instruments = load_instruments(data_dir, &config.symbols)?;

    let runner = WalkForwardRunner {
        initial_cash: config.initial_cash,
        costs: config.costs(),
    };
    let rows = runner.run(
        &instruments,
        &config.strategy,
        &config.multipliers(),
        config.start_date,
        config.end_date,
        config.train_years,
        config.test_months,
    )?;

    println!("\n=== Walk-Forward Results ({} windows) ===", rows.len());
    let mut total = 0.0;
    for row in &rows {
        total += row.pnl;
        println!(
            "  test [{} .. {}): PnL ${:.2}",
            row.window.test_start, row.window.test_end, row.pnl
        );
    }
    println!("Total out-of-sample PnL: ${:.2}", total);

    Ok(())
}

fn run_grid_search(
    config_path: &Path,
    data_dir: &Path,
    deadline_secs: Option<u64>,
    top: usize,
) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let grid = config.parameter_grid()?;
    let instruments = load_instruments(data_dir, &config.symbols)?;
    let instruments = slice_range(&instruments, config.start_date, config.end_date);

    let optimizer = GridSearchOptimizer {
        initial_cash: config.initial_cash,
        costs: config.costs(),
        multipliers: config.multipliers(),
        weights: config.weights,
        deadline: deadline_secs.map(Duration::from_secs),
    };

    info!("Evaluating {} parameter combinations", grid.len());
    let rows = optimizer.run(Arc::new(instruments), &config.strategy, &grid)?;
    print_grid_rows(&rows, top);

    Ok(())
}

fn run_walkforward_optimize(config_path: &Path, data_dir: &Path) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let grid = config.parameter_grid()?;
    let instruments = load_instruments(data_dir, &config.symbols)?;

    let optimizer = WalkForwardOptimizer {
        initial_cash: config.initial_cash,
        costs: config.costs(),
        multipliers: config.multipliers(),
        weights: config.weights,
    };
    let rows = optimizer.run(
        &instruments,
        &config.strategy,
        &grid,
        config.start_date,
        config.end_date,
        config.train_years,
        config.test_months,
    )?;

    println!(
        "\n=== Walk-Forward Optimization Results ({} windows) ===",
        rows.len()
    );
    let mut total = 0.0;
    for row in &rows {
        let params = row
            .best_params
            .as_ref()
            .map(|params| format_parameters(params))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  test [{} .. {}): train PnL {}, test PnL {}, params [{}]",
            row.window.test_start,
            row.window.test_end,
            format_money(row.train_pnl),
            format_money(row.test_pnl),
            params
        );
        total += row.test_pnl.unwrap_or(0.0);
    }
    println!("Total out-of-sample PnL: ${:.2}", total);

    Ok(())
}

fn print_grid_rows(rows: &[GridRow], top: usize) {
    println!(
        "\n=== Grid Search Results (top {} of {}) ===",
        top.min(rows.len()),
        rows.len()
    );
    for (rank, row) in rows.iter().take(top).enumerate() {
        println!("Rank {}:", rank + 1);
        println!("  Score: {:.4}", row.score);
        println!("  Parameters: [{}]", format_parameters(&row.params));
        if let Some(error) = &row.error {
            println!("  Error: {}", error);
        } else {
            print_metrics(&row.metrics);
        }
        println!();
    }
}

fn print_metrics(metrics: &MetricSet) {
    println!("  PnL: {}", format_money(metrics.pnl));
    println!("  Sharpe: {}", format_ratio(metrics.sharpe));
    println!("  Win Rate: {}", format_percent(metrics.win_rate));
    println!("  Profit Factor: {}", format_ratio(metrics.profit_factor));
    println!("  Max Drawdown: {}", format_money(metrics.max_drawdown));
}

fn format_money(value: Option<f64>) -> String {
    value
        .map(|v| format!("${:.2}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn format_ratio(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn format_percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v))
        .unwrap_or_else(|| "n/a".to_string())
}
