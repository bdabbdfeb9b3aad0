use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{self, EnvFilter};

use ashare_backtest::compare::{run_comparison, CompareOptions};
use ashare_backtest::config::BacktestConfig;
use ashare_backtest::data::DataManager;
use ashare_backtest::engine::output::write_backtest_outputs;
use ashare_backtest::engine::Evaluator;
use ashare_backtest::optimize::{Objective, Optimizer, OptimizerSettings};
use ashare_backtest::strategies;

#[derive(Parser)]
#[command(name = "ashare-backtest", about = "Daily-bar A-share backtesting")]
struct Cli {
    /// Root of the cleaned data layout (default: $DATA_ROOT or ./data).
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    #[arg(long, global = true)]
    initial_capital: Option<f64>,

    /// Inclusive simulation window (YYYY-MM-DD).
    #[arg(long, global = true)]
    start_date: Option<NaiveDate>,

    #[arg(long, global = true)]
    end_date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one strategy with default parameters and write its artifacts.
    Backtest {
        symbol: String,
        #[arg(long, default_value = "dual_ma")]
        strategy: String,
    },
    /// Run every strategy (or a subset), optimizing missing parameters,
    /// and write the comparison table and signal sheet.
    Compare {
        symbol: String,
        /// Comma-separated strategy names.
        #[arg(long, value_delimiter = ',')]
        strategies: Option<Vec<String>>,
        #[arg(long, default_value_t = 10)]
        max_evaluations: usize,
    },
    /// Bayesian parameter search for one strategy.
    Optimize {
        symbol: String,
        strategy: String,
        #[arg(long, default_value_t = 10)]
        max_evaluations: usize,
        #[arg(long, default_value = "sharpe_ratio")]
        objective: String,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = BacktestConfig::default();
    if let Some(capital) = cli.initial_capital {
        config.initial_capital = capital;
    }
    config.start_date = cli.start_date;
    config.end_date = cli.end_date;

    let data = Arc::new(match &cli.data_root {
        Some(root) => DataManager::new(root, config.cache_capacity)?,
        None => DataManager::from_env(config.cache_capacity)?,
    });

    match cli.command {
        Command::Backtest { symbol, strategy } => {
            let evaluator = Evaluator::new(Arc::clone(&data), config);
            let report = evaluator.run_backtest(&symbol, &strategy, None)?;
            let dir = data.output_dir(&symbol).join(&strategy);
            write_backtest_outputs(&dir, &report)?;

            println!(
                "{} on {symbol}: {} bars, {} trades",
                strategies::display_name(&strategy),
                report.total_days,
                report.performance.total_trades
            );
            for (label, value) in
                ashare_backtest::engine::output::performance_rows(&report.performance)
            {
                println!("  {label}: {value}");
            }
            println!("artifacts: {}", dir.display());
        }
        Command::Compare {
            symbol,
            strategies,
            max_evaluations,
        } => {
            let options = CompareOptions {
                strategies,
                max_evaluations,
                ..CompareOptions::default()
            };
            let report = run_comparison(&data, &config, &symbol, &options)?;

            println!("strategy ranking for {symbol} (by Sharpe):");
            for row in &report.rows {
                println!(
                    "  {:2}. {:16} sharpe {:>7.3}  return {:>8.2}%  trades {:>3}  params {}",
                    row.rank,
                    row.strategy_name,
                    row.performance.sharpe_ratio,
                    row.performance.total_return,
                    row.performance.total_trades,
                    row.params
                );
            }
            for (name, error) in &report.failures {
                eprintln!("  failed: {name}: {error}");
            }
            println!("outputs: {}", report.output_dir.display());
        }
        Command::Optimize {
            symbol,
            strategy,
            max_evaluations,
            objective,
        } => {
            let evaluator = Evaluator::new(Arc::clone(&data), config);
            let optimizer = Optimizer::new(
                evaluator,
                OptimizerSettings {
                    max_evaluations,
                    objective: Objective::parse(&objective)?,
                    ..OptimizerSettings::default()
                },
            );
            let result = optimizer.optimize(&symbol, &strategy, "bayesian")?;

            println!(
                "best {} = {:.3} after {} evaluations ({:.0}% successful, {:.1}s)",
                result.objective,
                result.best_score,
                result.total_evaluations,
                result.success_rate,
                result.optimization_time
            );
            for (name, value) in &result.best_params {
                println!("  {name} = {value}");
            }
        }
    }

    Ok(())
}
