// Multi-strategy comparison on one symbol: reuse persisted best parameters,
// optimize the strategies that lack them, rank everything by Sharpe and emit
// the comparison table plus the per-day signal sheet.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::config::BacktestConfig;
use crate::data::csv::date_column;
use crate::data::DataManager;
use crate::engine::output::{
    format_row_params, read_best_params, write_backtest_outputs, write_best_params,
    write_comparison_csv, write_total_trades_csv, ComparisonRow,
};
use crate::engine::types::{BacktestReport, TradeRecord};
use crate::engine::Evaluator;
use crate::error::{BacktestError, Result};
use crate::indicators::column_f64;
use crate::optimize::{Objective, Optimizer, OptimizerSettings};
use crate::strategies::{self, ParamMap};

#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Subset of registry names; `None` runs every registered strategy.
    pub strategies: Option<Vec<String>>,
    /// Evaluation budget per strategy that still needs optimizing.
    pub max_evaluations: usize,
    pub objective: Objective,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            strategies: None,
            max_evaluations: 10,
            objective: Objective::SharpeRatio,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub symbol: String,
    pub rows: Vec<ComparisonRow>,
    pub output_dir: PathBuf,
    /// Strategies that failed, with the error description.
    pub failures: Vec<(String, String)>,
}

/// Run the full comparison pipeline for one symbol. Individual strategy
/// failures are collected, never fatal for the batch.
pub fn run_comparison(
    data: &Arc<DataManager>,
    config: &BacktestConfig,
    symbol: &str,
    options: &CompareOptions,
) -> Result<ComparisonReport> {
    let names: Vec<&'static str> = match &options.strategies {
        Some(subset) => subset
            .iter()
            .map(|name| {
                strategies::find(name)
                    .map(|info| info.name)
                    .ok_or_else(|| BacktestError::StrategyUnknown(name.clone()))
            })
            .collect::<Result<_>>()?,
        None => strategies::all_names(),
    };

    let output_dir = data.output_dir(symbol);
    std::fs::create_dir_all(&output_dir)?;

    // Reuse persisted winners; optimize only the strategies without one.
    let mut best_params: BTreeMap<&str, ParamMap> = BTreeMap::new();
    for name in &names {
        let path = output_dir.join(name).join("best_params.csv");
        if let Some(params) = read_best_params(&path)? {
            tracing::info!(strategy = *name, "reusing persisted best parameters");
            best_params.insert(name, params);
        }
    }
    let missing: Vec<&'static str> = names
        .iter()
        .filter(|n| !best_params.contains_key(**n))
        .copied()
        .collect();

    let mut failures: Vec<(String, String)> = Vec::new();
    if !missing.is_empty() {
        tracing::info!(
            count = missing.len(),
            budget = options.max_evaluations,
            "optimizing strategies without persisted parameters"
        );
        let optimized: Vec<(&'static str, Result<ParamMap>)> = missing
            .par_iter()
            .map(|name| {
                let evaluator = Evaluator::new(Arc::clone(data), config.clone());
                let optimizer = Optimizer::new(
                    evaluator,
                    OptimizerSettings {
                        max_evaluations: options.max_evaluations,
                        objective: options.objective,
                        ..OptimizerSettings::default()
                    },
                );
                let outcome = optimizer
                    .optimize(symbol, name, "bayesian")
                    .map(|r| r.best_params);
                (*name, outcome)
            })
            .collect();
        for (name, outcome) in optimized {
            match outcome {
                Ok(params) => {
                    let strategy_dir = output_dir.join(name);
                    std::fs::create_dir_all(&strategy_dir)?;
                    if let Some(info) = strategies::find(name) {
                        write_best_params(
                            &strategy_dir.join("best_params.csv"),
                            &(info.param_grid)(),
                            &params,
                        )?;
                    }
                    best_params.insert(name, params);
                }
                Err(e) => {
                    tracing::warn!(strategy = name, error = %e, "optimization failed");
                }
            }
        }
    }

    // Evaluate every strategy with its best (or default) parameters.
    let evaluated: Vec<(&'static str, Result<(BacktestReport, f64)>)> = names
        .par_iter()
        .map(|name| {
            let evaluator = Evaluator::new(Arc::clone(data), config.clone());
            let started = Instant::now();
            let outcome = evaluator
                .run_backtest(symbol, name, best_params.get(*name))
                .map(|report| (report, started.elapsed().as_secs_f64()));
            (*name, outcome)
        })
        .collect();

    let mut ranked: Vec<(&'static str, BacktestReport, f64)> = Vec::new();
    for (name, outcome) in evaluated {
        match outcome {
            Ok((report, execution_time)) => {
                write_backtest_outputs(&output_dir.join(name), &report)?;
                ranked.push((name, report, execution_time));
            }
            Err(e) => {
                tracing::warn!(strategy = name, error = %e, "evaluation failed, skipping");
                failures.push((name.to_string(), e.to_string()));
            }
        }
    }
    ranked.sort_by(|a, b| {
        b.1.performance
            .sharpe_ratio
            .total_cmp(&a.1.performance.sharpe_ratio)
    });

    let rows: Vec<ComparisonRow> = ranked
        .iter()
        .enumerate()
        .map(|(i, (name, report, execution_time))| ComparisonRow {
            rank: i + 1,
            strategy_name: (*name).to_string(),
            params: format_row_params(name, best_params.get(*name)),
            performance: report.performance.clone(),
            execution_time: *execution_time,
        })
        .collect();
    write_comparison_csv(&output_dir.join("strategy_comparison.csv"), &rows)?;

    let per_strategy: Vec<(String, Vec<TradeRecord>)> = ranked
        .iter()
        .map(|(name, report, _)| ((*name).to_string(), report.trades.clone()))
        .collect();
    let closes = close_by_date(data, symbol)?;
    write_total_trades_csv(&output_dir.join("total_trades.csv"), &per_strategy, &closes)?;

    tracing::info!(
        %symbol,
        ranked = rows.len(),
        failed = failures.len(),
        output = %output_dir.display(),
        "comparison finished"
    );
    Ok(ComparisonReport {
        symbol: symbol.to_string(),
        rows,
        output_dir,
        failures,
    })
}

fn close_by_date(data: &Arc<DataManager>, symbol: &str) -> Result<BTreeMap<NaiveDate, f64>> {
    let frame = data.load(symbol, &[])?;
    let dates = date_column(&frame)?;
    let closes = column_f64(&frame, "close")?;
    Ok(dates.into_iter().zip(closes).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn seed_symbol(root: &std::path::Path, symbol: &str, rows: usize) {
        let dir = root.join("cleaned_stocks").join(symbol);
        std::fs::create_dir_all(&dir).unwrap();
        let mut body = String::from("date,open,high,low,close,volume\n");
        for i in 0..rows {
            let day = chrono::NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
                + chrono::Duration::days(i as i64);
            let px = 10.0 + 2.0 * (i as f64 * 0.1).sin() + 0.005 * i as f64;
            body.push_str(&format!(
                "{day},{px:.3},{:.3},{:.3},{px:.3},{}\n",
                px + 0.25,
                px - 0.25,
                600_000 + 700 * i
            ));
        }
        let mut f = std::fs::File::create(dir.join("historical_quotes.csv")).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn unknown_strategy_subset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = Arc::new(DataManager::new(dir.path(), 10).unwrap());
        let options = CompareOptions {
            strategies: Some(vec!["turtle".to_string()]),
            ..CompareOptions::default()
        };
        let err =
            run_comparison(&data, &BacktestConfig::default(), "000001", &options).unwrap_err();
        assert!(matches!(err, BacktestError::StrategyUnknown(_)));
    }

    #[test]
    fn comparison_writes_table_and_signal_sheet() {
        let dir = tempfile::tempdir().unwrap();
        seed_symbol(dir.path(), "000001", 220);
        let data = Arc::new(DataManager::new(dir.path(), 10).unwrap());
        let options = CompareOptions {
            strategies: Some(vec!["dual_ma".to_string(), "rsi_reversal".to_string()]),
            max_evaluations: 4,
            ..CompareOptions::default()
        };
        let report =
            run_comparison(&data, &BacktestConfig::default(), "000001", &options).unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].rank, 1);
        // Ranked by Sharpe, descending.
        assert!(
            report.rows[0].performance.sharpe_ratio
                >= report.rows[1].performance.sharpe_ratio
        );
        assert!(report.output_dir.join("strategy_comparison.csv").exists());
        assert!(report.output_dir.join("total_trades.csv").exists());
        for name in ["dual_ma", "rsi_reversal"] {
            assert!(report.output_dir.join(name).join("best_params.csv").exists());
            assert!(report.output_dir.join(name).join("trades.csv").exists());
            assert!(report.output_dir.join(name).join("performance.csv").exists());
        }
    }

    #[test]
    fn persisted_params_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        seed_symbol(dir.path(), "000001", 180);
        let strategy_dir = dir
            .path()
            .join("cleaned_stocks/000001/backtest_results/dual_ma");
        std::fs::create_dir_all(&strategy_dir).unwrap();
        std::fs::write(
            strategy_dir.join("best_params.csv"),
            "param_name,best_value\nshort_period,10\nlong_period,40\n",
        )
        .unwrap();

        let data = Arc::new(DataManager::new(dir.path(), 10).unwrap());
        let options = CompareOptions {
            strategies: Some(vec!["dual_ma".to_string()]),
            max_evaluations: 2,
            ..CompareOptions::default()
        };
        let report =
            run_comparison(&data, &BacktestConfig::default(), "000001", &options).unwrap();
        assert_eq!(report.rows[0].params, "[10, 40]");
    }
}
