use std::sync::Arc;
use std::time::Instant;

use super::core::BacktestEngine;
use super::output::performance_rows;
use super::types::{BacktestReport, StrategyResult};
use crate::config::BacktestConfig;
use crate::data::DataManager;
use crate::error::Result;
use crate::strategies::{self, ParamMap};

/// Glue between the data manager, the strategy registry and the engine:
/// load the series with the strategy's required indicators, run the
/// simulation and wrap the outcome.
pub struct Evaluator {
    data: Arc<DataManager>,
    config: BacktestConfig,
}

impl Evaluator {
    pub fn new(data: Arc<DataManager>, config: BacktestConfig) -> Self {
        Self { data, config }
    }

    pub fn data(&self) -> &Arc<DataManager> {
        &self.data
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Evaluate one `(symbol, strategy, params)` triple.
    ///
    /// Pre-run validation failures (unknown strategy, invalid parameters)
    /// are surfaced as errors; anything that goes wrong during the run
    /// itself comes back as a `StrategyResult` with `success == false`.
    pub fn evaluate(
        &self,
        symbol: &str,
        strategy_name: &str,
        params: Option<&ParamMap>,
    ) -> Result<StrategyResult> {
        let started = Instant::now();
        let merged = self.prepare(strategy_name, params)?;

        match self.run_prepared(symbol, strategy_name, &merged) {
            Ok(report) => {
                let execution_time = started.elapsed().as_secs_f64();
                Ok(StrategyResult {
                    symbol: symbol.to_string(),
                    strategy_name: strategy_name.to_string(),
                    success: true,
                    summary: performance_rows(&report.performance),
                    performance: Some(report.performance),
                    error: None,
                    execution_time,
                })
            }
            Err(e) => {
                tracing::warn!(
                    %symbol,
                    strategy = strategy_name,
                    error = %e,
                    "evaluation failed"
                );
                Ok(StrategyResult::failed(
                    symbol,
                    strategy_name,
                    e.to_string(),
                    started.elapsed().as_secs_f64(),
                ))
            }
        }
    }

    /// Run one backtest and hand back the full report (trades included).
    /// All failures are surfaced.
    pub fn run_backtest(
        &self,
        symbol: &str,
        strategy_name: &str,
        params: Option<&ParamMap>,
    ) -> Result<BacktestReport> {
        let merged = self.prepare(strategy_name, params)?;
        self.run_prepared(symbol, strategy_name, &merged)
    }

    fn prepare(&self, strategy_name: &str, params: Option<&ParamMap>) -> Result<ParamMap> {
        let info = strategies::find(strategy_name).ok_or_else(|| {
            crate::error::BacktestError::StrategyUnknown(strategy_name.to_string())
        })?;
        let merged = strategies::merged_params(info, params)?;
        strategies::validate_params(strategy_name, &merged)?;
        Ok(merged)
    }

    fn run_prepared(
        &self,
        symbol: &str,
        strategy_name: &str,
        merged: &ParamMap,
    ) -> Result<BacktestReport> {
        let strategy = strategies::build(strategy_name, Some(merged))?;
        let frame = self.data.load(symbol, &strategy.required_indicators())?;
        let mut engine = BacktestEngine::new(self.config.clone())?;
        engine.run(&frame, strategy.as_ref())
    }
}
