pub mod gp;
pub mod space;

use std::cell::RefCell;
use std::time::{Duration, Instant};

use crate::engine::types::{EvaluationRecord, OptimizationResult, Performance};
use crate::engine::Evaluator;
use crate::error::{BacktestError, Result};
use crate::strategies::{self, ParamMap};
use gp::{GpMinimizer, Minimizer};
use space::SearchSpace;

/// Score handed to the minimizer for invalid parameters or failed
/// evaluations, large enough to push the surrogate away from the region.
pub const INVALID_SCORE: f64 = 1000.0;

/// Bootstrap size of the Bayesian search. Budgets below this never reach the
/// model-guided phase.
const N_INITIAL_POINTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Objective {
    #[default]
    SharpeRatio,
    TotalReturn,
    MaxDrawdown,
}

impl Objective {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "sharpe_ratio" => Ok(Self::SharpeRatio),
            "total_return" => Ok(Self::TotalReturn),
            "max_drawdown" => Ok(Self::MaxDrawdown),
            other => Err(BacktestError::ParamsInvalid(format!(
                "unsupported objective: {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SharpeRatio => "sharpe_ratio",
            Self::TotalReturn => "total_return",
            Self::MaxDrawdown => "max_drawdown",
        }
    }

    /// Maximized score for one evaluation: Sharpe as-is, total return as a
    /// fraction, drawdown negated so smaller is better.
    fn score(self, perf: &Performance) -> f64 {
        match self {
            Self::SharpeRatio => perf.sharpe_ratio,
            Self::TotalReturn => perf.total_return / 100.0,
            Self::MaxDrawdown => -perf.max_drawdown / 100.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub max_evaluations: usize,
    pub objective: Objective,
    /// Wall-clock budget, separate from `max_evaluations`. When it expires
    /// the best-so-far is returned.
    pub time_budget: Option<Duration>,
    pub seed: u64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_evaluations: 10,
            objective: Objective::SharpeRatio,
            time_budget: None,
            seed: 42,
        }
    }
}

/// Bayesian parameter search over a strategy's grid. Invalid parameter
/// combinations and failed evaluations never abort the search; they feed the
/// sentinel score back to the surrogate.
pub struct Optimizer {
    evaluator: Evaluator,
    settings: OptimizerSettings,
}

impl Optimizer {
    pub fn new(evaluator: Evaluator, settings: OptimizerSettings) -> Self {
        Self {
            evaluator,
            settings,
        }
    }

    pub fn optimize(
        &self,
        symbol: &str,
        strategy_name: &str,
        method: &str,
    ) -> Result<OptimizationResult> {
        if method != "bayesian" {
            return Err(BacktestError::ParamsInvalid(format!(
                "unsupported optimization method: {method}"
            )));
        }
        let info = strategies::find(strategy_name)
            .ok_or_else(|| BacktestError::StrategyUnknown(strategy_name.to_string()))?;
        let grid = (info.param_grid)();
        if grid.is_empty() {
            return Err(BacktestError::ParamsInvalid(format!(
                "strategy {strategy_name} has no tunable parameters"
            )));
        }

        let started = Instant::now();
        let space = SearchSpace::from_grid(&grid);
        tracing::info!(
            %symbol,
            strategy = strategy_name,
            dims = space.len(),
            budget = self.settings.max_evaluations,
            objective = self.settings.objective.as_str(),
            "starting bayesian optimization"
        );

        let history: RefCell<Vec<EvaluationRecord>> = RefCell::new(Vec::new());
        let objective = self.settings.objective;
        let mut objective_fn = |x: &[f64]| -> f64 {
            let params = space.decode(x);
            if strategies::validate_params(strategy_name, &params).is_err() {
                return INVALID_SCORE;
            }
            match self.evaluator.evaluate(symbol, strategy_name, Some(&params)) {
                Ok(result) if result.success => match result.performance {
                    Some(perf) => {
                        let score = objective.score(&perf);
                        if score.is_nan() {
                            return INVALID_SCORE;
                        }
                        history.borrow_mut().push(EvaluationRecord {
                            params,
                            score,
                            performance: perf,
                        });
                        -score
                    }
                    None => INVALID_SCORE,
                },
                _ => INVALID_SCORE,
            }
        };

        let minimizer = GpMinimizer {
            n_initial: N_INITIAL_POINTS,
            seed: self.settings.seed,
            ..GpMinimizer::default()
        };
        let deadline = self.settings.time_budget.map(|budget| started + budget);
        let outcome = minimizer.minimize(
            space.len(),
            self.settings.max_evaluations,
            deadline,
            &mut objective_fn,
        );
        drop(objective_fn);

        let history = history.into_inner();
        let total_evaluations = outcome.evaluations.len();
        let successful = history.len();
        let best = history
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .cloned();
        let (best_params, best_score, best_performance) = match best {
            Some(record) => (record.params, record.score, Some(record.performance)),
            None => (space.decode(&outcome.best_x), f64::NEG_INFINITY, None),
        };

        let optimization_time = started.elapsed().as_secs_f64();
        tracing::info!(
            %symbol,
            strategy = strategy_name,
            best_score = format!("{best_score:.3}"),
            evaluations = total_evaluations,
            elapsed = format!("{optimization_time:.1}s"),
            "optimization finished"
        );

        Ok(OptimizationResult {
            symbol: symbol.to_string(),
            strategy_name: strategy_name.to_string(),
            method: "bayesian".to_string(),
            objective: self.settings.objective.as_str().to_string(),
            best_params,
            best_score,
            best_performance,
            all_results: history,
            optimization_time,
            total_evaluations,
            success_rate: if total_evaluations > 0 {
                successful as f64 / total_evaluations as f64 * 100.0
            } else {
                0.0
            },
        })
    }
}
