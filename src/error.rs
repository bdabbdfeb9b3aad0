use polars::prelude::PolarsError;
use thiserror::Error;

/// Error kinds surfaced by the backtesting core.
///
/// Batch drivers (optimizer, comparison) never let a single task's error
/// abort the batch; they record the failure and move on. Direct callers see
/// these variants through the crate [`Result`] alias.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("no input data found for symbol {0}")]
    DataNotFound(String),

    #[error("invalid data schema: {0}")]
    DataSchemaInvalid(String),

    #[error("unknown strategy: {0}")]
    StrategyUnknown(String),

    #[error("invalid parameters: {0}")]
    ParamsInvalid(String),

    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BacktestError>;
