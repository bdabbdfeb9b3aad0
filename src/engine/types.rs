use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::strategies::ParamMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReason {
    Signal,
    StopLoss,
}

impl TradeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::StopLoss => "stop_loss",
        }
    }
}

/// One executed fill. Sell-only fields (stamp tax, realized PnL, cost basis)
/// are `None` on buys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub side: TradeSide,
    /// Reference price (the bar's close).
    pub price: f64,
    /// Price after slippage, and for stop-loss fills the low floor.
    pub exec_price: f64,
    pub shares: i64,
    /// Gross amount: shares times execution price.
    pub amount: f64,
    pub commission: f64,
    pub stamp_tax: Option<f64>,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub reason: TradeReason,
    pub cost_basis: Option<f64>,
}

/// Mark-to-market snapshot appended after every bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub close: f64,
    pub cash: f64,
    pub shares: i64,
    pub equity: f64,
    pub period_return: f64,
    /// Average entry price while holding, zero otherwise.
    pub cost_basis: f64,
    pub unrealized_pnl: f64,
}

/// The fixed scalar metric set derived from a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub total_return: f64,
    pub annual_return: f64,
    pub sharpe_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub total_trades: usize,
    pub win_rate: f64,
    pub profit_loss_ratio: f64,
    pub stop_loss_count: usize,
    pub stop_loss_rate: f64,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_profit: f64,
    pub total_loss: f64,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            total_return: 0.0,
            annual_return: 0.0,
            sharpe_ratio: 0.0,
            calmar_ratio: 0.0,
            max_drawdown: 0.0,
            volatility: 0.0,
            total_trades: 0,
            win_rate: 0.0,
            profit_loss_ratio: 0.0,
            stop_loss_count: 0,
            stop_loss_rate: 0.0,
            initial_capital: 0.0,
            final_capital: 0.0,
            total_profit: 0.0,
            total_loss: 0.0,
        }
    }
}

/// Everything a single engine run produces.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub strategy_name: String,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub performance: Performance,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: usize,
}

/// Evaluator wrapper around one run: success flag, metrics, formatted
/// summary and the error description when the run failed.
#[derive(Debug, Clone)]
pub struct StrategyResult {
    pub symbol: String,
    pub strategy_name: String,
    pub success: bool,
    pub performance: Option<Performance>,
    pub summary: Vec<(String, String)>,
    pub error: Option<String>,
    pub execution_time: f64,
}

impl StrategyResult {
    pub fn failed(symbol: &str, strategy_name: &str, error: String, execution_time: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            strategy_name: strategy_name.to_string(),
            success: false,
            performance: None,
            summary: Vec::new(),
            error: Some(error),
            execution_time,
        }
    }
}

/// One successful optimizer evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationRecord {
    pub params: ParamMap,
    pub score: f64,
    pub performance: Performance,
}

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub symbol: String,
    pub strategy_name: String,
    pub method: String,
    pub objective: String,
    pub best_params: ParamMap,
    pub best_score: f64,
    pub best_performance: Option<Performance>,
    pub all_results: Vec<EvaluationRecord>,
    pub optimization_time: f64,
    pub total_evaluations: usize,
    pub success_rate: f64,
}
