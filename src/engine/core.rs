use chrono::NaiveDate;
use polars::prelude::DataFrame;

use super::metrics::calculate_performance;
use super::types::{BacktestReport, EquityPoint, TradeReason, TradeRecord, TradeSide};
use crate::config::BacktestConfig;
use crate::data::csv::{date_column, DATE_COL, OHLCV_COLS};
use crate::error::{BacktestError, Result};
use crate::indicators::column_f64;
use crate::strategies::Strategy;

/// Single-symbol walk-forward simulator. State is reset at the start of each
/// run; one bar is processed at a time in ascending date order, so a run is
/// deterministic for fixed inputs.
pub struct BacktestEngine {
    config: BacktestConfig,
    cash: f64,
    position: i64,
    avg_cost: f64,
    trades: Vec<TradeRecord>,
    equity_curve: Vec<EquityPoint>,
    current_date: Option<NaiveDate>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Result<Self> {
        let config = config.checked()?;
        let cash = config.initial_capital;
        Ok(Self {
            config,
            cash,
            position: 0,
            avg_cost: 0.0,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            current_date: None,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    fn reset(&mut self) {
        self.cash = self.config.initial_capital;
        self.position = 0;
        self.avg_cost = 0.0;
        self.trades.clear();
        self.equity_curve.clear();
        self.current_date = None;
    }

    /// Run the strategy over the frame's bars within the configured date
    /// window and derive performance metrics.
    pub fn run(&mut self, df: &DataFrame, strategy: &dyn Strategy) -> Result<BacktestReport> {
        self.reset();
        validate_frame(df)?;

        let df = filter_by_date(df, self.config.start_date, self.config.end_date)?;
        if df.height() == 0 {
            return Err(BacktestError::DataSchemaInvalid(
                "no bars inside the configured date window".to_string(),
            ));
        }

        let dates = date_column(&df)?;
        let closes = column_f64(&df, "close")?;
        let lows = column_f64(&df, "low")?;

        tracing::info!(
            strategy = strategy.name(),
            bars = dates.len(),
            "starting backtest"
        );
        let signals = strategy.signals(&df)?;
        if signals.buy.len() != dates.len() || signals.sell.len() != dates.len() {
            return Err(BacktestError::EvaluationFailed(format!(
                "strategy {} produced misaligned signals",
                strategy.name()
            )));
        }

        for i in 0..dates.len() {
            self.current_date = Some(dates[i]);
            let close = closes[i];
            let low = lows[i];

            let stopped = self.check_stop_loss(low, close);
            if !stopped {
                if self.position > 0 && signals.sell[i] {
                    self.execute_sell(close * (1.0 - self.config.slippage_rate), close, TradeReason::Signal);
                } else if self.position == 0 && signals.buy[i] {
                    self.execute_buy(close);
                }
            }

            self.push_equity(dates[i], close);
        }

        let performance =
            calculate_performance(&self.equity_curve, &self.trades, self.config.initial_capital);
        tracing::info!(
            strategy = strategy.name(),
            total_return = format!("{:.2}%", performance.total_return),
            trades = performance.total_trades,
            "backtest finished"
        );

        Ok(BacktestReport {
            strategy_name: strategy.name().to_string(),
            trades: std::mem::take(&mut self.trades),
            equity_curve: std::mem::take(&mut self.equity_curve),
            performance,
            start_date: dates[0],
            end_date: dates[dates.len() - 1],
            total_days: dates.len(),
        })
    }

    /// Stop-loss check runs before any signal on the bar; a triggered stop
    /// consumes the bar entirely.
    fn check_stop_loss(&mut self, low: f64, close: f64) -> bool {
        if self.position <= 0 || self.avg_cost <= 0.0 {
            return false;
        }
        let stop_price = self.avg_cost * (1.0 - self.config.stop_loss_pct);
        if low <= stop_price {
            let exec_price = (stop_price * (1.0 - self.config.slippage_rate)).max(low);
            self.execute_sell(exec_price, close, TradeReason::StopLoss);
            return true;
        }
        false
    }

    fn execute_buy(&mut self, close: f64) {
        let exec_price = close * (1.0 + self.config.slippage_rate);
        let budget = self.cash * self.config.position_size;
        let lot = self.config.min_shares;
        let shares = (budget / exec_price / lot as f64).floor() as i64 * lot;
        if shares < lot {
            return;
        }
        let amount = shares as f64 * exec_price;
        let commission = (amount * self.config.commission_rate).max(self.config.min_commission);
        if self.cash < amount + commission {
            return;
        }

        self.cash -= amount + commission;
        self.position = shares;
        self.avg_cost = exec_price;
        self.trades.push(TradeRecord {
            date: self.current_date.unwrap_or_default(),
            side: TradeSide::Buy,
            price: close,
            exec_price,
            shares,
            amount,
            commission,
            stamp_tax: None,
            pnl: None,
            pnl_pct: None,
            reason: TradeReason::Signal,
            cost_basis: None,
        });
    }

    fn execute_sell(&mut self, exec_price: f64, close: f64, reason: TradeReason) {
        if self.position <= 0 {
            return;
        }
        let shares = self.position;
        let amount = shares as f64 * exec_price;
        let commission = (amount * self.config.commission_rate).max(self.config.min_commission);
        let stamp_tax = amount * self.config.stamp_tax_rate;
        let net = amount - commission - stamp_tax;
        let cost = shares as f64 * self.avg_cost;
        let pnl = net - cost;
        let pnl_pct = if self.avg_cost > 0.0 { pnl / cost * 100.0 } else { 0.0 };

        self.cash += net;
        self.trades.push(TradeRecord {
            date: self.current_date.unwrap_or_default(),
            side: TradeSide::Sell,
            price: close,
            exec_price,
            shares,
            amount,
            commission,
            stamp_tax: Some(stamp_tax),
            pnl: Some(pnl),
            pnl_pct: Some(pnl_pct),
            reason,
            cost_basis: Some(self.avg_cost),
        });
        self.position = 0;
        self.avg_cost = 0.0;
    }

    fn push_equity(&mut self, date: NaiveDate, close: f64) {
        let equity = self.cash + self.position as f64 * close;
        let prev_equity = self.equity_curve.last().map_or(equity, |p| p.equity);
        let period_return = if prev_equity > 0.0 {
            equity / prev_equity - 1.0
        } else {
            0.0
        };
        let holding = self.position > 0;
        self.equity_curve.push(EquityPoint {
            date,
            close,
            cash: self.cash,
            shares: self.position,
            equity,
            period_return,
            cost_basis: if holding { self.avg_cost } else { 0.0 },
            unrealized_pnl: if holding {
                self.position as f64 * (close - self.avg_cost)
            } else {
                0.0
            },
        });
    }
}

fn validate_frame(df: &DataFrame) -> Result<()> {
    if df.height() == 0 {
        return Err(BacktestError::DataSchemaInvalid("empty data frame".to_string()));
    }
    let mut missing = Vec::new();
    for name in std::iter::once(DATE_COL).chain(OHLCV_COLS) {
        if df.column(name).is_err() {
            missing.push(name);
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BacktestError::DataSchemaInvalid(format!(
            "missing columns: {}",
            missing.join(", ")
        )))
    }
}

fn filter_by_date(
    df: &DataFrame,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<DataFrame> {
    if start.is_none() && end.is_none() {
        return Ok(df.clone());
    }
    let dates = date_column(df)?;
    let from = dates.partition_point(|d| start.is_some_and(|s| *d < s));
    let to = dates.partition_point(|d| end.is_none_or(|e| *d <= e));
    Ok(df.slice(from as i64, to.saturating_sub(from)))
}
