// Persisted artifacts: per-strategy trade/equity/performance CSVs, the
// comparison table, the multi-strategy signal sheet and best-params files.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;

use super::types::{BacktestReport, Performance, TradeRecord, TradeSide};
use crate::error::{BacktestError, Result};
use crate::strategies::params::{
    format_params_as_list, is_window_name, ParamGrid, ParamMap, ParamValue,
};
use crate::strategies;

/// Display labels for the persisted per-metric report.
const DISPLAY_LABELS: [(&str, &str); 15] = [
    ("total_return", "总收益率"),
    ("annual_return", "年化收益率"),
    ("sharpe_ratio", "夏普比率"),
    ("calmar_ratio", "卡尔玛比率"),
    ("max_drawdown", "最大回撤"),
    ("volatility", "年化波动率"),
    ("total_trades", "总交易次数"),
    ("win_rate", "胜率"),
    ("profit_loss_ratio", "盈亏比"),
    ("stop_loss_count", "止损次数"),
    ("stop_loss_rate", "止损率"),
    ("initial_capital", "初始资金"),
    ("final_capital", "最终资金"),
    ("total_profit", "总盈利"),
    ("total_loss", "总亏损"),
];

const PERCENT_KEYS: [&str; 6] = [
    "total_return",
    "annual_return",
    "max_drawdown",
    "volatility",
    "win_rate",
    "stop_loss_rate",
];
const RATIO_KEYS: [&str; 3] = ["sharpe_ratio", "calmar_ratio", "profit_loss_ratio"];
const COUNT_KEYS: [&str; 2] = ["total_trades", "stop_loss_count"];

/// Thousands-separated currency rendering, no decimals.
pub fn thousands(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn ratio_string(value: f64, decimals: usize) -> String {
    if value.is_infinite() {
        "inf".to_string()
    } else {
        format!("{value:.decimals$}")
    }
}

fn metric_value(perf: &Performance, key: &str) -> f64 {
    match key {
        "total_return" => perf.total_return,
        "annual_return" => perf.annual_return,
        "sharpe_ratio" => perf.sharpe_ratio,
        "calmar_ratio" => perf.calmar_ratio,
        "max_drawdown" => perf.max_drawdown,
        "volatility" => perf.volatility,
        "total_trades" => perf.total_trades as f64,
        "win_rate" => perf.win_rate,
        "profit_loss_ratio" => perf.profit_loss_ratio,
        "stop_loss_count" => perf.stop_loss_count as f64,
        "stop_loss_rate" => perf.stop_loss_rate,
        "initial_capital" => perf.initial_capital,
        "final_capital" => perf.final_capital,
        "total_profit" => perf.total_profit,
        "total_loss" => perf.total_loss,
        _ => f64::NAN,
    }
}

/// Display-label rows with the fixed formatting rules: percent metrics get
/// two decimals and a `%` suffix, ratios three decimals, counts render as
/// integers and currency amounts get thousands separators.
pub fn performance_rows(perf: &Performance) -> Vec<(String, String)> {
    DISPLAY_LABELS
        .iter()
        .map(|(key, label)| {
            let value = metric_value(perf, key);
            let rendered = if PERCENT_KEYS.contains(key) {
                format!("{value:.2}%")
            } else if RATIO_KEYS.contains(key) {
                ratio_string(value, 3)
            } else if COUNT_KEYS.contains(key) {
                format!("{}", value as i64)
            } else {
                thousands(value)
            };
            ((*label).to_string(), rendered)
        })
        .collect()
}

fn write_df(path: &Path, df: &mut DataFrame) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

fn date_series(name: &str, dates: Vec<NaiveDate>) -> DateChunked {
    DateChunked::from_naive_date(PlSmallStr::from(name.to_string()), dates)
}

/// trades.csv, newest first.
pub fn write_trades_csv(dir: &Path, trades: &[TradeRecord]) -> Result<()> {
    let rows: Vec<&TradeRecord> = trades.iter().rev().collect();
    let mut df = df! {
        "date" => date_series("date", rows.iter().map(|t| t.date).collect()),
        "side" => rows.iter().map(|t| t.side.as_str()).collect::<Vec<_>>(),
        "price" => rows.iter().map(|t| t.price).collect::<Vec<_>>(),
        "exec_price" => rows.iter().map(|t| t.exec_price).collect::<Vec<_>>(),
        "shares" => rows.iter().map(|t| t.shares).collect::<Vec<_>>(),
        "amount" => rows.iter().map(|t| t.amount).collect::<Vec<_>>(),
        "commission" => rows.iter().map(|t| t.commission).collect::<Vec<_>>(),
        "stamp_tax" => rows.iter().map(|t| t.stamp_tax).collect::<Vec<_>>(),
        "pnl" => rows.iter().map(|t| t.pnl).collect::<Vec<_>>(),
        "pnl_pct" => rows.iter().map(|t| t.pnl_pct).collect::<Vec<_>>(),
        "reason" => rows.iter().map(|t| t.reason.as_str()).collect::<Vec<_>>(),
        "cost_basis" => rows.iter().map(|t| t.cost_basis).collect::<Vec<_>>(),
    }?;
    write_df(&dir.join("trades.csv"), &mut df)
}

/// equity_curve.csv, newest first.
pub fn write_equity_csv(dir: &Path, report: &BacktestReport) -> Result<()> {
    let rows: Vec<_> = report.equity_curve.iter().rev().collect();
    let mut df = df! {
        "date" => date_series("date", rows.iter().map(|p| p.date).collect()),
        "close" => rows.iter().map(|p| p.close).collect::<Vec<_>>(),
        "cash" => rows.iter().map(|p| p.cash).collect::<Vec<_>>(),
        "shares" => rows.iter().map(|p| p.shares).collect::<Vec<_>>(),
        "equity" => rows.iter().map(|p| p.equity).collect::<Vec<_>>(),
        "period_return" => rows.iter().map(|p| p.period_return).collect::<Vec<_>>(),
        "cost_basis" => rows.iter().map(|p| p.cost_basis).collect::<Vec<_>>(),
        "unrealized_pnl" => rows.iter().map(|p| p.unrealized_pnl).collect::<Vec<_>>(),
    }?;
    write_df(&dir.join("equity_curve.csv"), &mut df)
}

/// performance.csv with display labels.
pub fn write_performance_csv(dir: &Path, perf: &Performance) -> Result<()> {
    let rows = performance_rows(perf);
    let mut df = df! {
        "指标" => rows.iter().map(|(label, _)| label.as_str()).collect::<Vec<_>>(),
        "值" => rows.iter().map(|(_, value)| value.as_str()).collect::<Vec<_>>(),
    }?;
    write_df(&dir.join("performance.csv"), &mut df)
}

/// The per-strategy artifact bundle.
pub fn write_backtest_outputs(dir: &Path, report: &BacktestReport) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    write_trades_csv(dir, &report.trades)?;
    write_equity_csv(dir, report)?;
    write_performance_csv(dir, &report.performance)?;
    tracing::info!(dir = %dir.display(), "backtest artifacts written");
    Ok(())
}

/// Render a strategy's bound parameters as a grid-ordered list for table
/// cells; defaults are shown when no tuned assignment exists.
pub fn format_row_params(strategy_name: &str, params: Option<&ParamMap>) -> String {
    match strategies::find(strategy_name) {
        Some(info) => {
            let grid = (info.param_grid)();
            match params {
                Some(params) => format_params_as_list(&grid, params),
                None => format_params_as_list(&grid, &(info.default_params)()),
            }
        }
        None => "[N/A]".to_string(),
    }
}

/// One row of the strategy comparison table, already ranked.
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub rank: usize,
    pub strategy_name: String,
    pub params: String,
    pub performance: Performance,
    pub execution_time: f64,
}

/// strategy_comparison.csv with the fixed column order.
pub fn write_comparison_csv(path: &Path, rows: &[ComparisonRow]) -> Result<()> {
    let p = |f: fn(&Performance) -> f64, fmt: &dyn Fn(f64) -> String| -> Vec<String> {
        rows.iter().map(|r| fmt(f(&r.performance))).collect()
    };
    let pct2 = |v: f64| format!("{v:.2}%");
    let mut df = df! {
        "rank" => rows.iter().map(|r| r.rank as i64).collect::<Vec<_>>(),
        "strategy_name" => rows.iter().map(|r| r.strategy_name.as_str()).collect::<Vec<_>>(),
        "params" => rows.iter().map(|r| r.params.as_str()).collect::<Vec<_>>(),
        "total_return" => p(|m| m.total_return, &pct2),
        "annual_return" => p(|m| m.annual_return, &pct2),
        "sharpe_ratio" => p(|m| m.sharpe_ratio, &|v| ratio_string(v, 3)),
        "calmar_ratio" => p(|m| m.calmar_ratio, &|v| ratio_string(v, 3)),
        "max_drawdown" => p(|m| m.max_drawdown, &pct2),
        "volatility" => p(|m| m.volatility, &pct2),
        "total_trades" => rows.iter().map(|r| r.performance.total_trades as i64).collect::<Vec<_>>(),
        "win_rate" => p(|m| m.win_rate, &|v| format!("{v:.1}%")),
        "profit_loss_ratio" => p(|m| m.profit_loss_ratio, &|v| ratio_string(v, 2)),
        "stop_loss_count" => rows.iter().map(|r| r.performance.stop_loss_count as i64).collect::<Vec<_>>(),
        "stop_loss_rate" => p(|m| m.stop_loss_rate, &pct2),
        "initial_capital" => p(|m| m.initial_capital, &|v| thousands(v)),
        "final_capital" => p(|m| m.final_capital, &|v| thousands(v)),
        "total_profit" => p(|m| m.total_profit, &|v| thousands(v)),
        "total_loss" => p(|m| m.total_loss, &|v| thousands(v)),
        "execution_time" => rows.iter().map(|r| format!("{:.2}", r.execution_time)).collect::<Vec<_>>(),
    }?;
    write_df(path, &mut df)
}

/// total_trades.csv: one row per date on which at least one strategy traded,
/// newest first; one column per strategy holding `buy`, `sell` or empty.
pub fn write_total_trades_csv(
    path: &Path,
    per_strategy: &[(String, Vec<TradeRecord>)],
    closes: &BTreeMap<NaiveDate, f64>,
) -> Result<()> {
    let mut cells: BTreeMap<NaiveDate, BTreeMap<&str, &'static str>> = BTreeMap::new();
    for (name, trades) in per_strategy {
        for trade in trades {
            let label = match trade.side {
                TradeSide::Buy => "buy",
                TradeSide::Sell => "sell",
            };
            cells.entry(trade.date).or_default().insert(name, label);
        }
    }

    let dates: Vec<NaiveDate> = cells.keys().rev().copied().collect();
    let mut columns: Vec<Column> = vec![
        date_series("date", dates.clone()).into_series().into(),
        Series::new(
            "close".into(),
            dates
                .iter()
                .map(|d| closes.get(d).copied())
                .collect::<Vec<Option<f64>>>(),
        )
        .into(),
    ];
    for (name, _) in per_strategy {
        let values: Vec<&str> = dates
            .iter()
            .map(|d| {
                cells
                    .get(d)
                    .and_then(|row| row.get(name.as_str()).copied())
                    .unwrap_or("")
            })
            .collect();
        columns.push(Series::new(name.as_str().into(), values).into());
    }
    let mut df = DataFrame::new(dates.len(), columns)?;
    write_df(path, &mut df)
}

/// Write the winning parameter assignment for later reuse.
pub fn write_best_params(path: &Path, grid: &ParamGrid, params: &ParamMap) -> Result<()> {
    let mut ordered: Vec<(&String, &ParamValue)> = Vec::new();
    for (name, _) in &grid.dims {
        if let Some(value) = params.get(name) {
            ordered.push((name, value));
        }
    }
    for (name, value) in params {
        if !ordered.iter().any(|(n, _)| *n == name) {
            ordered.push((name, value));
        }
    }
    let mut body = String::from("param_name,best_value\n");
    for (name, value) in ordered {
        body.push_str(&format!("{name},{value}\n"));
    }
    std::fs::write(path, body)?;
    Ok(())
}

/// Read a persisted best-params file. Tolerates integer-looking floats;
/// names containing period/window/length are cast to integers. Returns
/// `None` when the file does not exist.
pub fn read_best_params(path: &Path) -> Result<Option<ParamMap>> {
    if !path.exists() {
        return Ok(None);
    }
    let body = std::fs::read_to_string(path)?;
    let mut params = ParamMap::new();
    for line in body.lines().skip(1) {
        let mut fields = line.splitn(2, ',');
        let (Some(name), Some(raw)) = (fields.next(), fields.next()) else {
            continue;
        };
        let name = name.trim();
        let raw = raw.trim();
        if name.is_empty() || raw.is_empty() {
            continue;
        }
        let parsed: f64 = raw.parse().map_err(|_| {
            BacktestError::ParamsInvalid(format!("unparseable best-params value: {name}={raw}"))
        })?;
        let value = if is_window_name(name) || (parsed.fract() == 0.0 && !raw.contains('.')) {
            ParamValue::Int(parsed.round() as i64)
        } else {
            ParamValue::Float((parsed * 100.0).round() / 100.0)
        };
        params.insert(name.to_string(), value);
    }
    Ok(Some(params).filter(|p| !p.is_empty()))
}
