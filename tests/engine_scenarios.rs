// End-to-end engine scenarios: flat markets, a golden cross, stop-loss
// execution, cost-free identity and the engine's universal invariants.

use chrono::NaiveDate;
use polars::prelude::*;

use ashare_backtest::config::BacktestConfig;
use ashare_backtest::engine::types::{TradeReason, TradeSide};
use ashare_backtest::engine::BacktestEngine;
use ashare_backtest::error::Result;
use ashare_backtest::indicators::IndicatorId;
use ashare_backtest::strategies::{self, ParamMap, ParamValue, Signals, Strategy};

struct Bars {
    dates: Vec<NaiveDate>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
}

impl Bars {
    fn flat(n: usize, price: f64) -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        Self {
            dates: (0..n)
                .map(|i| start + chrono::Duration::days(i as i64))
                .collect(),
            open: vec![price; n],
            high: vec![price; n],
            low: vec![price; n],
            close: vec![price; n],
            volume: vec![1_000_000.0; n],
        }
    }

    fn from_closes(closes: &[f64]) -> Self {
        let mut bars = Self::flat(closes.len(), 0.0);
        bars.close = closes.to_vec();
        bars.open = closes.to_vec();
        bars.high = closes.iter().map(|c| c + 0.5).collect();
        bars.low = closes.iter().map(|c| c - 0.5).collect();
        bars
    }

    fn frame(&self) -> DataFrame {
        df! {
            "date" => DateChunked::from_naive_date(PlSmallStr::from("date"), self.dates.clone()),
            "open" => self.open.clone(),
            "high" => self.high.clone(),
            "low" => self.low.clone(),
            "close" => self.close.clone(),
            "volume" => self.volume.clone(),
        }
        .unwrap()
    }
}

struct Scripted {
    buy: Vec<bool>,
    sell: Vec<bool>,
}

impl Scripted {
    fn buy_at(n: usize, indices: &[usize]) -> Self {
        let mut buy = vec![false; n];
        for i in indices {
            buy[*i] = true;
        }
        Self {
            buy,
            sell: vec![false; n],
        }
    }

    fn silent(n: usize) -> Self {
        Self {
            buy: vec![false; n],
            sell: vec![false; n],
        }
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }
    fn params(&self) -> ParamMap {
        ParamMap::new()
    }
    fn required_indicators(&self) -> Vec<IndicatorId> {
        Vec::new()
    }
    fn signals(&self, _df: &DataFrame) -> Result<Signals> {
        Ok(Signals {
            buy: self.buy.clone(),
            sell: self.sell.clone(),
        })
    }
}

fn dual_ma(short: i64, long: i64) -> Box<dyn Strategy> {
    let mut params = ParamMap::new();
    params.insert("short_period".into(), ParamValue::Int(short));
    params.insert("long_period".into(), ParamValue::Int(long));
    strategies::build("dual_ma", Some(&params)).unwrap()
}

#[test]
fn two_bar_flat_market_is_inert() {
    let bars = Bars::flat(2, 10.0);
    let strategy = dual_ma(5, 20);
    let mut engine = BacktestEngine::new(BacktestConfig::default()).unwrap();
    let report = engine.run(&bars.frame(), strategy.as_ref()).unwrap();

    assert_eq!(report.performance.total_trades, 0);
    assert_eq!(report.performance.final_capital, 1_000_000.0);
    assert_eq!(report.performance.total_return, 0.0);
    assert_eq!(report.performance.sharpe_ratio, 0.0);
    assert_eq!(report.performance.win_rate, 0.0);
}

#[test]
fn golden_cross_buys_once_and_holds() {
    // 60 flat bars, then 20 bars rising linearly from 10 to 12.
    let mut closes = vec![10.0; 60];
    for i in 1..=20 {
        closes.push(10.0 + 2.0 * f64::from(i) / 20.0);
    }
    let bars = Bars::from_closes(&closes);
    let strategy = dual_ma(5, 20);
    let mut engine = BacktestEngine::new(BacktestConfig::default()).unwrap();
    let report = engine.run(&bars.frame(), strategy.as_ref()).unwrap();

    assert_eq!(report.performance.total_trades, 1);
    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].side, TradeSide::Buy);
    // No closed trade: win rate reports zero.
    assert_eq!(report.performance.win_rate, 0.0);

    // Equity grows monotonically once the position is on.
    let entry = report
        .equity_curve
        .iter()
        .position(|p| p.shares > 0)
        .unwrap();
    for pair in report.equity_curve[entry..].windows(2) {
        assert!(pair[1].equity >= pair[0].equity - 1e-9);
    }
}

#[test]
fn stop_loss_executes_at_the_floored_stop_price() {
    let config = BacktestConfig::default();
    let mut bars = Bars::from_closes(&[100.0, 95.0]);
    bars.low = vec![99.0, 94.0];
    let strategy = Scripted::buy_at(2, &[0]);
    let mut engine = BacktestEngine::new(config.clone()).unwrap();
    let report = engine.run(&bars.frame(), &strategy).unwrap();

    assert_eq!(report.trades.len(), 2);
    let buy = &report.trades[0];
    assert!((buy.exec_price - 100.1).abs() < 1e-9);
    assert_eq!(buy.shares, 9900);

    let stop = &report.trades[1];
    assert_eq!(stop.reason, TradeReason::StopLoss);
    let stop_price = 100.1 * (1.0 - config.stop_loss_pct);
    let expected = (stop_price * (1.0 - config.slippage_rate)).max(94.0);
    assert!((stop.exec_price - expected).abs() < 1e-9);
    assert!(stop.exec_price >= 94.0);
    assert!(stop.exec_price <= stop_price);
    assert_eq!(report.performance.stop_loss_count, 1);
    assert!((report.performance.stop_loss_rate - 100.0).abs() < 1e-9);
}

#[test]
fn cost_free_flat_run_preserves_capital_exactly() {
    let config = BacktestConfig {
        commission_rate: 0.0,
        min_commission: 0.0,
        slippage_rate: 0.0,
        stamp_tax_rate: 0.0,
        ..BacktestConfig::default()
    };
    let bars = Bars::flat(30, 25.0);
    let strategy = Scripted::silent(30);
    let mut engine = BacktestEngine::new(config).unwrap();
    let report = engine.run(&bars.frame(), &strategy).unwrap();
    assert_eq!(report.performance.final_capital, 1_000_000.0);
}

#[test]
fn short_history_produces_no_trades_but_valid_metrics() {
    // Fewer bars than any indicator warm-up.
    let bars = Bars::from_closes(&[10.0, 10.5, 11.0]);
    for name in strategies::all_names() {
        // EMAs seed from the first bar, so MACD has no warm-up gap.
        if name == "macd_trend" {
            continue;
        }
        let strategy = strategies::build(name, None).unwrap();
        let mut engine = BacktestEngine::new(BacktestConfig::default()).unwrap();
        let report = engine.run(&bars.frame(), strategy.as_ref()).unwrap();
        assert_eq!(report.performance.total_trades, 0, "{name}");
        assert_eq!(report.performance.total_return, 0.0, "{name}");
        assert_eq!(report.performance.sharpe_ratio, 0.0, "{name}");
    }
}

fn wavy_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 20.0 + 6.0 * (i as f64 * 0.11).sin() + 0.01 * i as f64)
        .collect()
}

#[test]
fn universal_invariants_hold_on_wavy_data() {
    let config = BacktestConfig::default();
    let bars = Bars::from_closes(&wavy_closes(300));
    let strategy = dual_ma(5, 20);
    let mut engine = BacktestEngine::new(config.clone()).unwrap();
    let report = engine.run(&bars.frame(), strategy.as_ref()).unwrap();
    assert!(report.performance.total_trades > 1, "scenario needs trades");

    let low_by_date: std::collections::BTreeMap<NaiveDate, f64> = bars
        .dates
        .iter()
        .copied()
        .zip(bars.low.iter().copied())
        .collect();

    for point in &report.equity_curve {
        assert!(point.cash >= -1e-9);
        assert!(point.shares >= 0);
        assert_eq!(point.shares % 100, 0);
    }

    let mut commissions = 0.0;
    let mut stamps = 0.0;
    let mut realized_gross = 0.0;
    for trade in &report.trades {
        commissions += trade.commission;
        match trade.side {
            TradeSide::Buy => {
                assert!(trade.exec_price >= trade.price);
                assert!(trade.stamp_tax.is_none());
            }
            TradeSide::Sell => {
                let stamp = trade.stamp_tax.unwrap();
                assert!((stamp - trade.amount * config.stamp_tax_rate).abs() < 1e-9);
                stamps += stamp;
                let basis = trade.cost_basis.unwrap();
                realized_gross += trade.shares as f64 * (trade.exec_price - basis);
                match trade.reason {
                    TradeReason::Signal => assert!(trade.exec_price <= trade.price),
                    TradeReason::StopLoss => {
                        let low = low_by_date[&trade.date];
                        assert!(trade.exec_price >= low);
                        assert!(trade.exec_price <= basis * (1.0 - config.stop_loss_pct) + 1e-9);
                    }
                }
            }
        }
    }

    // Equity identity over gross realized PnL, all commissions and stamps.
    let last = report.equity_curve.last().unwrap();
    let expected =
        config.initial_capital + realized_gross + last.unrealized_pnl - commissions - stamps;
    assert!(
        (last.equity - expected).abs() < 1e-6,
        "identity off by {}",
        last.equity - expected
    );
}

#[test]
fn repeated_runs_are_identical() {
    let bars = Bars::from_closes(&wavy_closes(250));
    let strategy = dual_ma(5, 20);
    let run = || {
        let mut engine = BacktestEngine::new(BacktestConfig::default()).unwrap();
        engine.run(&bars.frame(), strategy.as_ref()).unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a.trades, b.trades);
    assert_eq!(a.equity_curve, b.equity_curve);
    assert_eq!(a.performance, b.performance);
}

#[test]
fn perturbing_a_late_bar_never_changes_the_prefix() {
    let closes = wavy_closes(250);
    let baseline_bars = Bars::from_closes(&closes);
    let strategy = dual_ma(5, 20);
    let mut engine = BacktestEngine::new(BacktestConfig::default()).unwrap();
    let baseline = engine.run(&baseline_bars.frame(), strategy.as_ref()).unwrap();

    let k = 200;
    let mut perturbed = closes;
    perturbed[k] += 5.0;
    let mut bars = Bars::from_closes(&perturbed);
    bars.high[k] = perturbed[k] + 0.5;
    bars.low[k] = perturbed[k] - 0.5;
    let modified = engine.run(&bars.frame(), strategy.as_ref()).unwrap();

    for (a, b) in baseline.equity_curve[..k]
        .iter()
        .zip(modified.equity_curve[..k].iter())
    {
        assert_eq!(a, b);
    }
    let prefix_trades = |trades: &[ashare_backtest::engine::types::TradeRecord]| {
        trades
            .iter()
            .filter(|t| t.date < baseline_bars.dates[k])
            .cloned()
            .collect::<Vec<_>>()
    };
    assert_eq!(prefix_trades(&baseline.trades), prefix_trades(&modified.trades));
}
