use super::types::{EquityPoint, Performance, TradeRecord, TradeReason, TradeSide};

/// Annual risk-free rate baked into the Sharpe numerator.
const RISK_FREE_RATE: f64 = 0.03;
const TRADING_DAYS: f64 = 252.0;

/// Derive the full metric set from a completed equity curve and trade log.
pub fn calculate_performance(
    equity_curve: &[EquityPoint],
    trades: &[TradeRecord],
    initial_capital: f64,
) -> Performance {
    if equity_curve.is_empty() {
        return Performance {
            initial_capital,
            final_capital: initial_capital,
            ..Performance::default()
        };
    }

    let final_equity = equity_curve[equity_curve.len() - 1].equity;
    let total_return = (final_equity / initial_capital - 1.0) * 100.0;

    let start = equity_curve[0].date;
    let end = equity_curve[equity_curve.len() - 1].date;
    let days = (end - start).num_days() as f64;
    let years = (days / 365.25).max(1.0 / 365.0);
    let annual_return = ((final_equity / initial_capital).powf(1.0 / years) - 1.0) * 100.0;

    let returns: Vec<f64> = equity_curve.iter().skip(1).map(|p| p.period_return).collect();
    let std_daily = population_std(&returns);
    let sharpe_ratio = if returns.len() > 1 && std_daily > 0.0 {
        (mean(&returns) - RISK_FREE_RATE / TRADING_DAYS) / std_daily * TRADING_DAYS.sqrt()
    } else {
        0.0
    };
    let volatility = if returns.len() > 1 {
        std_daily * TRADING_DAYS.sqrt() * 100.0
    } else {
        0.0
    };

    let max_drawdown = max_drawdown_pct(equity_curve);
    let calmar_ratio = if max_drawdown > 0.0 {
        annual_return / max_drawdown
    } else {
        0.0
    };

    let total_trades = trades.iter().filter(|t| t.side == TradeSide::Buy).count();
    let sells: Vec<&TradeRecord> = trades.iter().filter(|t| t.side == TradeSide::Sell).collect();
    let profits: Vec<f64> = sells
        .iter()
        .filter_map(|t| t.pnl.filter(|p| *p > 0.0))
        .collect();
    let losses: Vec<f64> = sells
        .iter()
        .filter_map(|t| t.pnl.filter(|p| *p <= 0.0))
        .collect();

    let win_rate = if total_trades > 0 {
        profits.len() as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    let avg_profit = if profits.is_empty() { 0.0 } else { mean(&profits) };
    let avg_loss = if losses.is_empty() { 0.0 } else { mean(&losses).abs() };
    let profit_loss_ratio = if avg_loss > 0.0 {
        avg_profit / avg_loss
    } else if avg_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let stop_loss_count = sells
        .iter()
        .filter(|t| t.reason == TradeReason::StopLoss)
        .count();
    let stop_loss_rate = if total_trades > 0 {
        stop_loss_count as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    Performance {
        total_return,
        annual_return,
        sharpe_ratio,
        calmar_ratio,
        max_drawdown,
        volatility,
        total_trades,
        win_rate,
        profit_loss_ratio,
        stop_loss_count,
        stop_loss_rate,
        initial_capital,
        final_capital: final_equity,
        total_profit: profits.iter().sum(),
        total_loss: losses.iter().sum::<f64>().abs(),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn max_drawdown_pct(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for point in equity_curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            let dd = (point.equity - peak) / peak * 100.0;
            worst = worst.min(dd);
        }
    }
    worst.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut prev = values.first().copied().unwrap_or(0.0);
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| {
                let period_return = if i == 0 || prev <= 0.0 {
                    0.0
                } else {
                    equity / prev - 1.0
                };
                prev = equity;
                EquityPoint {
                    date: start + chrono::Duration::days(i as i64),
                    close: 10.0,
                    cash: equity,
                    shares: 0,
                    equity,
                    period_return,
                    cost_basis: 0.0,
                    unrealized_pnl: 0.0,
                }
            })
            .collect()
    }

    fn sell(pnl: f64, reason: TradeReason) -> TradeRecord {
        TradeRecord {
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            side: TradeSide::Sell,
            price: 10.0,
            exec_price: 9.99,
            shares: 100,
            amount: 999.0,
            commission: 5.0,
            stamp_tax: Some(1.0),
            pnl: Some(pnl),
            pnl_pct: Some(pnl / 10.0),
            reason,
            cost_basis: Some(10.0),
        }
    }

    fn buy() -> TradeRecord {
        TradeRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            side: TradeSide::Buy,
            price: 10.0,
            exec_price: 10.01,
            shares: 100,
            amount: 1001.0,
            commission: 5.0,
            stamp_tax: None,
            pnl: None,
            pnl_pct: None,
            reason: TradeReason::Signal,
            cost_basis: None,
        }
    }

    #[test]
    fn flat_curve_zero_metrics() {
        let perf = calculate_performance(&curve(&[1e6, 1e6, 1e6]), &[], 1e6);
        assert!((perf.total_return - 0.0).abs() < 1e-12);
        assert!((perf.sharpe_ratio - 0.0).abs() < 1e-12);
        assert!((perf.max_drawdown - 0.0).abs() < 1e-12);
        assert_eq!(perf.total_trades, 0);
        assert!((perf.win_rate - 0.0).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_from_peak() {
        let perf = calculate_performance(&curve(&[1e6, 1.2e6, 0.9e6, 1.1e6]), &[], 1e6);
        let expected = (1.2e6 - 0.9e6) / 1.2e6 * 100.0;
        assert!((perf.max_drawdown - expected).abs() < 1e-9);
    }

    #[test]
    fn win_rate_counts_profitable_sells_over_buys() {
        let trades = vec![
            buy(),
            sell(100.0, TradeReason::Signal),
            buy(),
            sell(-50.0, TradeReason::StopLoss),
        ];
        let perf = calculate_performance(&curve(&[1e6, 1.0001e6]), &trades, 1e6);
        assert_eq!(perf.total_trades, 2);
        assert!((perf.win_rate - 50.0).abs() < 1e-12);
        assert_eq!(perf.stop_loss_count, 1);
        assert!((perf.stop_loss_rate - 50.0).abs() < 1e-12);
        // One profit of 100, one loss of 50: ratio 2.
        assert!((perf.profit_loss_ratio - 2.0).abs() < 1e-12);
        assert!((perf.total_profit - 100.0).abs() < 1e-12);
        assert!((perf.total_loss - 50.0).abs() < 1e-12);
    }

    #[test]
    fn profit_without_loss_is_infinite_ratio() {
        let trades = vec![buy(), sell(100.0, TradeReason::Signal)];
        let perf = calculate_performance(&curve(&[1e6, 1.0001e6]), &trades, 1e6);
        assert!(perf.profit_loss_ratio.is_infinite());
    }

    #[test]
    fn open_trade_reports_zero_win_rate() {
        let perf = calculate_performance(&curve(&[1e6, 1.0001e6]), &[buy()], 1e6);
        assert_eq!(perf.total_trades, 1);
        assert!((perf.win_rate - 0.0).abs() < 1e-12);
    }

    #[test]
    fn annualisation_uses_calendar_span() {
        // One calendar year: annual return equals total return.
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let points: Vec<EquityPoint> = (0..=365)
            .map(|i| EquityPoint {
                date: start + chrono::Duration::days(i),
                close: 10.0,
                cash: 1e6 + 274.0 * i as f64,
                shares: 0,
                equity: 1e6 + 274.0 * i as f64,
                period_return: 0.0,
                cost_basis: 0.0,
                unrealized_pnl: 0.0,
            })
            .collect();
        let perf = calculate_performance(&points, &[], 1e6);
        // 365 days / 365.25 is just under a year, so the two only roughly agree.
        assert!((perf.annual_return - perf.total_return).abs() < 0.1);
    }
}
