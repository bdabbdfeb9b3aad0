// MACD trend-following.

use polars::prelude::DataFrame;

use super::helpers::{cross_above, cross_below};
use super::params::{require_window, ParamGrid, ParamMap, ParamValue};
use super::{make_params, Signals, Strategy};
use crate::error::Result;
use crate::indicators::{column_f64, momentum, IndicatorId, MACD_FAST, MACD_SIGNAL, MACD_SLOW};

/// Buys when DIF crosses above DEA in positive territory, sells when DIF
/// crosses below DEA in negative territory.
pub struct MacdTrend {
    fast: usize,
    slow: usize,
    signal: usize,
}

pub(super) fn defaults() -> ParamMap {
    make_params(&[
        ("fast", ParamValue::Int(MACD_FAST as i64)),
        ("slow", ParamValue::Int(MACD_SLOW as i64)),
        ("signal", ParamValue::Int(MACD_SIGNAL as i64)),
    ])
}

pub(super) fn grid() -> ParamGrid {
    ParamGrid::new(vec![
        ("fast", [8, 10, 12, 15].map(ParamValue::Int).to_vec()),
        ("slow", [24, 26, 30, 35].map(ParamValue::Int).to_vec()),
        ("signal", [6, 9, 12].map(ParamValue::Int).to_vec()),
    ])
}

pub(super) fn build(params: &ParamMap) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(MacdTrend {
        fast: require_window(params, "fast")?,
        slow: require_window(params, "slow")?,
        signal: require_window(params, "signal")?,
    }))
}

impl MacdTrend {
    fn has_default_windows(&self) -> bool {
        self.fast == MACD_FAST && self.slow == MACD_SLOW && self.signal == MACD_SIGNAL
    }

    fn dif_dea(&self, df: &DataFrame) -> Result<(Vec<f64>, Vec<f64>)> {
        // The standard MACD columns encode the default windows only.
        if self.has_default_windows()
            && df.column("MACD_DIF").is_ok()
            && df.column("MACD_DEA").is_ok()
        {
            return Ok((column_f64(df, "MACD_DIF")?, column_f64(df, "MACD_DEA")?));
        }
        let close = column_f64(df, "close")?;
        let m = momentum::macd(&close, self.fast, self.slow, self.signal);
        Ok((m.dif, m.dea))
    }
}

impl Strategy for MacdTrend {
    fn name(&self) -> &'static str {
        "macd_trend"
    }

    fn params(&self) -> ParamMap {
        make_params(&[
            ("fast", ParamValue::Int(self.fast as i64)),
            ("slow", ParamValue::Int(self.slow as i64)),
            ("signal", ParamValue::Int(self.signal as i64)),
        ])
    }

    fn required_indicators(&self) -> Vec<IndicatorId> {
        if self.has_default_windows() {
            vec![IndicatorId::MacdDif, IndicatorId::MacdDea]
        } else {
            Vec::new()
        }
    }

    fn signals(&self, df: &DataFrame) -> Result<Signals> {
        let (dif, dea) = self.dif_dea(df)?;
        let up = cross_above(&dif, &dea);
        let down = cross_below(&dif, &dea);
        let n = dif.len();
        let buy = (0..n).map(|i| up[i] && dif[i] > 0.0).collect();
        let sell = (0..n).map(|i| down[i] && dif[i] < 0.0).collect();
        Ok(Signals { buy, sell })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn trending_series_buys_above_zero() {
        // Fall then rise: the bullish cross happens while DIF is recovering;
        // only crosses with DIF > 0 may buy.
        let mut close: Vec<f64> = (0..40).map(|i| 50.0 - 0.5 * f64::from(i)).collect();
        close.extend((0..60).map(|i| 30.0 + 0.8 * f64::from(i)));
        let df = df! { "close" => close.clone() }.unwrap();
        let strategy = build(&defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();

        let m = momentum::macd(&close, 12, 26, 9);
        for (i, fired) in signals.buy.iter().enumerate() {
            if *fired {
                assert!(m.dif[i] > 0.0, "buy at {i} with DIF <= 0");
            }
        }
    }

    #[test]
    fn flat_series_never_signals() {
        let df = df! { "close" => vec![10.0; 60] }.unwrap();
        let strategy = build(&defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.buy.iter().all(|b| !b));
        assert!(signals.sell.iter().all(|b| !b));
    }

    #[test]
    fn custom_windows_ignore_standard_columns() {
        let strategy = build(&make_params(&[
            ("fast", ParamValue::Int(8)),
            ("slow", ParamValue::Int(24)),
            ("signal", ParamValue::Int(6)),
        ]))
        .unwrap();
        assert!(strategy.required_indicators().is_empty());
    }
}
