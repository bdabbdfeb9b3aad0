// RSI mean-reversion.

use polars::prelude::DataFrame;

use super::helpers::series_or_compute;
use super::params::{require_float, require_window, ParamGrid, ParamMap, ParamValue};
use super::{make_params, Signals, Strategy};
use crate::error::Result;
use crate::indicators::{column_f64, momentum, IndicatorId, RSI_WINDOW};

/// Buys below the oversold line, sells above the overbought line.
pub struct RsiReversal {
    rsi_period: usize,
    oversold: f64,
    overbought: f64,
}

pub(super) fn defaults() -> ParamMap {
    make_params(&[
        ("rsi_period", ParamValue::Int(RSI_WINDOW as i64)),
        ("oversold", ParamValue::Int(30)),
        ("overbought", ParamValue::Int(70)),
    ])
}

pub(super) fn grid() -> ParamGrid {
    ParamGrid::new(vec![
        ("rsi_period", [10, 14, 21].map(ParamValue::Int).to_vec()),
        ("oversold", [25, 30, 35].map(ParamValue::Int).to_vec()),
        ("overbought", [70, 75, 80].map(ParamValue::Int).to_vec()),
    ])
}

pub(super) fn build(params: &ParamMap) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(RsiReversal {
        rsi_period: require_window(params, "rsi_period")?,
        oversold: require_float(params, "oversold")?,
        overbought: require_float(params, "overbought")?,
    }))
}

impl RsiReversal {
    fn rsi(&self, df: &DataFrame) -> Result<Vec<f64>> {
        if self.rsi_period == RSI_WINDOW {
            return series_or_compute(df, "RSI", |df| {
                Ok(momentum::rsi(&column_f64(df, "close")?, RSI_WINDOW))
            });
        }
        Ok(momentum::rsi(&column_f64(df, "close")?, self.rsi_period))
    }
}

impl Strategy for RsiReversal {
    fn name(&self) -> &'static str {
        "rsi_reversal"
    }

    fn params(&self) -> ParamMap {
        make_params(&[
            ("rsi_period", ParamValue::Int(self.rsi_period as i64)),
            ("oversold", ParamValue::Float(self.oversold)),
            ("overbought", ParamValue::Float(self.overbought)),
        ])
    }

    fn required_indicators(&self) -> Vec<IndicatorId> {
        if self.rsi_period == RSI_WINDOW {
            vec![IndicatorId::Rsi]
        } else {
            Vec::new()
        }
    }

    fn signals(&self, df: &DataFrame) -> Result<Signals> {
        let rsi = self.rsi(df)?;
        let buy = rsi.iter().map(|v| *v < self.oversold).collect();
        let sell = rsi.iter().map(|v| *v > self.overbought).collect();
        Ok(Signals { buy, sell })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn decline_triggers_buy() {
        let close: Vec<f64> = (0..40).map(|i| 100.0 - f64::from(i)).collect();
        let df = df! { "close" => close }.unwrap();
        let strategy = build(&defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.buy.iter().any(|b| *b));
        assert!(signals.sell.iter().all(|b| !b));
    }

    #[test]
    fn rally_triggers_sell() {
        let close: Vec<f64> = (0..40).map(|i| 10.0 + f64::from(i)).collect();
        let df = df! { "close" => close }.unwrap();
        let strategy = build(&defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.sell.iter().any(|b| *b));
        assert!(signals.buy.iter().all(|b| !b));
    }

    #[test]
    fn warm_up_is_silent() {
        let close: Vec<f64> = (0..10).map(|i| 100.0 - f64::from(i)).collect();
        let df = df! { "close" => close }.unwrap();
        let strategy = build(&defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.buy.iter().all(|b| !b));
        assert!(signals.sell.iter().all(|b| !b));
    }
}
