// Volume-confirmed breakout.

use polars::prelude::DataFrame;

use super::helpers::series_or_compute;
use super::params::{require_float, require_window, ParamGrid, ParamMap, ParamValue};
use super::{make_params, Signals, Strategy};
use crate::error::Result;
use crate::indicators::{column_f64, overlap, IndicatorId};

/// Buys when volume surges past its moving average on a rising close, sells
/// when volume dries up on a falling close.
pub struct VolumeBreakout {
    volume_period: usize,
    volume_multiplier: f64,
}

pub(super) fn defaults() -> ParamMap {
    make_params(&[
        ("volume_period", ParamValue::Int(20)),
        ("volume_multiplier", ParamValue::Float(2.0)),
    ])
}

pub(super) fn grid() -> ParamGrid {
    ParamGrid::new(vec![
        ("volume_period", [5, 10, 20, 30].map(ParamValue::Int).to_vec()),
        (
            "volume_multiplier",
            [1.5, 2.0, 2.5, 3.0].map(ParamValue::Float).to_vec(),
        ),
    ])
}

pub(super) fn build(params: &ParamMap) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(VolumeBreakout {
        volume_period: require_window(params, "volume_period")?,
        volume_multiplier: require_float(params, "volume_multiplier")?,
    }))
}

impl Strategy for VolumeBreakout {
    fn name(&self) -> &'static str {
        "volume_breakout"
    }

    fn params(&self) -> ParamMap {
        make_params(&[
            ("volume_period", ParamValue::Int(self.volume_period as i64)),
            ("volume_multiplier", ParamValue::Float(self.volume_multiplier)),
        ])
    }

    fn required_indicators(&self) -> Vec<IndicatorId> {
        vec![IndicatorId::VolumeMa(self.volume_period)]
    }

    fn signals(&self, df: &DataFrame) -> Result<Signals> {
        let close = column_f64(df, "close")?;
        let volume = column_f64(df, "volume")?;
        let vol_ma = series_or_compute(df, &format!("VOLUME_MA{}", self.volume_period), |df| {
            Ok(overlap::sma(&column_f64(df, "volume")?, self.volume_period))
        })?;

        let n = close.len();
        let mut buy = vec![false; n];
        let mut sell = vec![false; n];
        for i in 1..n {
            if vol_ma[i].is_nan() {
                continue;
            }
            buy[i] =
                volume[i] > vol_ma[i] * self.volume_multiplier && close[i] > close[i - 1];
            sell[i] = volume[i] < vol_ma[i] && close[i] < close[i - 1];
        }
        Ok(Signals { buy, sell })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn surge_on_rising_close_buys() {
        let n = 30;
        let mut volume = vec![1000.0; n];
        volume[n - 1] = 5000.0;
        let close: Vec<f64> = (0..n).map(|i| 10.0 + 0.01 * i as f64).collect();
        let df = df! { "close" => close, "volume" => volume }.unwrap();
        let strategy = build(&defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.buy[n - 1]);
    }

    #[test]
    fn dry_up_on_falling_close_sells() {
        let n = 30;
        let mut volume = vec![1000.0; n];
        volume[n - 1] = 200.0;
        let close: Vec<f64> = (0..n).map(|i| 20.0 - 0.01 * i as f64).collect();
        let df = df! { "close" => close, "volume" => volume }.unwrap();
        let strategy = build(&defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.sell[n - 1]);
    }

    #[test]
    fn warm_up_is_silent() {
        let df = df! {
            "close" => [10.0, 11.0, 12.0],
            "volume" => [1000.0, 9000.0, 9000.0],
        }
        .unwrap();
        let strategy = build(&defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.buy.iter().all(|b| !b));
        assert!(signals.sell.iter().all(|b| !b));
    }
}
