// Dual moving-average crossover.

use polars::prelude::DataFrame;

use super::helpers::{cross_above, cross_below, series_or_compute};
use super::params::{require_window, ParamGrid, ParamMap, ParamValue};
use super::{make_params, Signals, Strategy};
use crate::error::Result;
use crate::indicators::{column_f64, overlap, IndicatorId};

/// Buys when the short MA crosses above the long MA, sells on the reverse
/// cross.
pub struct DualMa {
    short_period: usize,
    long_period: usize,
}

pub(super) fn defaults() -> ParamMap {
    make_params(&[
        ("short_period", ParamValue::Int(5)),
        ("long_period", ParamValue::Int(20)),
    ])
}

pub(super) fn grid() -> ParamGrid {
    ParamGrid::new(vec![
        (
            "short_period",
            [5, 10, 15, 20].map(ParamValue::Int).to_vec(),
        ),
        (
            "long_period",
            [30, 40, 50, 60, 90, 120].map(ParamValue::Int).to_vec(),
        ),
    ])
}

pub(super) fn build(params: &ParamMap) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(DualMa {
        short_period: require_window(params, "short_period")?,
        long_period: require_window(params, "long_period")?,
    }))
}

impl Strategy for DualMa {
    fn name(&self) -> &'static str {
        "dual_ma"
    }

    fn params(&self) -> ParamMap {
        make_params(&[
            ("short_period", ParamValue::Int(self.short_period as i64)),
            ("long_period", ParamValue::Int(self.long_period as i64)),
        ])
    }

    fn required_indicators(&self) -> Vec<IndicatorId> {
        vec![
            IndicatorId::Ma(self.short_period),
            IndicatorId::Ma(self.long_period),
        ]
    }

    fn signals(&self, df: &DataFrame) -> Result<Signals> {
        let short = series_or_compute(df, &format!("MA{}", self.short_period), |df| {
            Ok(overlap::sma(&column_f64(df, "close")?, self.short_period))
        })?;
        let long = series_or_compute(df, &format!("MA{}", self.long_period), |df| {
            Ok(overlap::sma(&column_f64(df, "close")?, self.long_period))
        })?;
        Ok(Signals {
            buy: cross_above(&short, &long),
            sell: cross_below(&short, &long),
        })
    }
}
