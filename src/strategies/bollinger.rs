// Bollinger band strategies: plain band touch and the band + RSI reversal.

use polars::prelude::DataFrame;

use super::helpers::series_or_compute;
use super::params::{require_float, require_window, ParamGrid, ParamMap, ParamValue};
use super::{make_params, Signals, Strategy};
use crate::error::Result;
use crate::indicators::{
    column_f64, momentum, volatility, IndicatorId, BOLL_STD, BOLL_WINDOW, RSI_WINDOW,
};

/// Trailing window for ranking the current band width against recent history.
const WIDTH_LOOKBACK: usize = 100;

fn bands(df: &DataFrame, period: usize, std_dev: f64) -> Result<volatility::Bollinger> {
    // Standard columns encode the default 20/2.0 parameters only.
    if period == BOLL_WINDOW && (std_dev - BOLL_STD).abs() < f64::EPSILON {
        let upper = series_or_compute(df, "BOLL_UPPER", |df| {
            Ok(volatility::bollinger(&column_f64(df, "close")?, period, std_dev).upper)
        })?;
        let middle = series_or_compute(df, "BOLL_MIDDLE", |df| {
            Ok(volatility::bollinger(&column_f64(df, "close")?, period, std_dev).middle)
        })?;
        let lower = series_or_compute(df, "BOLL_LOWER", |df| {
            Ok(volatility::bollinger(&column_f64(df, "close")?, period, std_dev).lower)
        })?;
        return Ok(volatility::Bollinger { upper, middle, lower });
    }
    Ok(volatility::bollinger(&column_f64(df, "close")?, period, std_dev))
}

// --- Plain band touch ------------------------------------------------------

/// Buys a close below the lower band, sells a close above the upper band.
pub struct Bollinger {
    period: usize,
    std_dev: f64,
}

pub(super) fn defaults() -> ParamMap {
    make_params(&[
        ("period", ParamValue::Int(BOLL_WINDOW as i64)),
        ("std_dev", ParamValue::Float(BOLL_STD)),
    ])
}

pub(super) fn grid() -> ParamGrid {
    ParamGrid::new(vec![
        ("period", [15, 20, 25, 30, 40].map(ParamValue::Int).to_vec()),
        (
            "std_dev",
            [1.8, 2.0, 2.2, 2.5].map(ParamValue::Float).to_vec(),
        ),
    ])
}

pub(super) fn build(params: &ParamMap) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(Bollinger {
        period: require_window(params, "period")?,
        std_dev: require_float(params, "std_dev")?,
    }))
}

impl Strategy for Bollinger {
    fn name(&self) -> &'static str {
        "bollinger"
    }

    fn params(&self) -> ParamMap {
        make_params(&[
            ("period", ParamValue::Int(self.period as i64)),
            ("std_dev", ParamValue::Float(self.std_dev)),
        ])
    }

    fn required_indicators(&self) -> Vec<IndicatorId> {
        if self.period == BOLL_WINDOW && (self.std_dev - BOLL_STD).abs() < f64::EPSILON {
            vec![
                IndicatorId::BollUpper,
                IndicatorId::BollMiddle,
                IndicatorId::BollLower,
            ]
        } else {
            Vec::new()
        }
    }

    fn signals(&self, df: &DataFrame) -> Result<Signals> {
        let close = column_f64(df, "close")?;
        let bands = bands(df, self.period, self.std_dev)?;
        let n = close.len();
        let buy = (0..n)
            .map(|i| !bands.lower[i].is_nan() && close[i] < bands.lower[i])
            .collect();
        let sell = (0..n)
            .map(|i| !bands.upper[i].is_nan() && close[i] > bands.upper[i])
            .collect();
        Ok(Signals { buy, sell })
    }
}

// --- Band + RSI reversal ---------------------------------------------------

/// Buys a lower-band touch confirmed by an oversold RSI while the band width
/// sits in the narrowest decile of its recent history; sells at the upper
/// band.
pub struct BollingerRsi {
    bb_period: usize,
    std_dev: f64,
    rsi_period: usize,
    oversold: f64,
}

pub(super) fn rsi_defaults() -> ParamMap {
    make_params(&[
        ("bb_period", ParamValue::Int(BOLL_WINDOW as i64)),
        ("std_dev", ParamValue::Float(BOLL_STD)),
        ("rsi_period", ParamValue::Int(RSI_WINDOW as i64)),
        ("oversold", ParamValue::Int(30)),
    ])
}

pub(super) fn rsi_grid() -> ParamGrid {
    ParamGrid::new(vec![
        ("bb_period", [15, 20, 25].map(ParamValue::Int).to_vec()),
        ("std_dev", [1.8, 2.0, 2.2].map(ParamValue::Float).to_vec()),
        ("rsi_period", [10, 14, 21].map(ParamValue::Int).to_vec()),
        ("oversold", [25, 30, 35].map(ParamValue::Int).to_vec()),
    ])
}

pub(super) fn rsi_build(params: &ParamMap) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(BollingerRsi {
        bb_period: require_window(params, "bb_period")?,
        std_dev: require_float(params, "std_dev")?,
        rsi_period: require_window(params, "rsi_period")?,
        oversold: require_float(params, "oversold")?,
    }))
}

/// Fraction of trailing band-width values strictly below the current one.
/// NaN where the current width is undefined.
fn width_percentile(width: &[f64]) -> Vec<f64> {
    let n = width.len();
    let mut out = vec![f64::NAN; n];
    for i in 0..n {
        if width[i].is_nan() {
            continue;
        }
        let lo = i.saturating_sub(WIDTH_LOOKBACK - 1);
        let window: Vec<f64> = width[lo..=i].iter().copied().filter(|v| !v.is_nan()).collect();
        if window.is_empty() {
            continue;
        }
        let below = window.iter().filter(|v| **v < width[i]).count();
        out[i] = below as f64 / window.len() as f64;
    }
    out
}

impl Strategy for BollingerRsi {
    fn name(&self) -> &'static str {
        "bollinger_rsi"
    }

    fn params(&self) -> ParamMap {
        make_params(&[
            ("bb_period", ParamValue::Int(self.bb_period as i64)),
            ("std_dev", ParamValue::Float(self.std_dev)),
            ("rsi_period", ParamValue::Int(self.rsi_period as i64)),
            ("oversold", ParamValue::Float(self.oversold)),
        ])
    }

    fn required_indicators(&self) -> Vec<IndicatorId> {
        let mut required = Vec::new();
        if self.rsi_period == RSI_WINDOW {
            required.push(IndicatorId::Rsi);
        }
        required
    }

    fn signals(&self, df: &DataFrame) -> Result<Signals> {
        let close = column_f64(df, "close")?;
        let bands = bands(df, self.bb_period, self.std_dev)?;
        let rsi = if self.rsi_period == RSI_WINDOW {
            series_or_compute(df, "RSI", |df| {
                Ok(momentum::rsi(&column_f64(df, "close")?, RSI_WINDOW))
            })?
        } else {
            momentum::rsi(&close, self.rsi_period)
        };

        let n = close.len();
        let width: Vec<f64> = (0..n)
            .map(|i| {
                if bands.middle[i].is_nan() || bands.middle[i] == 0.0 {
                    f64::NAN
                } else {
                    (bands.upper[i] - bands.lower[i]) / bands.middle[i]
                }
            })
            .collect();
        let percentile = width_percentile(&width);

        let mut buy = vec![false; n];
        let mut sell = vec![false; n];
        for i in 0..n {
            if bands.lower[i].is_nan() || rsi[i].is_nan() {
                continue;
            }
            buy[i] =
                close[i] <= bands.lower[i] && rsi[i] < self.oversold && percentile[i] <= 0.10;
            sell[i] = close[i] >= bands.upper[i];
        }
        Ok(Signals { buy, sell })
    }
}
