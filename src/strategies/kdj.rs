// KDJ-family strategies: weekly-J oversold, KDJ + Bollinger, KDJ + MACD.

use polars::prelude::DataFrame;

use super::helpers::series_or_compute;
use super::params::{require_float, require_window, ParamGrid, ParamMap, ParamValue};
use super::{make_params, Signals, Strategy};
use crate::data::csv::date_column;
use crate::error::Result;
use crate::indicators::{
    column_f64, momentum, overlap, volatility, weekly, IndicatorId, BOLL_STD, BOLL_WINDOW,
    KDJ_M1, KDJ_M2, KDJ_WINDOW,
};

/// Fraction of the band width treated as "near" a Bollinger band edge.
const BAND_PROXIMITY: f64 = 0.05;

fn daily_j(df: &DataFrame) -> Result<Vec<f64>> {
    series_or_compute(df, "DAILY_KDJ_J", |df| {
        let high = column_f64(df, "high")?;
        let low = column_f64(df, "low")?;
        let close = column_f64(df, "close")?;
        Ok(momentum::kdj(&high, &low, &close, KDJ_WINDOW, KDJ_M1, KDJ_M2).j)
    })
}

// --- Weekly-J oversold -----------------------------------------------------

/// Buys when the calendar-week J drops below the oversold line, sells when
/// it exceeds the overbought line. Weekly values come from completed weeks
/// only.
pub struct KdjOversold {
    j_oversold: f64,
    j_overbought: f64,
}

pub(super) fn oversold_defaults() -> ParamMap {
    make_params(&[
        ("j_oversold", ParamValue::Int(20)),
        ("j_overbought", ParamValue::Int(80)),
    ])
}

pub(super) fn oversold_grid() -> ParamGrid {
    ParamGrid::new(vec![
        (
            "j_oversold",
            [0, 5, 10, 15, 20, 25, 30].map(ParamValue::Int).to_vec(),
        ),
        (
            "j_overbought",
            [75, 80, 85, 90, 95, 100].map(ParamValue::Int).to_vec(),
        ),
    ])
}

pub(super) fn oversold_build(params: &ParamMap) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(KdjOversold {
        j_oversold: require_float(params, "j_oversold")?,
        j_overbought: require_float(params, "j_overbought")?,
    }))
}

impl Strategy for KdjOversold {
    fn name(&self) -> &'static str {
        "kdj_oversold"
    }

    fn params(&self) -> ParamMap {
        make_params(&[
            ("j_oversold", ParamValue::Float(self.j_oversold)),
            ("j_overbought", ParamValue::Float(self.j_overbought)),
        ])
    }

    fn required_indicators(&self) -> Vec<IndicatorId> {
        Vec::new()
    }

    fn signals(&self, df: &DataFrame) -> Result<Signals> {
        let dates = date_column(df)?;
        let open = column_f64(df, "open")?;
        let high = column_f64(df, "high")?;
        let low = column_f64(df, "low")?;
        let close = column_f64(df, "close")?;
        let volume = column_f64(df, "volume")?;
        let weekly = weekly::weekly_kdj(
            &dates, &open, &high, &low, &close, &volume, KDJ_WINDOW, KDJ_M1, KDJ_M2,
        );
        let buy = weekly.j.iter().map(|j| *j < self.j_oversold).collect();
        let sell = weekly.j.iter().map(|j| *j > self.j_overbought).collect();
        Ok(Signals { buy, sell })
    }
}

// --- KDJ + Bollinger -------------------------------------------------------

/// Oversold daily J near the lower band with a volume surge buys; the
/// mirrored condition at the upper band sells.
pub struct KdjBollinger {
    bb_period: usize,
    bb_std: f64,
    j_oversold: f64,
    j_overbought: f64,
    volume_multiplier: f64,
}

pub(super) fn bollinger_defaults() -> ParamMap {
    make_params(&[
        ("bb_period", ParamValue::Int(BOLL_WINDOW as i64)),
        ("bb_std", ParamValue::Float(BOLL_STD)),
        ("j_oversold", ParamValue::Int(20)),
        ("j_overbought", ParamValue::Int(80)),
        ("volume_multiplier", ParamValue::Float(1.5)),
    ])
}

pub(super) fn bollinger_grid() -> ParamGrid {
    ParamGrid::new(vec![
        ("bb_period", [15, 20, 25].map(ParamValue::Int).to_vec()),
        ("bb_std", [1.8, 2.0, 2.2].map(ParamValue::Float).to_vec()),
        ("j_oversold", [10, 15, 20, 25].map(ParamValue::Int).to_vec()),
        ("j_overbought", [75, 80, 85].map(ParamValue::Int).to_vec()),
        (
            "volume_multiplier",
            [1.0, 1.2, 1.5, 2.0].map(ParamValue::Float).to_vec(),
        ),
    ])
}

pub(super) fn bollinger_build(params: &ParamMap) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(KdjBollinger {
        bb_period: require_window(params, "bb_period")?,
        bb_std: require_float(params, "bb_std")?,
        j_oversold: require_float(params, "j_oversold")?,
        j_overbought: require_float(params, "j_overbought")?,
        volume_multiplier: require_float(params, "volume_multiplier")?,
    }))
}

impl Strategy for KdjBollinger {
    fn name(&self) -> &'static str {
        "kdj_bollinger"
    }

    fn params(&self) -> ParamMap {
        make_params(&[
            ("bb_period", ParamValue::Int(self.bb_period as i64)),
            ("bb_std", ParamValue::Float(self.bb_std)),
            ("j_oversold", ParamValue::Float(self.j_oversold)),
            ("j_overbought", ParamValue::Float(self.j_overbought)),
            ("volume_multiplier", ParamValue::Float(self.volume_multiplier)),
        ])
    }

    fn required_indicators(&self) -> Vec<IndicatorId> {
        vec![IndicatorId::KdjJ, IndicatorId::VolumeMa(5)]
    }

    fn signals(&self, df: &DataFrame) -> Result<Signals> {
        let close = column_f64(df, "close")?;
        let volume = column_f64(df, "volume")?;
        let j = daily_j(df)?;
        let bands = volatility::bollinger(&close, self.bb_period, self.bb_std);
        let vol_ma5 = series_or_compute(df, "VOLUME_MA5", |df| {
            Ok(overlap::sma(&column_f64(df, "volume")?, 5))
        })?;

        let n = close.len();
        let mut buy = vec![false; n];
        let mut sell = vec![false; n];
        for i in 0..n {
            if j[i].is_nan() || bands.upper[i].is_nan() || vol_ma5[i].is_nan() {
                continue;
            }
            let width = bands.upper[i] - bands.lower[i];
            let surge = volume[i] > vol_ma5[i] * self.volume_multiplier;
            buy[i] = j[i] < self.j_oversold
                && close[i] <= bands.lower[i] + BAND_PROXIMITY * width
                && surge;
            sell[i] = j[i] > self.j_overbought
                && close[i] >= bands.upper[i] - BAND_PROXIMITY * width
                && surge;
        }
        Ok(Signals { buy, sell })
    }
}

// --- KDJ + MACD ------------------------------------------------------------

/// Oversold daily J confirmed by bullish MACD momentum buys; the symmetric
/// condition sells.
pub struct KdjMacd {
    j_oversold: f64,
    j_overbought: f64,
    macd_fast: usize,
    macd_slow: usize,
    macd_signal: usize,
}

pub(super) fn macd_defaults() -> ParamMap {
    make_params(&[
        ("j_oversold", ParamValue::Int(20)),
        ("j_overbought", ParamValue::Int(80)),
        ("macd_fast", ParamValue::Int(12)),
        ("macd_slow", ParamValue::Int(26)),
        ("macd_signal", ParamValue::Int(9)),
    ])
}

pub(super) fn macd_grid() -> ParamGrid {
    ParamGrid::new(vec![
        ("j_oversold", [10, 15, 20, 25].map(ParamValue::Int).to_vec()),
        ("j_overbought", [75, 80, 85].map(ParamValue::Int).to_vec()),
        ("macd_fast", [8, 10, 12].map(ParamValue::Int).to_vec()),
        ("macd_slow", [24, 26, 30].map(ParamValue::Int).to_vec()),
        ("macd_signal", [6, 9, 12].map(ParamValue::Int).to_vec()),
    ])
}

pub(super) fn macd_build(params: &ParamMap) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(KdjMacd {
        j_oversold: require_float(params, "j_oversold")?,
        j_overbought: require_float(params, "j_overbought")?,
        macd_fast: require_window(params, "macd_fast")?,
        macd_slow: require_window(params, "macd_slow")?,
        macd_signal: require_window(params, "macd_signal")?,
    }))
}

impl Strategy for KdjMacd {
    fn name(&self) -> &'static str {
        "kdj_macd"
    }

    fn params(&self) -> ParamMap {
        make_params(&[
            ("j_oversold", ParamValue::Float(self.j_oversold)),
            ("j_overbought", ParamValue::Float(self.j_overbought)),
            ("macd_fast", ParamValue::Int(self.macd_fast as i64)),
            ("macd_slow", ParamValue::Int(self.macd_slow as i64)),
            ("macd_signal", ParamValue::Int(self.macd_signal as i64)),
        ])
    }

    fn required_indicators(&self) -> Vec<IndicatorId> {
        vec![IndicatorId::KdjJ]
    }

    fn signals(&self, df: &DataFrame) -> Result<Signals> {
        let close = column_f64(df, "close")?;
        let j = daily_j(df)?;
        let m = momentum::macd(&close, self.macd_fast, self.macd_slow, self.macd_signal);

        let n = close.len();
        let mut buy = vec![false; n];
        let mut sell = vec![false; n];
        for i in 0..n {
            if j[i].is_nan() || m.hist[i].is_nan() {
                continue;
            }
            buy[i] = j[i] < self.j_oversold && m.hist[i] > 0.0 && m.dif[i] > m.dea[i];
            sell[i] = j[i] > self.j_overbought && m.hist[i] < 0.0 && m.dif[i] < m.dea[i];
        }
        Ok(Signals { buy, sell })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};
    use polars::prelude::*;

    fn sample_frame(n: usize, close: impl Fn(usize) -> f64) -> DataFrame {
        let mut dates = Vec::with_capacity(n);
        let mut day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        while dates.len() < n {
            if day.weekday().num_days_from_monday() < 5 {
                dates.push(day);
            }
            day = day.succ_opt().unwrap();
        }
        let closes: Vec<f64> = (0..n).map(close).collect();
        let high: Vec<f64> = closes.iter().map(|v| v + 0.5).collect();
        let low: Vec<f64> = closes.iter().map(|v| v - 0.5).collect();
        df! {
            "date" => DateChunked::from_naive_date(PlSmallStr::from("date"), dates),
            "open" => closes.clone(),
            "high" => high,
            "low" => low,
            "close" => closes,
            "volume" => vec![100_000.0; n],
        }
        .unwrap()
    }

    #[test]
    fn weekly_oversold_buys_after_decline() {
        // A long decline pins the weekly J to the floor.
        let df = sample_frame(120, |i| 100.0 - 0.5 * i as f64);
        let strategy = oversold_build(&oversold_defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.buy.iter().any(|b| *b));
        assert!(signals.sell.iter().all(|b| !b));
    }

    #[test]
    fn weekly_overbought_sells_after_rally() {
        let df = sample_frame(120, |i| 10.0 + 0.5 * i as f64);
        let strategy = oversold_build(&oversold_defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.sell.iter().any(|b| *b));
        assert!(signals.buy.iter().all(|b| !b));
    }

    #[test]
    fn kdj_bollinger_requires_volume_surge() {
        // Without a volume surge the buy leg can never fire.
        let df = sample_frame(80, |i| if i < 60 { 20.0 } else { 20.0 - 0.8 * (i - 60) as f64 });
        let strategy = bollinger_build(&bollinger_defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.buy.iter().all(|b| !b));
    }

    #[test]
    fn kdj_macd_flat_series_is_silent() {
        let df = sample_frame(60, |_| 10.0);
        let strategy = macd_build(&macd_defaults()).unwrap();
        let signals = strategy.signals(&df).unwrap();
        assert!(signals.buy.iter().all(|b| !b));
        assert!(signals.sell.iter().all(|b| !b));
    }
}
