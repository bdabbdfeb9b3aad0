// Calendar-week resampling and the weekly KDJ used by the oversold strategy.

use chrono::{NaiveDate, Weekday};

use super::momentum::{kdj, Kdj};

/// One calendar-week bar aggregated from daily bars
/// (open first, high max, low min, close last, volume sum).
#[derive(Debug, Clone)]
pub struct WeeklyBar {
    /// Last calendar day of the week (Sunday for Monday-started weeks).
    pub label: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Group daily bars into calendar weeks starting Monday. Dates must be
/// ascending; each week is labelled with its calendar end so that every
/// trading day inside the week sorts strictly before the label.
pub fn resample_weekly(
    dates: &[NaiveDate],
    open: &[f64],
    high: &[f64],
    low: &[f64],
    close: &[f64],
    volume: &[f64],
) -> Vec<WeeklyBar> {
    let mut weeks: Vec<WeeklyBar> = Vec::new();
    for i in 0..dates.len() {
        let label = dates[i].week(Weekday::Mon).last_day();
        match weeks.last_mut() {
            Some(week) if week.label == label => {
                week.high = week.high.max(high[i]);
                week.low = week.low.min(low[i]);
                week.close = close[i];
                week.volume += volume[i];
            }
            _ => weeks.push(WeeklyBar {
                label,
                open: open[i],
                high: high[i],
                low: low[i],
                close: close[i],
                volume: volume[i],
            }),
        }
    }
    weeks
}

/// KDJ computed on the calendar-week series, aligned back to the daily index.
/// A daily bar receives the most recent weekly value whose label is on or
/// before the bar date, i.e. always a completed week; bars before the first
/// completed week are NaN. No bar ever observes its own (unfinished) week.
pub fn weekly_kdj(
    dates: &[NaiveDate],
    open: &[f64],
    high: &[f64],
    low: &[f64],
    close: &[f64],
    volume: &[f64],
    window: usize,
    m1: usize,
    m2: usize,
) -> Kdj {
    let weeks = resample_weekly(dates, open, high, low, close, volume);
    let w_high: Vec<f64> = weeks.iter().map(|w| w.high).collect();
    let w_low: Vec<f64> = weeks.iter().map(|w| w.low).collect();
    let w_close: Vec<f64> = weeks.iter().map(|w| w.close).collect();
    let weekly = kdj(&w_high, &w_low, &w_close, window, m1, m2);

    let n = dates.len();
    let mut k = vec![f64::NAN; n];
    let mut d = vec![f64::NAN; n];
    let mut j = vec![f64::NAN; n];
    let mut cursor = 0usize;
    for i in 0..n {
        while cursor < weeks.len() && weeks[cursor].label <= dates[i] {
            cursor += 1;
        }
        if cursor > 0 {
            k[i] = weekly.k[cursor - 1];
            d[i] = weekly.d[cursor - 1];
            j[i] = weekly.j[cursor - 1];
        }
    }
    Kdj { k, d, j }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn trading_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
        let mut out = Vec::with_capacity(count);
        let mut day = start;
        while out.len() < count {
            if day.weekday().num_days_from_monday() < 5 {
                out.push(day);
            }
            day = day.succ_opt().unwrap();
        }
        out
    }

    #[test]
    fn resample_aggregates_within_week() {
        // Mon 2024-01-01 .. Fri 2024-01-05 is one calendar week.
        let dates = trading_days(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 5);
        let open = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let high = vec![11.0, 12.0, 15.0, 14.0, 14.5];
        let low = vec![9.0, 10.0, 11.0, 8.0, 13.0];
        let close = vec![10.5, 11.5, 12.5, 13.5, 14.2];
        let volume = vec![100.0, 100.0, 100.0, 100.0, 100.0];
        let weeks = resample_weekly(&dates, &open, &high, &low, &close, &volume);
        assert_eq!(weeks.len(), 1);
        let w = &weeks[0];
        assert!((w.open - 10.0).abs() < 1e-12);
        assert!((w.high - 15.0).abs() < 1e-12);
        assert!((w.low - 8.0).abs() < 1e-12);
        assert!((w.close - 14.2).abs() < 1e-12);
        assert!((w.volume - 500.0).abs() < 1e-12);
        assert_eq!(w.label, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
    }

    #[test]
    fn daily_alignment_only_sees_completed_weeks() {
        let dates = trading_days(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 15);
        let n = dates.len();
        let open: Vec<f64> = (0..n).map(|i| 10.0 + i as f64).collect();
        let close = open.clone();
        let high: Vec<f64> = open.iter().map(|v| v + 1.0).collect();
        let low: Vec<f64> = open.iter().map(|v| v - 1.0).collect();
        let volume = vec![100.0; n];
        let out = weekly_kdj(&dates, &open, &high, &low, &close, &volume, 2, 3, 3);
        // First five trading days belong to the first, not-yet-completed week.
        for i in 0..5 {
            assert!(out.j[i].is_nan(), "day {i} should not see its own week");
        }
        // Second week sees the first week's value.
        assert!(!out.j[5].is_nan());
    }
}
