// Volatility studies: rolling standard deviation, Bollinger bands, ATR.

use super::overlap::sma;

/// Sample standard deviation (ddof = 1) over a trailing window.
/// Warm-up positions and windows containing NaN produce NaN.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window < 2 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = slice.iter().sum::<f64>() / window as f64;
        let var =
            slice.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (window as f64 - 1.0);
        out[i] = var.sqrt();
    }
    out
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger bands: middle = SMA(window), bands at +/- std_dev sample
/// standard deviations.
pub fn bollinger(close: &[f64], window: usize, std_dev: f64) -> Bollinger {
    let middle = sma(close, window);
    let std = rolling_std(close, window);
    let n = close.len();
    let upper: Vec<f64> = (0..n).map(|i| middle[i] + std[i] * std_dev).collect();
    let lower: Vec<f64> = (0..n).map(|i| middle[i] - std[i] * std_dev).collect();
    Bollinger { upper, middle, lower }
}

/// Average True Range: SMA of the true range. The first bar has no previous
/// close, so TR starts undefined and the ATR warm-up is window bars.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut tr = vec![f64::NAN; n];
    for i in 1..n {
        let high_low = high[i] - low[i];
        let high_close = (high[i] - close[i - 1]).abs();
        let low_close = (low[i] - close[i - 1]).abs();
        tr[i] = high_low.max(high_close).max(low_close);
    }
    sma(&tr, window)
}
