// Momentum oscillators: RSI, MACD, KDJ, Williams %R, MTM, CCI.

use super::overlap::{ema, ema_alpha, sma};

/// RSI over simple-averaged gains and losses. A zero average loss maps to
/// RSI = 100; warm-up positions are NaN.
pub fn rsi(close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = close[i] - close[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else {
            losses[i] = -delta;
        }
    }
    let avg_gain = sma(&gains, window);
    let avg_loss = sma(&losses, window);
    (0..n)
        .map(|i| {
            if avg_gain[i].is_nan() || avg_loss[i].is_nan() {
                f64::NAN
            } else if avg_loss[i] == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + avg_gain[i] / avg_loss[i])
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Macd {
    pub dif: Vec<f64>,
    pub dea: Vec<f64>,
    pub hist: Vec<f64>,
}

/// MACD: DIF = EMA(fast) - EMA(slow), DEA = EMA(DIF, signal),
/// HIST = (DIF - DEA) * 2.
pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let ema_fast = ema(close, fast);
    let ema_slow = ema(close, slow);
    let dif: Vec<f64> = (0..close.len()).map(|i| ema_fast[i] - ema_slow[i]).collect();
    let dea = ema(&dif, signal);
    let hist: Vec<f64> = (0..close.len()).map(|i| (dif[i] - dea[i]) * 2.0).collect();
    Macd { dif, dea, hist }
}

#[derive(Debug, Clone)]
pub struct Kdj {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
    pub j: Vec<f64>,
}

/// KDJ stochastic. RSV positions that are undefined (warm-up, or a flat
/// high/low window) carry the previous valid RSV forward; a leading gap
/// fills with 50. J is clipped to [-50, 150].
pub fn kdj(high: &[f64], low: &[f64], close: &[f64], window: usize, m1: usize, m2: usize) -> Kdj {
    let n = close.len();
    let lowest = rolling_min(low, window);
    let highest = rolling_max(high, window);

    let mut rsv = vec![f64::NAN; n];
    for i in 0..n {
        let range = highest[i] - lowest[i];
        if !highest[i].is_nan() && !lowest[i].is_nan() && range != 0.0 {
            rsv[i] = (close[i] - lowest[i]) / range * 100.0;
        }
    }
    let mut last = 50.0;
    for v in &mut rsv {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }

    let k = ema_alpha(&rsv, 1.0 / m1 as f64);
    let d = ema_alpha(&k, 1.0 / m2 as f64);
    let j: Vec<f64> = (0..n)
        .map(|i| (3.0 * k[i] - 2.0 * d[i]).clamp(-50.0, 150.0))
        .collect();
    Kdj { k, d, j }
}

/// Williams %R: (highest high - close) / (highest high - lowest low) * -100.
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let highest = rolling_max(high, window);
    let lowest = rolling_min(low, window);
    (0..n)
        .map(|i| {
            let range = highest[i] - lowest[i];
            if highest[i].is_nan() || lowest[i].is_nan() || range == 0.0 {
                f64::NAN
            } else {
                (highest[i] - close[i]) / range * -100.0
            }
        })
        .collect()
}

/// Momentum: close minus the close `window` bars earlier.
pub fn mtm(close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    (0..n)
        .map(|i| {
            if i < window {
                f64::NAN
            } else {
                close[i] - close[i - window]
            }
        })
        .collect()
}

/// Commodity Channel Index over the typical price, using the mean absolute
/// deviation within each window.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let typical: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
    let sma_tp = sma(&typical, window);
    let mut out = vec![f64::NAN; n];
    for i in 0..n {
        if i + 1 < window || sma_tp[i].is_nan() {
            continue;
        }
        let slice = &typical[i + 1 - window..=i];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let mad = slice.iter().map(|v| (v - mean).abs()).sum::<f64>() / window as f64;
        if mad != 0.0 {
            out[i] = (typical[i] - sma_tp[i]) / (0.015 * mad);
        }
    }
    out
}

pub(crate) fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling_extreme(values, window, f64::min)
}

pub(crate) fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling_extreme(values, window, f64::max)
}

fn rolling_extreme(values: &[f64], window: usize, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = slice.iter().copied().fold(slice[0], pick);
    }
    out
}
