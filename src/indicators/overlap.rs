// Overlap studies: moving averages and the BBI composite.

/// Simple moving average over a trailing window. Warm-up positions and any
/// window containing NaN produce NaN.
pub fn sma(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    let mut sum = 0.0;
    let mut nan_in_window = 0usize;
    for i in 0..n {
        let v = values[i];
        if v.is_nan() {
            nan_in_window += 1;
        } else {
            sum += v;
        }
        if i >= window {
            let old = values[i - window];
            if old.is_nan() {
                nan_in_window -= 1;
            } else {
                sum -= old;
            }
        }
        if i + 1 >= window && nan_in_window == 0 {
            out[i] = sum / window as f64;
        }
    }
    out
}

/// Exponential moving average with span semantics: alpha = 2 / (window + 1),
/// seeded with the first value.
pub fn ema(values: &[f64], window: usize) -> Vec<f64> {
    ema_alpha(values, 2.0 / (window as f64 + 1.0))
}

/// EMA with an explicit smoothing factor, seeded with the first value.
/// A NaN input poisons the remainder of the series.
pub fn ema_alpha(values: &[f64], alpha: f64) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if n == 0 {
        return out;
    }
    out[0] = values[0];
    for i in 1..n {
        out[i] = alpha * values[i] + (1.0 - alpha) * out[i - 1];
    }
    out
}

/// BBI (Bull and Bear Index): mean of the 3/6/12/24-day SMAs.
pub fn bbi(close: &[f64]) -> Vec<f64> {
    let ma3 = sma(close, 3);
    let ma6 = sma(close, 6);
    let ma12 = sma(close, 12);
    let ma24 = sma(close, 24);
    (0..close.len())
        .map(|i| (ma3[i] + ma6[i] + ma12[i] + ma24[i]) / 4.0)
        .collect()
}
