// Shared signal plumbing: column extraction and cross detection.

use polars::prelude::DataFrame;

use crate::error::Result;
use crate::indicators::column_f64;

/// Fetch a named column as `Vec<f64>` when present, otherwise compute it.
/// Lets strategies reuse pre-augmented columns without requiring them.
pub(super) fn series_or_compute(
    df: &DataFrame,
    name: &str,
    compute: impl FnOnce(&DataFrame) -> Result<Vec<f64>>,
) -> Result<Vec<f64>> {
    if df.column(name).is_ok() {
        column_f64(df, name)
    } else {
        compute(df)
    }
}

fn pair_valid(fast: &[f64], slow: &[f64], i: usize) -> bool {
    !fast[i].is_nan() && !slow[i].is_nan() && !fast[i - 1].is_nan() && !slow[i - 1].is_nan()
}

/// True on bars where `fast` moves from at-or-below `slow` to strictly above.
/// The first bar and any bar adjacent to missing values stay false.
pub(super) fn cross_above(fast: &[f64], slow: &[f64]) -> Vec<bool> {
    let n = fast.len();
    let mut out = vec![false; n];
    for i in 1..n {
        if pair_valid(fast, slow, i) {
            out[i] = fast[i] > slow[i] && fast[i - 1] <= slow[i - 1];
        }
    }
    out
}

/// True on bars where `fast` moves from at-or-above `slow` to strictly below.
pub(super) fn cross_below(fast: &[f64], slow: &[f64]) -> Vec<bool> {
    let n = fast.len();
    let mut out = vec![false; n];
    for i in 1..n {
        if pair_valid(fast, slow, i) {
            out[i] = fast[i] < slow[i] && fast[i - 1] >= slow[i - 1];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_above_fires_once_per_cross() {
        let fast = [1.0, 1.0, 2.0, 3.0, 1.0, 2.0];
        let slow = [1.5, 1.5, 1.5, 1.5, 1.5, 1.5];
        let out = cross_above(&fast, &slow);
        assert_eq!(out, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn cross_from_equal_counts() {
        // Gap moves from zero to positive: that is a cross.
        let fast = [1.0, 2.0];
        let slow = [1.0, 1.0];
        assert_eq!(cross_above(&fast, &slow), vec![false, true]);
    }

    #[test]
    fn nan_suppresses_cross() {
        let fast = [f64::NAN, 2.0, 1.0];
        let slow = [1.5, 1.5, 1.5];
        assert_eq!(cross_above(&fast, &slow), vec![false, false, false]);
        assert_eq!(cross_below(&fast, &slow), vec![false, false, true]);
    }
}
