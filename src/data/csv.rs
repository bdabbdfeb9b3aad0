use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::{BacktestError, Result};

/// Canonical column names after normalization.
pub const DATE_COL: &str = "date";
pub const OHLCV_COLS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Header aliases found in cleaned A-share dumps.
const RENAMES: [(&str, &str); 6] = [
    ("日期", "date"),
    ("开盘", "open"),
    ("最高", "high"),
    ("最低", "low"),
    ("收盘", "close"),
    ("成交量", "volume"),
];

/// Read a cleaned OHLCV CSV: normalize headers, parse the date column, cast
/// prices and any pre-existing indicator columns to f64, and sort ascending
/// by date. Duplicate or unparseable dates are schema errors.
pub fn read_ohlcv_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .map_err(|e| BacktestError::DataNotFound(format!("{}: {e}", path.display())))?;
    let options = CsvReadOptions::default().with_has_header(true);
    let mut df = CsvReader::new(file).with_options(options).finish()?;

    for (from, to) in RENAMES {
        if df.column(from).is_ok() {
            df.rename(from, to.into())?;
        }
    }

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(ToString::to_string)
        .collect();
    let mut missing: Vec<&str> = Vec::new();
    for required in std::iter::once(DATE_COL).chain(OHLCV_COLS) {
        if !names.iter().any(|n| n == required) {
            missing.push(required);
        }
    }
    if !missing.is_empty() {
        return Err(BacktestError::DataSchemaInvalid(format!(
            "{} is missing required columns: {}",
            path.display(),
            missing.join(", ")
        )));
    }

    // Everything except the date column is numeric.
    let mut lf = df.lazy().with_column(col(DATE_COL).cast(DataType::Date));
    for name in names.iter().filter(|n| n.as_str() != DATE_COL) {
        lf = lf.with_column(col(name.as_str()).cast(DataType::Float64));
    }
    let df = lf
        .sort([DATE_COL], SortMultipleOptions::default())
        .collect()?;

    if df.column(DATE_COL)?.null_count() > 0 {
        return Err(BacktestError::DataSchemaInvalid(format!(
            "{} has unparseable dates",
            path.display()
        )));
    }
    let dates = date_column(&df)?;
    for pair in dates.windows(2) {
        if pair[0] == pair[1] {
            return Err(BacktestError::DataSchemaInvalid(format!(
                "{} has duplicate date {}",
                path.display(),
                pair[0]
            )));
        }
    }

    Ok(df)
}

/// Extract the date column as `Vec<NaiveDate>`.
pub fn date_column(df: &DataFrame) -> Result<Vec<NaiveDate>> {
    let column = df.column(DATE_COL)?;
    let ca = column.date()?;
    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = ca.phys.get(i).ok_or_else(|| {
            BacktestError::DataSchemaInvalid(format!("null date at row {i}"))
        })?;
        // Epoch offset: days from CE to 1970-01-01.
        let date = NaiveDate::from_num_days_from_ce_opt(days + 719_163).ok_or_else(|| {
            BacktestError::DataSchemaInvalid(format!("invalid date at row {i}"))
        })?;
        out.push(date);
    }
    Ok(out)
}

/// Write a frame as CSV sorted descending by date (newest rows first), with
/// NaN cells emitted as empty.
pub fn write_csv_desc(path: &Path, df: &DataFrame) -> Result<()> {
    let mut out = df
        .clone()
        .lazy()
        .sort(
            [DATE_COL],
            SortMultipleOptions::default().with_order_descending(true),
        )
        .collect()?;
    out = nan_to_null(&out)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut out)?;
    Ok(())
}

/// Replace NaN with null in every float column so CSV cells come out empty.
pub fn nan_to_null(df: &DataFrame) -> Result<DataFrame> {
    let mut out = df.clone();
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(ToString::to_string)
        .collect();
    for name in names {
        let column = out.column(&name)?;
        if column.dtype() == &DataType::Float64 {
            let cleaned: Float64Chunked = column
                .f64()?
                .iter()
                .map(|opt| opt.filter(|v| !v.is_nan()))
                .collect();
            out.replace(&name, cleaned.with_name(name.as_str().into()).into_series().into())?;
        }
    }
    Ok(out)
}

fn valid_count(column: &Column) -> Result<usize> {
    let ca = column.cast(&DataType::Float64)?;
    Ok(ca
        .f64()?
        .iter()
        .filter(|opt| opt.is_some_and(|v| !v.is_nan()))
        .count())
}

/// Merge freshly augmented columns with what is already on disk without
/// destroying either side: for an indicator column present in both frames,
/// keep whichever side has more valid values, and where both carry some,
/// fill holes row by row. Columns only the disk side knows are carried over.
/// Both frames must be ascending and cover the same dates; otherwise the
/// fresh frame wins wholesale.
pub fn merge_preserving(fresh: &DataFrame, existing: &DataFrame) -> Result<DataFrame> {
    if fresh.height() != existing.height()
        || date_column(fresh)? != date_column(existing)?
    {
        tracing::warn!("on-disk frame no longer aligns; overwriting with fresh columns");
        return Ok(fresh.clone());
    }

    let mut merged = fresh.clone();
    let base: Vec<&str> = std::iter::once(DATE_COL).chain(OHLCV_COLS).collect();
    let existing_names: Vec<String> = existing
        .get_column_names()
        .iter()
        .map(ToString::to_string)
        .collect();

    for name in existing_names {
        let theirs = existing.column(&name)?;
        if merged.column(&name).is_err() {
            merged.with_column(theirs.as_materialized_series().clone().into())?;
            continue;
        }
        if base.contains(&name.as_str()) {
            continue;
        }
        let ours = merged.column(&name)?;
        let ours_valid = valid_count(ours)?;
        let theirs_valid = valid_count(theirs)?;
        if theirs_valid > ours_valid {
            merged.replace(&name, theirs.as_materialized_series().clone().into())?;
        } else if theirs_valid > 0 && ours_valid > 0 {
            let ours_ca = ours.cast(&DataType::Float64)?;
            let theirs_ca = theirs.cast(&DataType::Float64)?;
            let filled: Float64Chunked = ours_ca
                .f64()?
                .iter()
                .zip(theirs_ca.f64()?.iter())
                .map(|(a, b)| {
                    a.filter(|v| !v.is_nan())
                        .or_else(|| b.filter(|v| !v.is_nan()))
                })
                .collect();
            merged.replace(&name, filled.with_name(name.as_str().into()).into_series().into())?;
        }
    }

    Ok(merged)
}
