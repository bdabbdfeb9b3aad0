use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// A single strategy parameter value. Grids and optimizer output only ever
/// carry numbers; integer-looking floats are accepted wherever an integer is
/// expected (optimizers and CSV round-trips blur the distinction), so
/// equality is numeric across the two representations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        self.as_float() == other.as_float()
    }
}

impl ParamValue {
    pub fn as_int(self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i64),
            Self::Float(_) => None,
        }
    }

    pub fn as_float(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Integer window/period, rejecting non-positive values.
    pub fn as_window(self) -> Option<usize> {
        self.as_int().filter(|v| *v > 0).map(|v| v as usize)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{:.2}", (v * 100.0).round() / 100.0),
        }
    }
}

/// A concrete parameter assignment, keyed by parameter name.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Per-strategy grid of discrete candidate values, in declaration order.
/// The declaration order is also the column order used when parameters are
/// rendered as a list.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid {
    pub dims: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    pub fn new(dims: Vec<(&str, Vec<ParamValue>)>) -> Self {
        Self {
            dims: dims
                .into_iter()
                .map(|(name, values)| (name.to_string(), values))
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.dims.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }
}

/// Integer-window parameter names are recognised by substring, matching the
/// persisted best-params convention.
pub fn is_window_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["period", "window", "length"]
        .iter()
        .any(|k| lower.contains(k))
}

/// Render a parameter assignment as a list string ordered by the grid's
/// declared dimensions, e.g. `[5, 30]`. Parameters outside the grid are
/// appended in name order.
pub fn format_params_as_list(grid: &ParamGrid, params: &ParamMap) -> String {
    if params.is_empty() {
        return "[N/A]".to_string();
    }
    let mut rendered: Vec<String> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    for (name, _) in &grid.dims {
        if let Some(value) = params.get(name) {
            rendered.push(value.to_string());
            seen.push(name);
        }
    }
    for (name, value) in params {
        if !seen.contains(&name.as_str()) {
            rendered.push(value.to_string());
        }
    }
    format!("[{}]", rendered.join(", "))
}

/// Pull an integer parameter out of a map, surfacing a typed error.
pub fn require_window(params: &ParamMap, name: &str) -> Result<usize> {
    params
        .get(name)
        .ok_or_else(|| BacktestError::ParamsInvalid(format!("missing parameter {name}")))?
        .as_window()
        .ok_or_else(|| {
            BacktestError::ParamsInvalid(format!("{name} must be a positive integer"))
        })
}

pub fn require_float(params: &ParamMap, name: &str) -> Result<f64> {
    params
        .get(name)
        .map(|v| v.as_float())
        .ok_or_else(|| BacktestError::ParamsInvalid(format!("missing parameter {name}")))
}
