mod bollinger;
pub mod helpers;
mod kdj;
mod ma_cross;
mod macd_trend;
pub mod params;
mod rsi_reversal;
mod volume_breakout;

use polars::prelude::DataFrame;

use crate::error::{BacktestError, Result};
use crate::indicators::IndicatorId;
pub use params::{ParamGrid, ParamMap, ParamValue};

/// Aligned boolean buy/sell series, one entry per bar. A missing indicator
/// value never produces `true`.
#[derive(Debug, Clone)]
pub struct Signals {
    pub buy: Vec<bool>,
    pub sell: Vec<bool>,
}

/// A rule-based strategy bound to a concrete parameter assignment.
pub trait Strategy: Send + Sync {
    /// Stable identifier, also used as the registry key.
    fn name(&self) -> &'static str;

    /// The bound parameter assignment.
    fn params(&self) -> ParamMap;

    /// Indicator columns the data manager should guarantee before `signals`
    /// runs. Parameter-dependent series that have no standard column are
    /// computed inline instead.
    fn required_indicators(&self) -> Vec<IndicatorId>;

    /// Generate buy/sell series from an indicator-augmented frame.
    fn signals(&self, df: &DataFrame) -> Result<Signals>;
}

/// Registry entry: one prototype per strategy name.
pub struct StrategyInfo {
    pub name: &'static str,
    /// Label used in persisted per-metric reports.
    pub display_name: &'static str,
    pub default_params: fn() -> ParamMap,
    pub param_grid: fn() -> ParamGrid,
    build: fn(&ParamMap) -> Result<Box<dyn Strategy>>,
}

pub static CATALOG: &[StrategyInfo] = &[
    StrategyInfo {
        name: "dual_ma",
        display_name: "双均线策略",
        default_params: ma_cross::defaults,
        param_grid: ma_cross::grid,
        build: ma_cross::build,
    },
    StrategyInfo {
        name: "macd_trend",
        display_name: "MACD趋势策略",
        default_params: macd_trend::defaults,
        param_grid: macd_trend::grid,
        build: macd_trend::build,
    },
    StrategyInfo {
        name: "kdj_oversold",
        display_name: "KDJ超卖策略",
        default_params: kdj::oversold_defaults,
        param_grid: kdj::oversold_grid,
        build: kdj::oversold_build,
    },
    StrategyInfo {
        name: "kdj_bollinger",
        display_name: "KDJ布林带策略",
        default_params: kdj::bollinger_defaults,
        param_grid: kdj::bollinger_grid,
        build: kdj::bollinger_build,
    },
    StrategyInfo {
        name: "kdj_macd",
        display_name: "KDJ+MACD策略",
        default_params: kdj::macd_defaults,
        param_grid: kdj::macd_grid,
        build: kdj::macd_build,
    },
    StrategyInfo {
        name: "rsi_reversal",
        display_name: "RSI反转策略",
        default_params: rsi_reversal::defaults,
        param_grid: rsi_reversal::grid,
        build: rsi_reversal::build,
    },
    StrategyInfo {
        name: "bollinger",
        display_name: "布林带策略",
        default_params: bollinger::defaults,
        param_grid: bollinger::grid,
        build: bollinger::build,
    },
    StrategyInfo {
        name: "volume_breakout",
        display_name: "成交量突破策略",
        default_params: volume_breakout::defaults,
        param_grid: volume_breakout::grid,
        build: volume_breakout::build,
    },
    StrategyInfo {
        name: "bollinger_rsi",
        display_name: "布林带RSI反转策略",
        default_params: bollinger::rsi_defaults,
        param_grid: bollinger::rsi_grid,
        build: bollinger::rsi_build,
    },
];

pub fn find(name: &str) -> Option<&'static StrategyInfo> {
    CATALOG.iter().find(|s| s.name == name)
}

pub fn all_names() -> Vec<&'static str> {
    CATALOG.iter().map(|s| s.name).collect()
}

pub fn display_name(name: &str) -> &str {
    find(name).map_or(name, |s| s.display_name)
}

/// Defaults overridden by the caller's assignment. Unknown parameter names
/// are rejected rather than silently attached.
pub fn merged_params(info: &StrategyInfo, overrides: Option<&ParamMap>) -> Result<ParamMap> {
    let mut merged = (info.default_params)();
    if let Some(overrides) = overrides {
        for (name, value) in overrides {
            if !merged.contains_key(name) {
                return Err(BacktestError::ParamsInvalid(format!(
                    "strategy {} has no parameter {name}",
                    info.name
                )));
            }
            merged.insert(name.clone(), *value);
        }
    }
    Ok(merged)
}

/// Build a fresh strategy instance for `name`, merging `overrides` over the
/// prototype's defaults.
pub fn build(name: &str, overrides: Option<&ParamMap>) -> Result<Box<dyn Strategy>> {
    let info = find(name).ok_or_else(|| BacktestError::StrategyUnknown(name.to_string()))?;
    let merged = merged_params(info, overrides)?;
    (info.build)(&merged)
}

/// Cross-field parameter validity constraints. Direct callers surface the
/// error; the optimizer converts it into a sentinel score.
pub fn validate_params(name: &str, params: &ParamMap) -> Result<()> {
    let get = |key: &str| params.get(key).map(|v| v.as_float());
    let fail = |msg: String| Err(BacktestError::ParamsInvalid(msg));

    match name {
        "dual_ma" => {
            if let (Some(short), Some(long)) = (get("short_period"), get("long_period")) {
                if short >= long {
                    return fail(format!("short_period {short} must be below long_period {long}"));
                }
            }
        }
        "macd_trend" => {
            if let (Some(fast), Some(slow)) = (get("fast"), get("slow")) {
                if fast >= slow {
                    return fail(format!("fast {fast} must be below slow {slow}"));
                }
            }
        }
        "rsi_reversal" => {
            if let (Some(oversold), Some(overbought)) = (get("oversold"), get("overbought")) {
                if oversold >= overbought {
                    return fail(format!(
                        "oversold {oversold} must be below overbought {overbought}"
                    ));
                }
            }
            if get("oversold").is_some_and(|v| v > 40.0) {
                return fail("oversold must not exceed 40".to_string());
            }
            if get("overbought").is_some_and(|v| v < 60.0) {
                return fail("overbought must be at least 60".to_string());
            }
        }
        "bollinger" => {
            if get("period").is_some_and(|v| !(5.0..=200.0).contains(&v)) {
                return fail("period must be within [5, 200]".to_string());
            }
            if get("std_dev").is_some_and(|v| !(1.0..=3.0).contains(&v)) {
                return fail("std_dev must be within [1.0, 3.0]".to_string());
            }
        }
        "volume_breakout" => {
            if get("volume_multiplier").is_some_and(|v| !(1.0..=5.0).contains(&v)) {
                return fail("volume_multiplier must be within [1.0, 5.0]".to_string());
            }
        }
        _ => {}
    }
    Ok(())
}

pub(crate) fn make_params(entries: &[(&str, ParamValue)]) -> ParamMap {
    entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}
