pub mod momentum;
pub mod overlap;
pub mod volatility;
pub mod volume;
pub mod weekly;

use polars::prelude::*;

use crate::error::{BacktestError, Result};

// Default windows, matching the data pipeline's standard column set.
pub const RSI_WINDOW: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const KDJ_WINDOW: usize = 9;
pub const KDJ_M1: usize = 3;
pub const KDJ_M2: usize = 3;
pub const BOLL_WINDOW: usize = 20;
pub const BOLL_STD: f64 = 2.0;
pub const ATR_WINDOW: usize = 14;
pub const CCI_WINDOW: usize = 20;
pub const WR_WINDOW: usize = 14;
pub const MTM_WINDOW: usize = 12;

/// Closed set of derived series a data frame can carry. Window-parameterised
/// families (`MA{n}`, `EMA{n}`, `VOLUME_MA{n}`) encode the window in the
/// variant; everything else uses the default windows above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorId {
    Ma(usize),
    Ema(usize),
    VolumeMa(usize),
    Rsi,
    MacdDif,
    MacdDea,
    MacdHist,
    KdjK,
    KdjD,
    KdjJ,
    BollUpper,
    BollMiddle,
    BollLower,
    Atr,
    Bbi,
    Cci,
    Wr,
    Mtm,
    Obv,
}

impl IndicatorId {
    /// Parse a column name. `MA`/`EMA`/`VOLUME_MA` names are parsed
    /// structurally: the integer suffix yields the window. Unknown names are
    /// rejected.
    pub fn parse(name: &str) -> Result<Self> {
        let fixed = match name {
            "RSI" => Some(Self::Rsi),
            "MACD_DIF" => Some(Self::MacdDif),
            "MACD_DEA" => Some(Self::MacdDea),
            "MACD_HIST" => Some(Self::MacdHist),
            "DAILY_KDJ_K" => Some(Self::KdjK),
            "DAILY_KDJ_D" => Some(Self::KdjD),
            "DAILY_KDJ_J" => Some(Self::KdjJ),
            "BOLL_UPPER" => Some(Self::BollUpper),
            "BOLL_MIDDLE" => Some(Self::BollMiddle),
            "BOLL_LOWER" => Some(Self::BollLower),
            "ATR" => Some(Self::Atr),
            "BBI" => Some(Self::Bbi),
            "CCI" => Some(Self::Cci),
            "WR" => Some(Self::Wr),
            "MTM" => Some(Self::Mtm),
            "OBV" => Some(Self::Obv),
            _ => None,
        };
        if let Some(id) = fixed {
            return Ok(id);
        }
        if let Some(window) = parse_window(name, "VOLUME_MA") {
            return Ok(Self::VolumeMa(window));
        }
        if let Some(window) = parse_window(name, "EMA") {
            return Ok(Self::Ema(window));
        }
        if let Some(window) = parse_window(name, "MA") {
            return Ok(Self::Ma(window));
        }
        Err(BacktestError::DataSchemaInvalid(format!(
            "unknown indicator: {name}"
        )))
    }

    pub fn column_name(self) -> String {
        match self {
            Self::Ma(w) => format!("MA{w}"),
            Self::Ema(w) => format!("EMA{w}"),
            Self::VolumeMa(w) => format!("VOLUME_MA{w}"),
            Self::Rsi => "RSI".into(),
            Self::MacdDif => "MACD_DIF".into(),
            Self::MacdDea => "MACD_DEA".into(),
            Self::MacdHist => "MACD_HIST".into(),
            Self::KdjK => "DAILY_KDJ_K".into(),
            Self::KdjD => "DAILY_KDJ_D".into(),
            Self::KdjJ => "DAILY_KDJ_J".into(),
            Self::BollUpper => "BOLL_UPPER".into(),
            Self::BollMiddle => "BOLL_MIDDLE".into(),
            Self::BollLower => "BOLL_LOWER".into(),
            Self::Atr => "ATR".into(),
            Self::Bbi => "BBI".into(),
            Self::Cci => "CCI".into(),
            Self::Wr => "WR".into(),
            Self::Mtm => "MTM".into(),
            Self::Obv => "OBV".into(),
        }
    }

    /// The standard column set the data pipeline maintains for every symbol.
    pub fn standard_set() -> Vec<Self> {
        vec![
            Self::Ma(5),
            Self::Ma(10),
            Self::Ma(20),
            Self::Ma(30),
            Self::Ma(60),
            Self::Ma(120),
            Self::Ema(12),
            Self::Ema(26),
            Self::VolumeMa(5),
            Self::VolumeMa(10),
            Self::VolumeMa(20),
            Self::Rsi,
            Self::MacdDif,
            Self::MacdDea,
            Self::MacdHist,
            Self::KdjK,
            Self::KdjD,
            Self::KdjJ,
            Self::BollUpper,
            Self::BollMiddle,
            Self::BollLower,
            Self::Atr,
            Self::Bbi,
            Self::Cci,
            Self::Wr,
            Self::Mtm,
            Self::Obv,
        ]
    }
}

fn parse_window(name: &str, prefix: &str) -> Option<usize> {
    let suffix = name.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Extract a column as `Vec<f64>`, casting if needed and mapping nulls to NaN.
pub fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let casted = df.column(name)?.cast(&DataType::Float64)?;
    let ca = casted.f64()?;
    Ok(ca.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Compute the requested indicator columns that are not already present and
/// append them to the frame. Families (MACD, KDJ, Bollinger) are computed
/// once per family. Returns the names of the columns that were added.
pub fn augment(df: &mut DataFrame, required: &[IndicatorId]) -> Result<Vec<String>> {
    let existing: std::collections::HashSet<String> = df
        .get_column_names()
        .iter()
        .map(ToString::to_string)
        .collect();
    let missing: Vec<IndicatorId> = required
        .iter()
        .copied()
        .filter(|id| !existing.contains(&id.column_name()))
        .collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let close = column_f64(df, "close")?;
    let mut added = Vec::new();
    let mut push = |df: &mut DataFrame, name: String, values: Vec<f64>| -> Result<()> {
        df.with_column(Series::new(name.as_str().into(), values).into())?;
        added.push(name);
        Ok(())
    };

    if missing
        .iter()
        .any(|id| matches!(id, IndicatorId::MacdDif | IndicatorId::MacdDea | IndicatorId::MacdHist))
    {
        let m = momentum::macd(&close, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
        for (id, values) in [
            (IndicatorId::MacdDif, m.dif),
            (IndicatorId::MacdDea, m.dea),
            (IndicatorId::MacdHist, m.hist),
        ] {
            if missing.contains(&id) {
                push(df, id.column_name(), values)?;
            }
        }
    }

    if missing
        .iter()
        .any(|id| matches!(id, IndicatorId::KdjK | IndicatorId::KdjD | IndicatorId::KdjJ))
    {
        let high = column_f64(df, "high")?;
        let low = column_f64(df, "low")?;
        let k = momentum::kdj(&high, &low, &close, KDJ_WINDOW, KDJ_M1, KDJ_M2);
        for (id, values) in [
            (IndicatorId::KdjK, k.k),
            (IndicatorId::KdjD, k.d),
            (IndicatorId::KdjJ, k.j),
        ] {
            if missing.contains(&id) {
                push(df, id.column_name(), values)?;
            }
        }
    }

    if missing.iter().any(|id| {
        matches!(
            id,
            IndicatorId::BollUpper | IndicatorId::BollMiddle | IndicatorId::BollLower
        )
    }) {
        let b = volatility::bollinger(&close, BOLL_WINDOW, BOLL_STD);
        for (id, values) in [
            (IndicatorId::BollUpper, b.upper),
            (IndicatorId::BollMiddle, b.middle),
            (IndicatorId::BollLower, b.lower),
        ] {
            if missing.contains(&id) {
                push(df, id.column_name(), values)?;
            }
        }
    }

    for id in &missing {
        match *id {
            IndicatorId::Ma(w) => {
                push(df, id.column_name(), overlap::sma(&close, w))?;
            }
            IndicatorId::Ema(w) => {
                push(df, id.column_name(), overlap::ema(&close, w))?;
            }
            IndicatorId::VolumeMa(w) => {
                let vol = column_f64(df, "volume")?;
                push(df, id.column_name(), overlap::sma(&vol, w))?;
            }
            IndicatorId::Rsi => {
                push(df, id.column_name(), momentum::rsi(&close, RSI_WINDOW))?;
            }
            IndicatorId::Atr => {
                let high = column_f64(df, "high")?;
                let low = column_f64(df, "low")?;
                push(df, id.column_name(), volatility::atr(&high, &low, &close, ATR_WINDOW))?;
            }
            IndicatorId::Cci => {
                let high = column_f64(df, "high")?;
                let low = column_f64(df, "low")?;
                push(df, id.column_name(), momentum::cci(&high, &low, &close, CCI_WINDOW))?;
            }
            IndicatorId::Wr => {
                let high = column_f64(df, "high")?;
                let low = column_f64(df, "low")?;
                push(
                    df,
                    id.column_name(),
                    momentum::williams_r(&high, &low, &close, WR_WINDOW),
                )?;
            }
            IndicatorId::Mtm => {
                push(df, id.column_name(), momentum::mtm(&close, MTM_WINDOW))?;
            }
            IndicatorId::Bbi => {
                push(df, id.column_name(), overlap::bbi(&close))?;
            }
            IndicatorId::Obv => {
                let vol = column_f64(df, "volume")?;
                push(df, id.column_name(), volume::obv(&close, &vol))?;
            }
            // Families handled above.
            IndicatorId::MacdDif
            | IndicatorId::MacdDea
            | IndicatorId::MacdHist
            | IndicatorId::KdjK
            | IndicatorId::KdjD
            | IndicatorId::KdjJ
            | IndicatorId::BollUpper
            | IndicatorId::BollMiddle
            | IndicatorId::BollLower => {}
        }
    }

    tracing::debug!(added = added.len(), "computed missing indicator columns");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        let n = 40;
        let close: Vec<f64> = (0..n).map(|i| 10.0 + 0.1 * f64::from(i)).collect();
        let high: Vec<f64> = close.iter().map(|v| v + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|v| v - 0.5).collect();
        let volume: Vec<f64> = (0..n).map(|i| 1000.0 + 10.0 * f64::from(i)).collect();
        df! {
            "open" => close.clone(),
            "high" => high,
            "low" => low,
            "close" => close,
            "volume" => volume,
        }
        .unwrap()
    }

    #[test]
    fn parse_structural_names() {
        assert_eq!(IndicatorId::parse("MA20").unwrap(), IndicatorId::Ma(20));
        assert_eq!(IndicatorId::parse("EMA12").unwrap(), IndicatorId::Ema(12));
        assert_eq!(
            IndicatorId::parse("VOLUME_MA5").unwrap(),
            IndicatorId::VolumeMa(5)
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(IndicatorId::parse("MAX").is_err());
        assert!(IndicatorId::parse("MA").is_err());
        assert!(IndicatorId::parse("SUPERTREND").is_err());
    }

    #[test]
    fn parse_round_trips_column_names() {
        for id in IndicatorId::standard_set() {
            assert_eq!(IndicatorId::parse(&id.column_name()).unwrap(), id);
        }
    }

    #[test]
    fn augment_adds_only_missing() {
        let mut df = sample_df();
        let added = augment(&mut df, &[IndicatorId::Ma(5), IndicatorId::Rsi]).unwrap();
        assert_eq!(added, vec!["MA5".to_string(), "RSI".to_string()]);

        // Second call is a no-op for the same set.
        let added = augment(&mut df, &[IndicatorId::Ma(5), IndicatorId::Rsi]).unwrap();
        assert!(added.is_empty());

        // A superset only adds the difference.
        let added = augment(&mut df, &[IndicatorId::Ma(5), IndicatorId::MacdDif]).unwrap();
        assert_eq!(added, vec!["MACD_DIF".to_string()]);
    }

    #[test]
    fn augment_full_standard_set() {
        let mut df = sample_df();
        let required = IndicatorId::standard_set();
        augment(&mut df, &required).unwrap();
        for id in required {
            assert!(df.column(&id.column_name()).is_ok(), "{}", id.column_name());
        }
    }

    #[test]
    fn augmented_column_matches_direct_computation() {
        let mut df = sample_df();
        augment(&mut df, &[IndicatorId::Ma(5)]).unwrap();
        let from_df = column_f64(&df, "MA5").unwrap();
        let direct = overlap::sma(&column_f64(&df, "close").unwrap(), 5);
        for (a, b) in from_df.iter().zip(direct.iter()) {
            assert!(a.is_nan() == b.is_nan() || (a - b).abs() < 1e-12);
        }
    }
}
