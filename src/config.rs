use chrono::NaiveDate;
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// Simulation configuration: capital management, trading costs, risk control
/// and the date window. All fields carry A-share-appropriate defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BacktestConfig {
    /// Starting cash in currency units.
    #[garde(range(min = 0.01))]
    pub initial_capital: f64,
    /// Fraction of cash committed per buy. Zero disables new entries.
    #[garde(range(min = 0.0, max = 1.0))]
    pub position_size: f64,
    #[garde(range(min = 1))]
    pub max_positions: u32,

    #[garde(range(min = 0.0))]
    pub commission_rate: f64,
    #[garde(range(min = 0.0))]
    pub min_commission: f64,
    #[garde(range(min = 0.0))]
    pub slippage_rate: f64,
    /// Stamp tax, levied on sell proceeds only.
    #[garde(range(min = 0.0))]
    pub stamp_tax_rate: f64,
    /// Lot size: share counts are floored to a multiple of this.
    #[garde(range(min = 1))]
    pub min_shares: i64,

    /// Forced-sell trigger as a fraction below average cost.
    #[garde(range(min = 0.000_001))]
    pub stop_loss_pct: f64,

    /// Inclusive date window applied to the series before simulation.
    #[garde(skip)]
    pub start_date: Option<NaiveDate>,
    #[garde(skip)]
    pub end_date: Option<NaiveDate>,

    /// Capacity of the data manager's in-memory series cache.
    #[garde(range(min = 1))]
    pub cache_capacity: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1_000_000.0,
            position_size: 1.0,
            max_positions: 1,
            commission_rate: 3e-4,
            min_commission: 5.0,
            slippage_rate: 1e-3,
            stamp_tax_rate: 1e-3,
            min_shares: 100,
            stop_loss_pct: 0.05,
            start_date: None,
            end_date: None,
            cache_capacity: 100,
        }
    }
}

impl BacktestConfig {
    /// Lower risk, lower turnover: smaller position, tighter stop, higher costs.
    pub fn conservative() -> Self {
        Self {
            position_size: 0.8,
            stop_loss_pct: 0.03,
            commission_rate: 5e-4,
            slippage_rate: 2e-3,
            ..Self::default()
        }
    }

    /// Higher risk tolerance: full position, wider stop, lower costs.
    pub fn aggressive() -> Self {
        Self {
            position_size: 1.0,
            stop_loss_pct: 0.08,
            commission_rate: 2e-4,
            slippage_rate: 5e-4,
            ..Self::default()
        }
    }

    /// Run garde validation, mapping the report into a crate error.
    pub fn checked(self) -> Result<Self> {
        self.validate()
            .map_err(|report| BacktestError::InvalidConfig(report.to_string()))?;
        Ok(self)
    }
}
