use crate::strategies::params::{ParamGrid, ParamMap, ParamValue};

/// One search dimension, derived from a grid's candidate list: an all-integer
/// list becomes an integer range, anything else a real range over the
/// candidates' span.
#[derive(Debug, Clone)]
pub enum Dimension {
    Integer { name: String, low: i64, high: i64 },
    Real { name: String, low: f64, high: f64 },
}

impl Dimension {
    pub fn name(&self) -> &str {
        match self {
            Self::Integer { name, .. } | Self::Real { name, .. } => name,
        }
    }
}

/// Continuous relaxation of a per-strategy parameter grid, addressed through
/// the unit cube so minimizers stay dimension-agnostic.
#[derive(Debug, Clone)]
pub struct SearchSpace {
    pub dims: Vec<Dimension>,
}

impl SearchSpace {
    pub fn from_grid(grid: &ParamGrid) -> Self {
        let dims = grid
            .dims
            .iter()
            .map(|(name, values)| {
                let all_int = values.iter().all(|v| matches!(v, ParamValue::Int(_)));
                if all_int {
                    let ints: Vec<i64> = values.iter().filter_map(|v| v.as_int()).collect();
                    Dimension::Integer {
                        name: name.clone(),
                        low: ints.iter().copied().min().unwrap_or(0),
                        high: ints.iter().copied().max().unwrap_or(0),
                    }
                } else {
                    let floats: Vec<f64> = values.iter().map(|v| v.as_float()).collect();
                    Dimension::Real {
                        name: name.clone(),
                        low: floats.iter().copied().fold(f64::INFINITY, f64::min),
                        high: floats.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    }
                }
            })
            .collect();
        Self { dims }
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Map a unit-cube point to a concrete parameter assignment. Components
    /// are clamped to [0, 1]; integer dimensions round to the nearest value.
    pub fn decode(&self, unit: &[f64]) -> ParamMap {
        let mut params = ParamMap::new();
        for (dim, u) in self.dims.iter().zip(unit.iter()) {
            let u = u.clamp(0.0, 1.0);
            let value = match dim {
                Dimension::Integer { low, high, .. } => {
                    ParamValue::Int(low + ((*high - *low) as f64 * u).round() as i64)
                }
                Dimension::Real { low, high, .. } => {
                    ParamValue::Float(low + (high - low) * u)
                }
            };
            params.insert(dim.name().to_string(), value);
        }
        params
    }
}
