//! Update engine configuration

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest price any update may produce.
pub const PRICE_FLOOR: f64 = 0.01;

/// Prices are rounded to this many decimal places after a perturbation.
pub const PRICE_DECIMALS: u32 = 2;

/// Immutable, eagerly validated engine parameters.
///
/// Construct through [`EngineConfig::new`] or validate a deserialized
/// value with [`EngineConfig::validate`]; invalid bounds fail at
/// configuration time, never at tick time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed-rate tick period in milliseconds.
    pub interval_ms: u64,
    /// Fewest row selections attempted per tick.
    pub min_rows_per_tick: usize,
    /// Most row selections attempted per tick.
    pub max_rows_per_tick: usize,
    /// Largest fractional move per update, e.g. 0.20 for +/-20%.
    pub max_fractional_change: f64,
}

impl EngineConfig {
    pub fn new(
        interval_ms: u64,
        min_rows_per_tick: usize,
        max_rows_per_tick: usize,
        max_fractional_change: f64,
    ) -> Result<Self> {
        let config = Self {
            interval_ms,
            min_rows_per_tick,
            max_rows_per_tick,
            max_fractional_change,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(AppError::Config("interval_ms must be positive".into()));
        }
        if self.max_rows_per_tick < self.min_rows_per_tick {
            return Err(AppError::Config(
                "max_rows_per_tick must be >= min_rows_per_tick".into(),
            ));
        }
        if !self.max_fractional_change.is_finite() || self.max_fractional_change < 0.0 {
            return Err(AppError::Config(
                "max_fractional_change must be non-negative and finite".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            min_rows_per_tick: 5,
            max_rows_per_tick: 1000,
            max_fractional_change: 0.20,
        }
    }
}
