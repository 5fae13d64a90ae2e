//! Configuration types for the measurement pipeline.
//!
//! This module provides configuration options using the builder pattern.
//! Filter strategies are not part of the configuration; they are injected
//! through [`crate::PipelineBuilder`] because they are behavior, not data.

use serde::{Deserialize, Serialize};

/// Default lower bound of the voltage window (V).
pub const DEFAULT_LOWER_VOLTAGE: f64 = 0.0;

/// Configuration for the measurement pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use soh_processing::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .resample_interval_s(5.0)
///     .voltage_window(340.0, 390.0)
///     .filter_cell_voltages(true)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Resampling grid in seconds. `None` disables resampling.
    /// Default: None
    pub resample_interval_s: Option<f64>,

    /// Whether to run the voltage filter over every per-cell voltage column.
    /// Default: false
    pub filter_cell_voltages: bool,

    /// Inclusive lower bound of the voltage window (V).
    /// Default: 0.0
    pub lower_voltage: f64,

    /// Inclusive upper bound of the voltage window (V). `None` means unbounded.
    /// Default: None
    pub upper_voltage: Option<f64>,

    /// Offset added to the integrated energy column.
    /// Default: 0.0
    pub initial_energy: f64,

    /// Whether to integrate current into an additional `Q_calc` column.
    /// The precomputed `Q` column stays authoritative either way.
    /// Default: false
    pub derive_charge: bool,

    /// Offset added to `Q_calc` when charge derivation is enabled.
    /// Default: 0.0
    pub initial_charge: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resample_interval_s: None,
            filter_cell_voltages: false,
            lower_voltage: DEFAULT_LOWER_VOLTAGE,
            upper_voltage: None,
            initial_energy: 0.0,
            derive_charge: false,
            initial_charge: 0.0,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Inclusive voltage bounds, with an unbounded upper limit mapped to infinity.
    pub fn voltage_bounds(&self) -> (f64, f64) {
        (
            self.lower_voltage,
            self.upper_voltage.unwrap_or(f64::INFINITY),
        )
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if let Some(interval) = self.resample_interval_s
            && !(interval.is_finite() && interval > 0.0)
        {
            return Err(ConfigValidationError::InvalidResampleInterval(interval));
        }

        check_finite("lower_voltage", self.lower_voltage)?;
        if let Some(upper) = self.upper_voltage {
            check_finite("upper_voltage", upper)?;
            if upper < self.lower_voltage {
                return Err(ConfigValidationError::InvalidVoltageWindow {
                    lower: self.lower_voltage,
                    upper,
                });
            }
        }

        check_finite("initial_energy", self.initial_energy)?;
        check_finite("initial_charge", self.initial_charge)?;

        Ok(())
    }
}

fn check_finite(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigValidationError::NonFiniteValue {
            field: field.to_string(),
            value,
        })
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid resample interval: {0} (must be a positive number of seconds)")]
    InvalidResampleInterval(f64),

    #[error("Invalid voltage window: lower bound {lower} is above upper bound {upper}")]
    InvalidVoltageWindow { lower: f64, upper: f64 },

    #[error("Invalid value for '{field}': {value} (must be finite)")]
    NonFiniteValue { field: String, value: f64 },
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    resample_interval_s: Option<f64>,
    filter_cell_voltages: Option<bool>,
    lower_voltage: Option<f64>,
    upper_voltage: Option<f64>,
    initial_energy: Option<f64>,
    derive_charge: Option<bool>,
    initial_charge: Option<f64>,
}

impl PipelineConfigBuilder {
    /// Resample onto a uniform grid of `seconds` before filtering.
    pub fn resample_interval_s(mut self, seconds: f64) -> Self {
        self.resample_interval_s = Some(seconds);
        self
    }

    /// Enable or disable filtering of the per-cell voltage columns.
    pub fn filter_cell_voltages(mut self, enable: bool) -> Self {
        self.filter_cell_voltages = Some(enable);
        self
    }

    /// Set the inclusive lower voltage bound.
    pub fn lower_voltage(mut self, volts: f64) -> Self {
        self.lower_voltage = Some(volts);
        self
    }

    /// Set the inclusive upper voltage bound.
    pub fn upper_voltage(mut self, volts: f64) -> Self {
        self.upper_voltage = Some(volts);
        self
    }

    /// Set both voltage bounds at once.
    pub fn voltage_window(self, lower: f64, upper: f64) -> Self {
        self.lower_voltage(lower).upper_voltage(upper)
    }

    /// Set the offset added to the integrated energy.
    pub fn initial_energy(mut self, energy: f64) -> Self {
        self.initial_energy = Some(energy);
        self
    }

    /// Enable integration of current into `Q_calc`.
    pub fn derive_charge(mut self, enable: bool) -> Self {
        self.derive_charge = Some(enable);
        self
    }

    /// Set the offset added to `Q_calc`.
    pub fn initial_charge(mut self, charge: f64) -> Self {
        self.initial_charge = Some(charge);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            resample_interval_s: self.resample_interval_s,
            filter_cell_voltages: self.filter_cell_voltages.unwrap_or(false),
            lower_voltage: self.lower_voltage.unwrap_or(DEFAULT_LOWER_VOLTAGE),
            upper_voltage: self.upper_voltage,
            initial_energy: self.initial_energy.unwrap_or(0.0),
            derive_charge: self.derive_charge.unwrap_or(false),
            initial_charge: self.initial_charge.unwrap_or(0.0),
        };

        config.validate()?;
        Ok(config)
    }
}
