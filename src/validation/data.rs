use std::collections::HashSet;

use thiserror::Error;
use uuid::Uuid;

use crate::core::{seconds_between, Pulse, CELSIUS_TO_KELVIN};

/// Configuration for pulse batch validation
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Largest plausible spread between first and last arrival (seconds)
    pub max_arrival_spread_s: f64,
    /// Treat an excessive arrival spread as an error instead of a warning
    pub strict_arrival_spread: bool,
    /// Reject batches that reuse a pulse id
    pub reject_duplicate_ids: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_arrival_spread_s: 60.0, // about 20 km of sound travel
            strict_arrival_spread: false,
            reject_duplicate_ids: true,
        }
    }
}

/// Input faults detected before projection
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("duplicate pulse id {pulse_id}")]
    DuplicatePulseId { pulse_id: Uuid },

    #[error("pulse {pulse_id}: empty sensor id")]
    EmptySensorId { pulse_id: Uuid },

    #[error("pulse {pulse_id}: invalid {field} {value}")]
    InvalidCoordinate {
        pulse_id: Uuid,
        field: &'static str,
        value: f64,
    },

    #[error("invalid temperature {temperature_c} C")]
    InvalidTemperature { temperature_c: f64 },

    #[error("arrival spread {spread_s:.3} s exceeds {limit_s:.3} s")]
    ArrivalSpreadExceeded { spread_s: f64, limit_s: f64 },
}

/// Checks pulse batches for values no projection or solve can use
#[derive(Debug, Clone, Default)]
pub struct PulseValidator {
    config: ValidationConfig,
}

impl PulseValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validate_pulses(&self, pulses: &[Pulse]) -> Result<(), ValidationError> {
        let mut seen = HashSet::with_capacity(pulses.len());

        for pulse in pulses {
            if self.config.reject_duplicate_ids && !seen.insert(pulse.pulse_id) {
                return Err(ValidationError::DuplicatePulseId {
                    pulse_id: pulse.pulse_id,
                });
            }
            if pulse.sensor_id.trim().is_empty() {
                return Err(ValidationError::EmptySensorId {
                    pulse_id: pulse.pulse_id,
                });
            }
            self.validate_location(pulse)?;
        }

        self.validate_arrival_spread(pulses)
    }

    pub fn validate_temperature(&self, temperature_c: f64) -> Result<(), ValidationError> {
        if !temperature_c.is_finite() || temperature_c <= -CELSIUS_TO_KELVIN {
            return Err(ValidationError::InvalidTemperature { temperature_c });
        }
        Ok(())
    }

    fn validate_location(&self, pulse: &Pulse) -> Result<(), ValidationError> {
        let location = &pulse.location;
        let checks = [
            ("latitude", location.latitude, -90.0, 90.0),
            ("longitude", location.longitude, -180.0, 180.0),
            ("elevation", location.elevation, f64::MIN, f64::MAX),
        ];

        for (field, value, min, max) in checks {
            if !value.is_finite() || value < min || value > max {
                return Err(ValidationError::InvalidCoordinate {
                    pulse_id: pulse.pulse_id,
                    field,
                    value,
                });
            }
        }
        Ok(())
    }

    fn validate_arrival_spread(&self, pulses: &[Pulse]) -> Result<(), ValidationError> {
        let first = pulses.iter().map(|p| p.arrival_time).min();
        let last = pulses.iter().map(|p| p.arrival_time).max();

        if let (Some(first), Some(last)) = (first, last) {
            let spread_s = seconds_between(last, first);
            if spread_s > self.config.max_arrival_spread_s {
                if self.config.strict_arrival_spread {
                    return Err(ValidationError::ArrivalSpreadExceeded {
                        spread_s,
                        limit_s: self.config.max_arrival_spread_s,
                    });
                }
                tracing::warn!(
                    spread_s,
                    limit_s = self.config.max_arrival_spread_s,
                    "arrival spread larger than the array can explain"
                );
            }
        }
        Ok(())
    }
}
