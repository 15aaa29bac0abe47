//! Synthetic pulse batches from a known source
//!
//! Arrival times are computed from planar distances in the source's natural
//! projection zone, so a batch generated here is exactly consistent with the
//! solver's model when no timing noise is added.

use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, NormalError};
use thiserror::Error;
use uuid::Uuid;

use crate::algorithms::coordinates::{ProjectionAdapter, ProjectionError};
use crate::algorithms::sound_speed::{is_usable_speed, speed_of_sound};
use crate::core::{offset_by_seconds, GeodeticPosition, Pulse};
use crate::processing::parser::{format_arrival_time, PulseBatch, Weather};

#[derive(Debug, Error)]
pub enum SyntheticError {
    #[error("cannot project {what}: {source}")]
    Projection {
        what: String,
        #[source]
        source: ProjectionError,
    },

    #[error("invalid timing noise: {0}")]
    InvalidNoise(#[from] NormalError),

    #[error("temperature {0} C gives no usable speed of sound")]
    InvalidTemperature(f64),

    #[error("arrival time for sensor {0} is out of range")]
    TimeOutOfRange(String),
}

/// A sensor placed in a synthetic scenario
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSensor {
    pub sensor_id: String,
    pub location: GeodeticPosition,
}

/// Known discharge plus sensor layout
#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    pub source: GeodeticPosition,
    pub discharge_time: DateTime<Utc>,
    pub temperature_c: f64,
    pub sensors: Vec<SyntheticSensor>,
    /// Standard deviation of Gaussian timing noise in seconds
    pub timing_noise_s: f64,
    pub seed: Option<u64>,
}

impl SyntheticScenario {
    pub fn new(source: GeodeticPosition, discharge_time: DateTime<Utc>) -> Self {
        Self {
            source,
            discharge_time,
            temperature_c: 20.0,
            sensors: Vec::new(),
            timing_noise_s: 0.0,
            seed: None,
        }
    }

    pub fn with_sensor(mut self, sensor_id: impl Into<String>, location: GeodeticPosition) -> Self {
        self.sensors.push(SyntheticSensor {
            sensor_id: sensor_id.into(),
            location,
        });
        self
    }

    pub fn with_temperature(mut self, temperature_c: f64) -> Self {
        self.temperature_c = temperature_c;
        self
    }

    pub fn with_timing_noise(mut self, std_dev_s: f64, seed: Option<u64>) -> Self {
        self.timing_noise_s = std_dev_s;
        self.seed = seed;
        self
    }

    /// Generate the pulse batch each sensor would have reported
    pub fn generate<P: ProjectionAdapter + ?Sized>(&self, projection: &P) -> Result<PulseBatch, SyntheticError> {
        let speed = speed_of_sound(self.temperature_c);
        if !is_usable_speed(speed) {
            return Err(SyntheticError::InvalidTemperature(self.temperature_c));
        }

        let source = projection
            .geodetic_to_planar(self.source.latitude, self.source.longitude)
            .map_err(|source| SyntheticError::Projection {
                what: "source".to_string(),
                source,
            })?;

        let noise = Normal::new(0.0, self.timing_noise_s)?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut pulses = Vec::with_capacity(self.sensors.len());
        for sensor in &self.sensors {
            let (easting, northing) = projection
                .geodetic_to_planar_forced(
                    sensor.location.latitude,
                    sensor.location.longitude,
                    source.zone_number,
                    source.zone_letter,
                )
                .map_err(|e| SyntheticError::Projection {
                    what: format!("sensor {}", sensor.sensor_id),
                    source: e,
                })?;

            let distance = (easting - source.easting).hypot(northing - source.northing);
            let mut travel_s = distance / speed;
            if self.timing_noise_s > 0.0 {
                travel_s += noise.sample(&mut rng);
            }

            let arrival_time = offset_by_seconds(self.discharge_time, travel_s)
                .ok_or_else(|| SyntheticError::TimeOutOfRange(sensor.sensor_id.clone()))?;

            pulses.push(Pulse::new(
                pulse_id_for(&sensor.sensor_id, arrival_time),
                sensor.sensor_id.clone(),
                arrival_time,
                sensor.location,
            ));
        }

        Ok(PulseBatch::new(pulses, Weather::new(self.temperature_c)))
    }
}

/// Name-based id from sensor and arrival time
pub fn pulse_id_for(sensor_id: &str, arrival_time: DateTime<Utc>) -> Uuid {
    let name = format!("{}{}", sensor_id, format_arrival_time(arrival_time));
    Uuid::new_v3(&Uuid::NAMESPACE_DNS, name.as_bytes())
}
