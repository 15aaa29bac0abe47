//! Pulse document ingestion
//!
//! A pulse document is a JSON object holding the detections of one acoustic
//! event and the weather at the time:
//!
//! ```json
//! {
//!   "pulses": [
//!     {
//!       "pulseId": "5c1f6a3e-...",
//!       "serialNumber": "SN-0042",
//!       "arrivalTime": "2022-09-13T12:00:00.512Z",
//!       "location": { "latitude": 35.0, "longitude": -81.0, "elevation": 220.0 }
//!     }
//!   ],
//!   "weather": { "temperature": 21.5 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::{GeodeticPosition, Pulse};
use crate::validation::data::{PulseValidator, ValidationError};

/// Ambient conditions for the whole batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    /// Air temperature in degrees Celsius
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windspeed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winddir: Option<f64>,
}

impl Weather {
    pub fn new(temperature: f64) -> Self {
        Self {
            temperature,
            windspeed: None,
            winddir: None,
        }
    }
}

/// One event's detections plus the weather they were taken in
#[derive(Debug, Clone, PartialEq)]
pub struct PulseBatch {
    pub pulses: Vec<Pulse>,
    pub weather: Weather,
}

impl PulseBatch {
    pub fn new(pulses: Vec<Pulse>, weather: Weather) -> Self {
        Self { pulses, weather }
    }

    pub fn temperature_c(&self) -> f64 {
        self.weather.temperature
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }
}

/// Errors raised while reading a pulse document
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed pulse document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pulse {pulse_id}: unparseable arrival time {value:?}")]
    InvalidTimestamp { pulse_id: Uuid, value: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Serialize, Deserialize)]
struct PulseDocument {
    pulses: Vec<PulseRecord>,
    weather: Weather,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PulseRecord {
    pulse_id: Uuid,
    serial_number: String,
    arrival_time: String,
    location: LocationRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct LocationRecord {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    elevation: f64,
}

/// Converts pulse documents to and from [`PulseBatch`]
#[derive(Debug, Clone)]
pub struct PulseParser {
    validator: PulseValidator,
    validate: bool,
}

impl Default for PulseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseParser {
    pub fn new() -> Self {
        Self {
            validator: PulseValidator::new(),
            validate: true,
        }
    }

    pub fn with_validator(validator: PulseValidator) -> Self {
        Self {
            validator,
            validate: true,
        }
    }

    /// Enable or disable validation after parsing
    pub fn set_validation(&mut self, validate: bool) {
        self.validate = validate;
    }

    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<PulseBatch, IngestError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_str(&content)
    }

    pub fn parse_str(&self, content: &str) -> Result<PulseBatch, IngestError> {
        let document: PulseDocument = serde_json::from_str(content)?;

        let pulses = document
            .pulses
            .into_iter()
            .map(|record| -> Result<Pulse, IngestError> {
                let arrival_time =
                    parse_arrival_time(&record.arrival_time).ok_or_else(|| IngestError::InvalidTimestamp {
                        pulse_id: record.pulse_id,
                        value: record.arrival_time.clone(),
                    })?;
                Ok(Pulse::new(
                    record.pulse_id,
                    record.serial_number,
                    arrival_time,
                    GeodeticPosition::new(
                        record.location.latitude,
                        record.location.longitude,
                        record.location.elevation,
                    ),
                ))
            })
            .collect::<Result<Vec<_>, IngestError>>()?;

        let batch = PulseBatch::new(pulses, document.weather);

        if self.validate {
            self.validator.validate_pulses(&batch.pulses)?;
            self.validator.validate_temperature(batch.temperature_c())?;
        }

        tracing::debug!(pulses = batch.len(), temperature = batch.temperature_c(), "parsed pulse document");
        Ok(batch)
    }

    /// Serialize a batch back into the document format
    pub fn to_json(&self, batch: &PulseBatch, pretty: bool) -> Result<String, IngestError> {
        let document = PulseDocument {
            pulses: batch
                .pulses
                .iter()
                .map(|pulse| PulseRecord {
                    pulse_id: pulse.pulse_id,
                    serial_number: pulse.sensor_id.clone(),
                    arrival_time: format_arrival_time(pulse.arrival_time),
                    location: LocationRecord {
                        latitude: pulse.location.latitude,
                        longitude: pulse.location.longitude,
                        elevation: pulse.location.elevation,
                    },
                })
                .collect(),
            weather: batch.weather.clone(),
        };

        let json = if pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        Ok(json)
    }
}

/// Parse an ISO-8601 arrival time; timestamps without an offset are UTC
pub fn parse_arrival_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Some(time.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// RFC 3339 in UTC with as many fractional digits as needed
pub fn format_arrival_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
