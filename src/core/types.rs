//! Core data types for discharge location

use chrono::{DateTime, Duration, Utc};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Geodetic position (WGS84 degrees, elevation in meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

impl GeodeticPosition {
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self { latitude, longitude, elevation }
    }
}

/// A single sensor detection of the acoustic pulse
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    pub pulse_id: Uuid,
    pub sensor_id: String,
    pub arrival_time: DateTime<Utc>,
    pub location: GeodeticPosition,
}

impl Pulse {
    pub fn new(
        pulse_id: Uuid,
        sensor_id: impl Into<String>,
        arrival_time: DateTime<Utc>,
        location: GeodeticPosition,
    ) -> Self {
        Self {
            pulse_id,
            sensor_id: sensor_id.into(),
            arrival_time,
            location,
        }
    }
}

/// A pulse expressed in a planar projection zone.
///
/// `planar_position` holds (easting, northing, elevation). Every pulse handed
/// to the solver shares the same `zone_number` and `zone_letter`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedPulse {
    pub pulse_id: Uuid,
    pub sensor_id: String,
    pub arrival_time: DateTime<Utc>,
    pub planar_position: Vector3<f64>,
    pub zone_number: u8,
    pub zone_letter: char,
}

impl ProjectedPulse {
    pub fn easting(&self) -> f64 {
        self.planar_position.x
    }

    pub fn northing(&self) -> f64 {
        self.planar_position.y
    }

    pub fn elevation(&self) -> f64 {
        self.planar_position.z
    }

    /// Horizontal position with elevation dropped
    pub fn planar_2d(&self) -> Vector2<f64> {
        Vector2::new(self.planar_position.x, self.planar_position.y)
    }

    pub fn zone(&self) -> (u8, char) {
        (self.zone_number, self.zone_letter)
    }
}

/// Root branch of the closed-form solve that produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    Reddi2DPositiveRoot,
    Reddi2DNegativeRoot,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Reddi2DPositiveRoot => write!(f, "Reddi2DPositiveRoot"),
            Algorithm::Reddi2DNegativeRoot => write!(f, "Reddi2DNegativeRoot"),
        }
    }
}

/// Planar solver output for one root branch
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub position: Vector2<f64>,
    pub discharge_time: DateTime<Utc>,
    pub variant: Algorithm,
}

impl Candidate {
    /// Mean squared discrepancy between geometric and time-derived ranges
    /// over every pulse.
    pub fn fit_error(&self, positions: &[Vector2<f64>], arrivals: &[DateTime<Utc>], speed: f64) -> f64 {
        if positions.is_empty() {
            return f64::NAN;
        }

        let sum: f64 = positions
            .iter()
            .zip(arrivals)
            .map(|(position, arrival)| {
                let distance = (position - self.position).norm();
                let travelled = speed * seconds_between(*arrival, self.discharge_time);
                (travelled - distance).powi(2)
            })
            .sum();

        sum / positions.len() as f64
    }

    pub fn is_finite(&self) -> bool {
        self.position.x.is_finite() && self.position.y.is_finite()
    }
}

/// Final reportable location, sorted best-first by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationResult {
    #[serde(rename = "geolocation")]
    pub position: GeodeticPosition,
    pub discharge_time: DateTime<Utc>,
    #[serde(rename = "self_consistent_error")]
    pub fit_error: f64,
    #[serde(rename = "algorithm")]
    pub variant: Algorithm,
    #[serde(rename = "reference_sensor")]
    pub reference_sensor_id: String,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum LocationOutcome {
    /// Best-first results for the winning reference
    Located(Vec<LocationResult>),
    /// Fewer usable pulses than the solver needs
    InsufficientData { available: usize, required: usize },
    /// No reference choice produced an acceptable fit
    NoViableLocation,
}

impl LocationOutcome {
    /// Ranked results, empty unless `Located`
    pub fn results(&self) -> &[LocationResult] {
        match self {
            LocationOutcome::Located(results) => results,
            _ => &[],
        }
    }

    pub fn into_results(self) -> Vec<LocationResult> {
        match self {
            LocationOutcome::Located(results) => results,
            _ => Vec::new(),
        }
    }

    pub fn best(&self) -> Option<&LocationResult> {
        self.results().first()
    }

    pub fn is_located(&self) -> bool {
        matches!(self, LocationOutcome::Located(_))
    }
}

/// Signed `later - earlier` in seconds, nanosecond resolution
pub fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    let delta = later.signed_duration_since(earlier);
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 * 1e-9,
        None => delta.num_milliseconds() as f64 * 1e-3,
    }
}

/// Shift a timestamp by a (possibly negative) number of seconds.
///
/// Returns `None` when the offset is not finite or leaves chrono's range.
pub fn offset_by_seconds(time: DateTime<Utc>, seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let nanos = (seconds * 1e9).round();
    if nanos.abs() >= i64::MAX as f64 {
        return None;
    }
    time.checked_add_signed(Duration::nanoseconds(nanos as i64))
}
