use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::algorithms::coordinates::ProjectionError;

/// Failure of a single closed-form solve.
///
/// None of these abort the pipeline: the candidate selector treats every
/// variant as "no candidate from this reference" and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("insufficient pulses: {available} supplied, at least {required} needed")]
    InsufficientPulses { available: usize, required: usize },

    #[error("singular system: {reason}")]
    SingularSystem { reason: String },

    #[error("no real root: discriminant {discriminant:e}")]
    NoRealRoot { discriminant: f64 },

    #[error("degenerate quadratic: leading coefficient is zero")]
    DegenerateQuadratic,
}

impl SolveError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            SolveError::InsufficientPulses { .. } => DiagnosticKind::InsufficientPulses,
            SolveError::SingularSystem { .. } => DiagnosticKind::SingularSystem,
            SolveError::NoRealRoot { .. } => DiagnosticKind::NoRealRoot,
            SolveError::DegenerateQuadratic => DiagnosticKind::DegenerateQuadratic,
        }
    }
}

/// Input faults that stop a pipeline run before any solving happens
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("pulse {pulse_id} from sensor {sensor_id} cannot be projected: {source}")]
    Projection {
        pulse_id: Uuid,
        sensor_id: String,
        #[source]
        source: ProjectionError,
    },

    #[error("sensor {sensor_id} is in zone {found_number}{found_letter}, expected {expected_number}{expected_letter}")]
    MixedZones {
        sensor_id: String,
        expected_number: u8,
        expected_letter: char,
        found_number: u8,
        found_letter: char,
    },

    #[error("invalid speed of sound {speed} m/s for temperature {temperature_c} C")]
    InvalidSpeed { speed: f64, temperature_c: f64 },

    #[error(transparent)]
    Validation(#[from] crate::validation::data::ValidationError),
}

/// Diagnostic taxonomy recorded to a [`DiagnosticSink`](crate::validation::DiagnosticSink)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    InsufficientPulses,
    SingularSystem,
    NoRealRoot,
    DegenerateQuadratic,
    NoViableLocation,
    ZoneCoercionDataLoss,
    ProjectionFailure,
    NonFiniteCandidate,
}

impl DiagnosticKind {
    pub fn default_severity(self) -> Severity {
        match self {
            DiagnosticKind::InsufficientPulses => Severity::Error,
            DiagnosticKind::SingularSystem => Severity::Error,
            DiagnosticKind::NoRealRoot => Severity::Info,
            DiagnosticKind::DegenerateQuadratic => Severity::Warning,
            DiagnosticKind::NoViableLocation => Severity::Warning,
            DiagnosticKind::ZoneCoercionDataLoss => Severity::Warning,
            DiagnosticKind::ProjectionFailure => Severity::Error,
            DiagnosticKind::NonFiniteCandidate => Severity::Warning,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DiagnosticKind::InsufficientPulses => "InsufficientPulses",
            DiagnosticKind::SingularSystem => "SingularSystem",
            DiagnosticKind::NoRealRoot => "NoRealRoot",
            DiagnosticKind::DegenerateQuadratic => "DegenerateQuadratic",
            DiagnosticKind::NoViableLocation => "NoViableLocation",
            DiagnosticKind::ZoneCoercionDataLoss => "ZoneCoercionDataLoss",
            DiagnosticKind::ProjectionFailure => "ProjectionFailure",
            DiagnosticKind::NonFiniteCandidate => "NonFiniteCandidate",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// One append-only diagnostic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn from_solve_error(error: &SolveError, reference_sensor: &str) -> Self {
        Self::new(
            error.kind(),
            format!("solve with reference sensor {} failed: {}", reference_sensor, error),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} (at {})",
            self.severity,
            self.kind,
            self.message,
            self.recorded_at.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_error_maps_to_taxonomy() {
        let error = SolveError::InsufficientPulses { available: 2, required: 3 };
        assert_eq!(error.kind(), DiagnosticKind::InsufficientPulses);
        assert_eq!(error.to_string(), "insufficient pulses: 2 supplied, at least 3 needed");

        assert_eq!(SolveError::DegenerateQuadratic.kind(), DiagnosticKind::DegenerateQuadratic);
    }

    #[test]
    fn test_no_real_root_is_not_an_error() {
        let diagnostic = Diagnostic::from_solve_error(
            &SolveError::NoRealRoot { discriminant: -4.0 },
            "SN-7",
        );

        assert_eq!(diagnostic.severity, Severity::Info);
        assert!(diagnostic.message.contains("SN-7"));
    }

    #[test]
    fn test_diagnostic_display_line() {
        let diagnostic = Diagnostic::new(DiagnosticKind::SingularSystem, "collinear sensors");
        let line = diagnostic.to_string();

        assert!(line.starts_with("ERROR:SingularSystem: collinear sensors"));
    }
}
