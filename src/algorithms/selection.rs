//! Reference-sensor search over the closed-form solver
//!
//! The solver's conditioning depends on which pulse is the reference. Every
//! rotation of the pulse list is solved, each candidate is scored by its
//! mean squared range residual, and the rotation holding the single best
//! candidate is solved once more to report both of its root branches.

use chrono::{DateTime, Utc};
use nalgebra::Vector2;
use rayon::prelude::*;

use crate::algorithms::coordinates::ProjectionAdapter;
use crate::algorithms::multilateration::Multilaterator;
use crate::core::{
    Candidate, GeodeticPosition, LocationOutcome, LocationResult, ProjectedPulse, DEFAULT_MAX_FIT_ERROR, MIN_PULSES,
};
use crate::validation::diagnostics::DiagnosticSink;
use crate::validation::error::{Diagnostic, DiagnosticKind, LocationError, SolveError};

/// Searches rotation offsets for the best-fitting reference
#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector {
    /// Candidates must fit strictly better than this (m^2) to be accepted
    pub max_fit_error: f64,
    /// Evaluate rotations on the rayon pool
    pub parallel: bool,
    pub solver: Multilaterator,
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self {
            max_fit_error: DEFAULT_MAX_FIT_ERROR,
            parallel: false,
            solver: Multilaterator::default(),
        }
    }
}

/// Planar arrays shared by every rotation
struct SearchInput<'a> {
    pulses: &'a [ProjectedPulse],
    positions: Vec<Vector2<f64>>,
    arrivals: Vec<DateTime<Utc>>,
    speed: f64,
}

impl<'a> SearchInput<'a> {
    fn new(pulses: &'a [ProjectedPulse], speed: f64) -> Self {
        Self {
            pulses,
            positions: pulses.iter().map(ProjectedPulse::planar_2d).collect(),
            arrivals: pulses.iter().map(|p| p.arrival_time).collect(),
            speed,
        }
    }

    fn fit_error(&self, candidate: &Candidate) -> f64 {
        candidate.fit_error(&self.positions, &self.arrivals, self.speed)
    }
}

impl CandidateSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_fit_error(mut self, max_fit_error: f64) -> Self {
        self.max_fit_error = max_fit_error;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Locate the source from pulses that already share one projection zone.
    ///
    /// Results are in branch order (positive root first); ranking is left to
    /// the caller.
    pub fn select<P: ProjectionAdapter + ?Sized>(
        &self,
        pulses: &[ProjectedPulse],
        speed: f64,
        projection: &P,
        sink: &dyn DiagnosticSink,
    ) -> Result<LocationOutcome, LocationError> {
        if pulses.len() < MIN_PULSES {
            let error = SolveError::InsufficientPulses {
                available: pulses.len(),
                required: MIN_PULSES,
            };
            sink.record(&Diagnostic::new(error.kind(), error.to_string()));
            return Ok(LocationOutcome::InsufficientData {
                available: pulses.len(),
                required: MIN_PULSES,
            });
        }

        let (zone_number, zone_letter) = pulses[0].zone();
        if let Some(stray) = pulses.iter().find(|p| p.zone() != (zone_number, zone_letter)) {
            return Err(LocationError::MixedZones {
                sensor_id: stray.sensor_id.clone(),
                expected_number: zone_number,
                expected_letter: zone_letter,
                found_number: stray.zone_number,
                found_letter: stray.zone_letter,
            });
        }

        let input = SearchInput::new(pulses, speed);

        let best_reference = match self.best_reference(&input, sink) {
            Some(reference) => reference,
            None => {
                sink.record(&Diagnostic::new(
                    DiagnosticKind::NoViableLocation,
                    format!(
                        "no reference among {} pulses produced a fit error below {}",
                        pulses.len(),
                        self.max_fit_error
                    ),
                ));
                return Ok(LocationOutcome::NoViableLocation);
            }
        };

        let reference_sensor = &pulses[best_reference].sensor_id;
        let candidates = match self
            .solver
            .solve(&input.positions, &input.arrivals, best_reference, speed)
        {
            Ok(candidates) => candidates,
            Err(error) => {
                sink.record(&Diagnostic::from_solve_error(&error, reference_sensor));
                return Ok(LocationOutcome::NoViableLocation);
            }
        };

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let fit_error = input.fit_error(&candidate);
            if !candidate.is_finite() || !fit_error.is_finite() {
                sink.record(&Diagnostic::new(
                    DiagnosticKind::NonFiniteCandidate,
                    format!(
                        "{} candidate for reference sensor {} is not finite (fit error {})",
                        candidate.variant, reference_sensor, fit_error
                    ),
                ));
                continue;
            }

            let (latitude, longitude) = match projection.planar_to_geodetic(
                candidate.position.x,
                candidate.position.y,
                zone_number,
                zone_letter,
            ) {
                Ok(geodetic) => geodetic,
                Err(e) => {
                    sink.record(&Diagnostic::new(
                        DiagnosticKind::ProjectionFailure,
                        format!(
                            "{} candidate for reference sensor {} cannot be converted back: {}",
                            candidate.variant, reference_sensor, e
                        ),
                    ));
                    continue;
                }
            };

            results.push(LocationResult {
                position: GeodeticPosition::new(latitude, longitude, 0.0),
                discharge_time: candidate.discharge_time,
                fit_error,
                variant: candidate.variant,
                reference_sensor_id: reference_sensor.clone(),
            });
        }

        if results.is_empty() {
            sink.record(&Diagnostic::new(
                DiagnosticKind::NoViableLocation,
                format!("every candidate for reference sensor {} was discarded", reference_sensor),
            ));
            return Ok(LocationOutcome::NoViableLocation);
        }

        tracing::debug!(
            reference = best_reference,
            sensor = %reference_sensor,
            candidates = results.len(),
            "reference selected"
        );

        Ok(LocationOutcome::Located(results))
    }

    /// Rotation offset holding the best accepted candidate, lowest offset on ties
    fn best_reference(&self, input: &SearchInput<'_>, sink: &dyn DiagnosticSink) -> Option<usize> {
        let n = input.pulses.len();
        let rotation_errors: Vec<Option<f64>> = if self.parallel {
            (0..n)
                .into_par_iter()
                .map(|reference| self.rotation_error(input, reference, sink))
                .collect()
        } else {
            (0..n).map(|reference| self.rotation_error(input, reference, sink)).collect()
        };

        let mut best_error = self.max_fit_error;
        let mut best_reference = None;
        for (reference, error) in rotation_errors.into_iter().enumerate() {
            if let Some(error) = error {
                if error < best_error {
                    best_error = error;
                    best_reference = Some(reference);
                }
            }
        }

        best_reference
    }

    /// Smallest fit error among the candidates of one rotation
    fn rotation_error(&self, input: &SearchInput<'_>, reference: usize, sink: &dyn DiagnosticSink) -> Option<f64> {
        let candidates = match self
            .solver
            .solve(&input.positions, &input.arrivals, reference, input.speed)
        {
            Ok(candidates) => candidates,
            Err(error) => {
                sink.record(&Diagnostic::from_solve_error(&error, &input.pulses[reference].sensor_id));
                return None;
            }
        };

        candidates
            .iter()
            .filter(|candidate| candidate.is_finite())
            .map(|candidate| input.fit_error(candidate))
            .filter(|error| !error.is_nan())
            .min_by(f64::total_cmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::coordinates::UtmProjection;
    use crate::core::{offset_by_seconds, seconds_between, Algorithm};
    use crate::validation::diagnostics::MemorySink;
    use crate::validation::error::Severity;
    use chrono::TimeZone;
    use nalgebra::Vector3;
    use uuid::Uuid;

    const SPEED: f64 = 343.0;
    const ORIGIN_EASTING: f64 = 500_000.0;
    const ORIGIN_NORTHING: f64 = 3_873_000.0;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 9, 13, 12, 0, 0).unwrap()
    }

    fn pulse(sensor: &str, offset: (f64, f64), arrival: DateTime<Utc>) -> ProjectedPulse {
        ProjectedPulse {
            pulse_id: Uuid::new_v4(),
            sensor_id: sensor.to_string(),
            arrival_time: arrival,
            planar_position: Vector3::new(ORIGIN_EASTING + offset.0, ORIGIN_NORTHING + offset.1, 0.0),
            zone_number: 17,
            zone_letter: 'S',
        }
    }

    fn synthetic(offsets: &[(f64, f64)], source: (f64, f64)) -> Vec<ProjectedPulse> {
        offsets
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                let range = ((x - source.0).powi(2) + (y - source.1).powi(2)).sqrt();
                pulse(
                    &format!("SN-{}", i),
                    (x, y),
                    offset_by_seconds(epoch(), range / SPEED).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_selects_consistent_location() {
        let pulses = synthetic(
            &[(0.0, 0.0), (1000.0, 0.0), (0.0, 1000.0), (1000.0, 1000.0)],
            (300.0, 400.0),
        );
        let sink = MemorySink::new();
        let utm = UtmProjection::new();

        let outcome = CandidateSelector::new().select(&pulses, SPEED, &utm, &sink).unwrap();
        let results = outcome.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].variant, Algorithm::Reddi2DPositiveRoot);
        assert_eq!(results[1].variant, Algorithm::Reddi2DNegativeRoot);

        let best = results
            .iter()
            .min_by(|a, b| a.fit_error.total_cmp(&b.fit_error))
            .unwrap();
        assert!(best.fit_error < 1e-3);
        assert!(seconds_between(best.discharge_time, epoch()).abs() < 1e-6);
        assert_eq!(best.position.elevation, 0.0);

        let (easting, northing) = utm
            .geodetic_to_planar_forced(best.position.latitude, best.position.longitude, 17, 'S')
            .unwrap();
        assert!((easting - (ORIGIN_EASTING + 300.0)).abs() < 1e-3);
        assert!((northing - (ORIGIN_NORTHING + 400.0)).abs() < 1e-3);
    }

    #[test]
    fn test_parallel_search_matches_sequential() {
        let pulses = synthetic(
            &[(0.0, 0.0), (800.0, 50.0), (120.0, 900.0), (950.0, 1020.0), (-300.0, 500.0)],
            (410.0, 380.0),
        );
        let utm = UtmProjection::new();

        let sequential = CandidateSelector::new()
            .select(&pulses, SPEED, &utm, &MemorySink::new())
            .unwrap();
        let parallel = CandidateSelector::new()
            .with_parallel(true)
            .select(&pulses, SPEED, &utm, &MemorySink::new())
            .unwrap();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_insufficient_pulses_are_reported() {
        let pulses = synthetic(&[(0.0, 0.0), (1000.0, 0.0)], (300.0, 400.0));
        let sink = MemorySink::new();

        let outcome = CandidateSelector::new()
            .select(&pulses, SPEED, &UtmProjection::new(), &sink)
            .unwrap();

        assert_eq!(outcome, LocationOutcome::InsufficientData { available: 2, required: 3 });
        assert_eq!(sink.count(DiagnosticKind::InsufficientPulses), 1);
    }

    #[test]
    fn test_collinear_array_has_no_viable_location() {
        let pulses = synthetic(&[(0.0, 0.0), (100.0, 0.0), (200.0, 0.0)], (50.0, 80.0));
        let sink = MemorySink::new();

        let outcome = CandidateSelector::new()
            .select(&pulses, SPEED, &UtmProjection::new(), &sink)
            .unwrap();

        assert_eq!(outcome, LocationOutcome::NoViableLocation);
        assert_eq!(sink.count(DiagnosticKind::SingularSystem), 3);
        assert_eq!(sink.count(DiagnosticKind::NoViableLocation), 1);
    }

    #[test]
    fn test_inconsistent_arrivals_have_no_viable_location() {
        let pulses = vec![
            pulse("A", (0.0, 0.0), epoch()),
            pulse("B", (100.0, 0.0), offset_by_seconds(epoch(), 200.0 / SPEED).unwrap()),
            pulse("C", (0.0, 100.0), offset_by_seconds(epoch(), -200.0 / SPEED).unwrap()),
        ];
        let sink = MemorySink::new();

        let outcome = CandidateSelector::new()
            .select(&pulses, SPEED, &UtmProjection::new(), &sink)
            .unwrap();

        assert!(outcome.results().is_empty());
        assert_eq!(sink.count(DiagnosticKind::NoRealRoot), 3);
    }

    #[test]
    fn test_degenerate_quadratic_is_reported_as_warning() {
        let pulses = vec![
            pulse("A", (0.0, 0.0), epoch()),
            pulse("B", (1.0, 0.0), offset_by_seconds(epoch(), 1.0).unwrap()),
            pulse("C", (0.0, 1.0), epoch()),
        ];
        let sink = MemorySink::new();

        let outcome = CandidateSelector::new()
            .select(&pulses, 1.0, &UtmProjection::new(), &sink)
            .unwrap();

        assert!(outcome.results().is_empty());
        assert!(sink.count(DiagnosticKind::DegenerateQuadratic) >= 1);
        assert!(sink
            .diagnostics()
            .iter()
            .filter(|d| d.kind == DiagnosticKind::DegenerateQuadratic)
            .all(|d| d.severity == Severity::Warning));
    }

    #[test]
    fn test_candidates_beyond_the_pole_are_discarded() {
        // a planar frame shifted past the north pole of zone 17X
        let pulses: Vec<ProjectedPulse> = synthetic(
            &[(0.0, 0.0), (1000.0, 0.0), (0.0, 1000.0), (1000.0, 1000.0)],
            (300.0, 400.0),
        )
        .into_iter()
        .map(|mut p| {
            p.planar_position.y += 10_500_000.0 - ORIGIN_NORTHING;
            p.zone_letter = 'X';
            p
        })
        .collect();
        let sink = MemorySink::new();

        let outcome = CandidateSelector::new()
            .select(&pulses, SPEED, &UtmProjection::new(), &sink)
            .unwrap();

        assert_eq!(outcome, LocationOutcome::NoViableLocation);
        assert_eq!(sink.count(DiagnosticKind::ProjectionFailure), 2);
        assert_eq!(sink.count(DiagnosticKind::NoViableLocation), 1);
    }

    #[test]
    fn test_fit_threshold_rejects_poor_solutions() {
        let mut pulses = synthetic(
            &[(0.0, 0.0), (1000.0, 0.0), (0.0, 1000.0), (1000.0, 1000.0)],
            (300.0, 400.0),
        );
        // a 2 s late detection leaves every reference with a large residual
        pulses[3].arrival_time = offset_by_seconds(pulses[3].arrival_time, 2.0).unwrap();

        let outcome = CandidateSelector::new()
            .with_max_fit_error(1e-6)
            .select(&pulses, SPEED, &UtmProjection::new(), &MemorySink::new())
            .unwrap();

        assert_eq!(outcome, LocationOutcome::NoViableLocation);
    }

    #[test]
    fn test_mixed_zones_are_rejected() {
        let mut pulses = synthetic(&[(0.0, 0.0), (1000.0, 0.0), (0.0, 1000.0)], (300.0, 400.0));
        pulses[2].zone_number = 18;

        let result = CandidateSelector::new().select(&pulses, SPEED, &UtmProjection::new(), &MemorySink::new());
        assert!(matches!(result, Err(LocationError::MixedZones { found_number: 18, .. })));
    }
}
