//! Closed-form 2-D TDOA multilateration (Reddi's formulation)
//!
//! Given planar sensor positions and arrival times, one of which serves as
//! the reference, the range differences to the reference reduce the
//! hyperbolic system to a quadratic in the reference range. Both roots are
//! returned; the caller scores them against every pulse.

use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, DVector, Vector2};

use crate::core::{offset_by_seconds, seconds_between, Algorithm, Candidate, MIN_PULSES, SINGULAR_VALUE_TOLERANCE};
use crate::validation::error::SolveError;

/// Reddi closed-form solver
#[derive(Debug, Clone, Copy)]
pub struct Multilaterator {
    /// Relative singular value below which the geometry counts as rank deficient
    pub rank_tolerance: f64,
}

impl Default for Multilaterator {
    fn default() -> Self {
        Self {
            rank_tolerance: SINGULAR_VALUE_TOLERANCE,
        }
    }
}

impl Multilaterator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rank_tolerance(mut self, tolerance: f64) -> Self {
        self.rank_tolerance = tolerance;
        self
    }

    /// Solve with pulse `reference` as the origin.
    ///
    /// The remaining pulses are taken cyclically after the reference
    /// (`reference + 1`, ..., wrapping to `reference - 1`), which matches
    /// rotating the input so the reference comes first. Returns the positive
    /// root branch first; a branch whose discharge time is not representable
    /// is omitted.
    pub fn solve(
        &self,
        positions: &[Vector2<f64>],
        arrivals: &[DateTime<Utc>],
        reference: usize,
        speed: f64,
    ) -> Result<Vec<Candidate>, SolveError> {
        let n = positions.len().min(arrivals.len());
        if n < MIN_PULSES {
            return Err(SolveError::InsufficientPulses {
                available: n,
                required: MIN_PULSES,
            });
        }

        let reference = reference % n;
        let origin = positions[reference];
        let reference_time = arrivals[reference];
        let m = n - 1;

        let mut a = DMatrix::zeros(m, 2);
        let mut d = DVector::zeros(m);
        let mut w = DVector::zeros(m);

        for row in 0..m {
            let index = (reference + row + 1) % n;
            let relative = positions[index] - origin;
            let range_squared = relative.x * relative.x + relative.y * relative.y;
            let range_difference = speed * seconds_between(arrivals[index], reference_time);

            a[(row, 0)] = relative.x;
            a[(row, 1)] = relative.y;
            d[row] = range_difference;
            w[row] = (range_squared - range_difference * range_difference) / 2.0;
        }

        let b = self.pseudo_inverse(a)?;
        let c_full = &b * &d;
        let y_full = &b * &w;
        let c = Vector2::new(c_full[0], c_full[1]);
        let y = Vector2::new(y_full[0], y_full[1]);

        let qa = c.dot(&c) - 1.0;
        let qb = c.dot(&y) + y.dot(&c);
        let qc = y.dot(&y);

        if qa == 0.0 {
            return Err(SolveError::DegenerateQuadratic);
        }

        let discriminant = qb * qb - 4.0 * qa * qc;
        if discriminant < 0.0 {
            return Err(SolveError::NoRealRoot { discriminant });
        }
        let root = if discriminant > 0.0 { discriminant.sqrt() } else { 0.0 };

        // pick the form of each root that avoids cancellation
        let (positive, negative) = if qb >= 0.0 {
            let qq = -0.5 * (qb + root);
            (qc / qq, qq / qa)
        } else {
            let qq = -0.5 * (qb - root);
            (qq / qa, qc / qq)
        };

        let branches = [
            (positive, Algorithm::Reddi2DPositiveRoot),
            (negative, Algorithm::Reddi2DNegativeRoot),
        ];

        let mut candidates = Vec::with_capacity(2);
        for (scale, variant) in branches {
            let relative = c * scale + y;
            match offset_by_seconds(reference_time, -relative.norm() / speed) {
                Some(discharge_time) => candidates.push(Candidate {
                    position: relative + origin,
                    discharge_time,
                    variant,
                }),
                None => tracing::debug!(
                    variant = %variant,
                    range = relative.norm(),
                    "discharge time not representable, branch skipped"
                ),
            }
        }

        Ok(candidates)
    }

    fn pseudo_inverse(&self, a: DMatrix<f64>) -> Result<DMatrix<f64>, SolveError> {
        if a.iter().any(|value| !value.is_finite()) {
            return Err(SolveError::SingularSystem {
                reason: "non-finite sensor geometry".to_string(),
            });
        }

        let svd = a.svd(true, true);
        let largest = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
        let smallest = svd.singular_values.iter().cloned().fold(f64::INFINITY, f64::min);

        if largest <= 0.0 || smallest < self.rank_tolerance * largest {
            return Err(SolveError::SingularSystem {
                reason: format!(
                    "rank deficient geometry (singular values {:e} / {:e})",
                    smallest, largest
                ),
            });
        }

        svd.pseudo_inverse(self.rank_tolerance * largest)
            .map_err(|reason| SolveError::SingularSystem {
                reason: reason.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 9, 13, 12, 0, 0).unwrap()
    }

    fn arrivals_from(source: Vector2<f64>, positions: &[Vector2<f64>], speed: f64) -> Vec<DateTime<Utc>> {
        positions
            .iter()
            .map(|p| offset_by_seconds(epoch(), (p - source).norm() / speed).unwrap())
            .collect()
    }

    fn square_array() -> Vec<Vector2<f64>> {
        vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1000.0, 0.0),
            Vector2::new(0.0, 1000.0),
            Vector2::new(1000.0, 1000.0),
        ]
    }

    #[test]
    fn test_exact_arrivals_recover_source_from_every_reference() {
        let speed = 343.0;
        let source = Vector2::new(300.0, 400.0);
        let positions = square_array();
        let arrivals = arrivals_from(source, &positions, speed);
        let solver = Multilaterator::new();

        for reference in 0..positions.len() {
            let candidates = solver.solve(&positions, &arrivals, reference, speed).unwrap();
            assert_eq!(candidates.len(), 2);
            assert_eq!(candidates[0].variant, Algorithm::Reddi2DPositiveRoot);
            assert_eq!(candidates[1].variant, Algorithm::Reddi2DNegativeRoot);

            let best = candidates
                .iter()
                .min_by(|a, b| (a.position - source).norm().total_cmp(&(b.position - source).norm()))
                .unwrap();
            assert!((best.position - source).norm() < 1e-3, "reference {}", reference);
            assert!(seconds_between(best.discharge_time, epoch()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_three_sensors_are_enough() {
        let speed = 343.0;
        let source = Vector2::new(300.0, 400.0);
        let positions = &square_array()[..3];
        let arrivals = arrivals_from(source, positions, speed);

        let candidates = Multilaterator::new().solve(positions, &arrivals, 2, speed).unwrap();
        assert!(candidates.iter().any(|c| (c.position - source).norm() < 1e-3));
    }

    #[test]
    fn test_insufficient_pulses() {
        let positions = vec![Vector2::new(0.0, 0.0), Vector2::new(10.0, 0.0)];
        let arrivals = vec![epoch(), epoch()];

        let result = Multilaterator::new().solve(&positions, &arrivals, 0, 343.0);
        assert_eq!(
            result,
            Err(SolveError::InsufficientPulses { available: 2, required: 3 })
        );
    }

    #[test]
    fn test_collinear_sensors_are_singular() {
        let speed = 343.0;
        let positions = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(100.0, 0.0),
            Vector2::new(200.0, 0.0),
        ];
        let arrivals = arrivals_from(Vector2::new(50.0, 80.0), &positions, speed);

        for reference in 0..3 {
            let result = Multilaterator::new().solve(&positions, &arrivals, reference, speed);
            assert!(matches!(result, Err(SolveError::SingularSystem { .. })));
        }
    }

    #[test]
    fn test_duplicate_sensor_positions_are_singular() {
        let positions = vec![
            Vector2::new(5.0, 5.0),
            Vector2::new(5.0, 5.0),
            Vector2::new(5.0, 5.0),
        ];
        let arrivals = vec![epoch(); 3];

        let result = Multilaterator::new().solve(&positions, &arrivals, 0, 343.0);
        assert!(matches!(result, Err(SolveError::SingularSystem { .. })));
    }

    #[test]
    fn test_unit_range_difference_is_degenerate() {
        // one baseline fully spanned by its range difference, the other not at all
        let positions = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ];
        let arrivals = vec![epoch(), offset_by_seconds(epoch(), 1.0).unwrap(), epoch()];

        let result = Multilaterator::new().solve(&positions, &arrivals, 0, 1.0);
        assert_eq!(result, Err(SolveError::DegenerateQuadratic));
    }

    #[test]
    fn test_inconsistent_arrivals_have_no_real_root() {
        let speed = 343.0;
        let positions = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(100.0, 0.0),
            Vector2::new(0.0, 100.0),
        ];
        // range differences of 200 m across 100 m baselines
        let arrivals = vec![
            epoch(),
            offset_by_seconds(epoch(), 200.0 / speed).unwrap(),
            offset_by_seconds(epoch(), -200.0 / speed).unwrap(),
        ];

        for reference in 0..3 {
            let result = Multilaterator::new().solve(&positions, &arrivals, reference, speed);
            match result {
                Err(SolveError::NoRealRoot { discriminant }) => assert!(discriminant < 0.0),
                other => panic!("expected NoRealRoot, got {:?}", other),
            }
        }
    }
}
