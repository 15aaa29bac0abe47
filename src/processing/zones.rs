//! Projection of pulses and reconciliation into one common zone

use nalgebra::Vector3;

use crate::algorithms::coordinates::{ProjectionAdapter, ProjectionError};
use crate::core::{ProjectedPulse, Pulse, ZONE_DROP_DISTANCE};
use crate::validation::diagnostics::DiagnosticSink;
use crate::validation::error::{Diagnostic, DiagnosticKind, LocationError};

/// Project a pulse into its natural zone
pub fn project_pulse<P: ProjectionAdapter + ?Sized>(
    pulse: &Pulse,
    projection: &P,
) -> Result<ProjectedPulse, LocationError> {
    let planar = projection
        .geodetic_to_planar(pulse.location.latitude, pulse.location.longitude)
        .map_err(|source| LocationError::Projection {
            pulse_id: pulse.pulse_id,
            sensor_id: pulse.sensor_id.clone(),
            source,
        })?;

    Ok(ProjectedPulse {
        pulse_id: pulse.pulse_id,
        sensor_id: pulse.sensor_id.clone(),
        arrival_time: pulse.arrival_time,
        planar_position: Vector3::new(planar.easting, planar.northing, pulse.location.elevation),
        zone_number: planar.zone_number,
        zone_letter: planar.zone_letter,
    })
}

pub fn project_pulses<P: ProjectionAdapter + ?Sized>(
    pulses: &[Pulse],
    projection: &P,
) -> Result<Vec<ProjectedPulse>, LocationError> {
    pulses.iter().map(|pulse| project_pulse(pulse, projection)).collect()
}

/// Most frequent key; ties resolve to the first key seen
fn majority<K: PartialEq + Copy>(keys: impl IntoIterator<Item = K>) -> Option<K> {
    let mut table: Vec<(K, usize)> = Vec::new();
    for key in keys {
        match table.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => table.push((key, 1)),
        }
    }

    let mut best: Option<(K, usize)> = None;
    for &(key, count) in &table {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((key, count));
        }
    }
    best.map(|(key, _)| key)
}

/// Brings every pulse of a batch into one projection zone and band
pub struct ZoneCoercer<'a, P: ProjectionAdapter + ?Sized> {
    projection: &'a P,
}

impl<'a, P: ProjectionAdapter + ?Sized> ZoneCoercer<'a, P> {
    pub fn new(projection: &'a P) -> Self {
        Self { projection }
    }

    /// Target zone number and letter, chosen by independent majorities.
    ///
    /// The pair need not match any single pulse. Returns `None` for an empty
    /// batch.
    pub fn target_zone(pulses: &[ProjectedPulse]) -> Option<(u8, char)> {
        let number = majority(pulses.iter().map(|p| p.zone_number));
        let letter = majority(pulses.iter().map(|p| p.zone_letter));
        number.zip(letter)
    }

    /// Coerce pulses into the majority zone, preserving input order.
    ///
    /// Pulses exactly two zones from the target are dropped; others are
    /// reprojected. A batch already in one zone and band is returned as is.
    pub fn coerce(&self, pulses: Vec<ProjectedPulse>, sink: &dyn DiagnosticSink) -> Vec<ProjectedPulse> {
        let (target_number, target_letter) = match Self::target_zone(&pulses) {
            Some(target) => target,
            None => return pulses,
        };

        let stray = pulses
            .iter()
            .filter(|p| p.zone() != (target_number, target_letter))
            .count();
        if stray == 0 {
            return pulses;
        }

        tracing::debug!(
            zone = target_number,
            letter = %target_letter,
            stray,
            "coercing pulses into majority zone"
        );

        let mut coerced = Vec::with_capacity(pulses.len());
        for pulse in pulses {
            if pulse.zone() == (target_number, target_letter) {
                coerced.push(pulse);
                continue;
            }

            let distance = (i32::from(pulse.zone_number) - i32::from(target_number)).abs();
            if distance == ZONE_DROP_DISTANCE {
                sink.record(&Diagnostic::new(
                    DiagnosticKind::ZoneCoercionDataLoss,
                    format!(
                        "pulse {} from sensor {} in zone {}{} dropped, two zones from {}{}",
                        pulse.pulse_id,
                        pulse.sensor_id,
                        pulse.zone_number,
                        pulse.zone_letter,
                        target_number,
                        target_letter
                    ),
                ));
                continue;
            }

            match self.reproject(&pulse, target_number, target_letter) {
                Ok(reprojected) => coerced.push(reprojected),
                Err(e) => sink.record(&Diagnostic::new(
                    DiagnosticKind::ProjectionFailure,
                    format!(
                        "pulse {} from sensor {} cannot be moved into zone {}{}: {}",
                        pulse.pulse_id, pulse.sensor_id, target_number, target_letter, e
                    ),
                )),
            }
        }

        coerced
    }

    fn reproject(
        &self,
        pulse: &ProjectedPulse,
        zone_number: u8,
        zone_letter: char,
    ) -> Result<ProjectedPulse, ProjectionError> {
        let (latitude, longitude) = self.projection.planar_to_geodetic(
            pulse.easting(),
            pulse.northing(),
            pulse.zone_number,
            pulse.zone_letter,
        )?;
        let (easting, northing) =
            self.projection
                .geodetic_to_planar_forced(latitude, longitude, zone_number, zone_letter)?;

        Ok(ProjectedPulse {
            pulse_id: pulse.pulse_id,
            sensor_id: pulse.sensor_id.clone(),
            arrival_time: pulse.arrival_time,
            planar_position: Vector3::new(easting, northing, pulse.elevation()),
            zone_number,
            zone_letter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::coordinates::UtmProjection;
    use crate::core::GeodeticPosition;
    use crate::validation::diagnostics::MemorySink;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn projected(points: &[(f64, f64)]) -> Vec<ProjectedPulse> {
        let time = Utc.with_ymd_and_hms(2022, 9, 13, 12, 0, 0).unwrap();
        let pulses: Vec<Pulse> = points
            .iter()
            .enumerate()
            .map(|(i, &(lat, lon))| {
                Pulse::new(
                    Uuid::new_v4(),
                    format!("SN-{}", i),
                    time,
                    GeodeticPosition::new(lat, lon, 100.0 + i as f64),
                )
            })
            .collect();
        project_pulses(&pulses, &UtmProjection::new()).unwrap()
    }

    #[test]
    fn test_single_zone_is_unchanged() {
        let utm = UtmProjection::new();
        let pulses = projected(&[(35.0, -81.0), (35.0, -80.99), (35.01, -80.98)]);
        let sink = MemorySink::new();

        let coerced = ZoneCoercer::new(&utm).coerce(pulses.clone(), &sink);

        assert_eq!(coerced, pulses);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_adjacent_zone_reprojected_and_two_away_dropped() {
        let utm = UtmProjection::new();
        let pulses = projected(&[
            (35.0, -81.0),
            (35.0, -80.99),
            (35.0, -80.98),
            (35.0, -77.9), // zone 18
            (35.0, -70.0), // zone 19
        ]);
        assert_eq!(pulses[3].zone_number, 18);
        assert_eq!(pulses[4].zone_number, 19);
        let sink = MemorySink::new();

        let coerced = ZoneCoercer::new(&utm).coerce(pulses.clone(), &sink);

        assert_eq!(coerced.len(), 4);
        assert!(coerced.iter().all(|p| p.zone() == (17, 'S')));
        assert!(coerced.iter().all(|p| p.sensor_id != "SN-4"));
        assert_eq!(sink.count(DiagnosticKind::ZoneCoercionDataLoss), 1);

        let moved = &coerced[3];
        assert_eq!(moved.pulse_id, pulses[3].pulse_id);
        assert_eq!(moved.arrival_time, pulses[3].arrival_time);
        assert_eq!(moved.elevation(), pulses[3].elevation());

        let (easting, northing) = utm.geodetic_to_planar_forced(35.0, -77.9, 17, 'S').unwrap();
        assert!((moved.easting() - easting).abs() < 1e-3);
        assert!((moved.northing() - northing).abs() < 1e-3);
    }

    #[test]
    fn test_independent_majorities_may_form_new_pair() {
        let utm = UtmProjection::new();
        let pulses = projected(&[
            (40.01, -81.0), // 17T
            (40.02, -81.0), // 17T
            (39.99, -87.0), // 16S
            (39.99, -75.0), // 18S
            (39.98, -93.0), // 15S
        ]);

        assert_eq!(ZoneCoercer::<UtmProjection>::target_zone(&pulses), Some((17, 'S')));

        let sink = MemorySink::new();
        let coerced = ZoneCoercer::new(&utm).coerce(pulses, &sink);

        assert_eq!(coerced.len(), 4);
        assert!(coerced.iter().all(|p| p.zone() == (17, 'S')));
        assert_eq!(sink.count(DiagnosticKind::ZoneCoercionDataLoss), 1);
    }

    #[test]
    fn test_majority_ties_take_first_key() {
        assert_eq!(majority([18u8, 17, 17, 18]), Some(18));
        assert_eq!(majority(['T', 'S']), Some('T'));
        assert_eq!(majority(Vec::<u8>::new()), None);
    }

    #[test]
    fn test_out_of_domain_pulse_fails_projection() {
        let time = Utc.with_ymd_and_hms(2022, 9, 13, 12, 0, 0).unwrap();
        let pulse = Pulse::new(Uuid::new_v4(), "SN-X", time, GeodeticPosition::new(86.0, 10.0, 0.0));

        let result = project_pulse(&pulse, &UtmProjection::new());
        assert!(matches!(result, Err(LocationError::Projection { ref sensor_id, .. }) if sensor_id == "SN-X"));
    }
}
