//! End-to-end location pipeline
//!
//! project -> coerce zones -> speed of sound -> reference search ->
//! back-projection -> best-first ranking.

use std::sync::Arc;

use crate::algorithms::coordinates::{ProjectionAdapter, UtmProjection};
use crate::algorithms::selection::CandidateSelector;
use crate::algorithms::sound_speed::{is_usable_speed, speed_of_sound};
use crate::core::{LocationOutcome, Pulse};
use crate::processing::parser::PulseBatch;
use crate::processing::zones::{project_pulses, ZoneCoercer};
use crate::utils::config::LocatorConfig;
use crate::validation::data::PulseValidator;
use crate::validation::diagnostics::{DiagnosticSink, FileSink, TeeSink, TracingSink};
use crate::validation::error::LocationError;

/// Locates a discharge from one batch of pulses
pub struct LocationPipeline<P: ProjectionAdapter = UtmProjection> {
    projection: P,
    selector: CandidateSelector,
    validator: PulseValidator,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for LocationPipeline<UtmProjection> {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationPipeline<UtmProjection> {
    /// UTM projection, default search, diagnostics to `tracing`
    pub fn new() -> Self {
        Self {
            projection: UtmProjection::new(),
            selector: CandidateSelector::default(),
            validator: PulseValidator::default(),
            sink: Arc::new(TracingSink::default()),
        }
    }

    /// Build from configuration; diagnostics go to `tracing` and, when a
    /// log file is configured, to that file as well
    pub fn from_config(config: &LocatorConfig) -> Self {
        let mut tee = TeeSink::new().with(TracingSink::new(config.diagnostics.sink_name.clone()));
        if let Some(ref path) = config.diagnostics.log_file {
            tee = tee.with(FileSink::new(path));
        }

        Self::new()
            .with_selector(
                CandidateSelector::new()
                    .with_max_fit_error(config.search.max_fit_error)
                    .with_parallel(config.search.parallel),
            )
            .with_sink(Arc::new(tee))
    }
}

impl<P: ProjectionAdapter> LocationPipeline<P> {
    pub fn with_projection<Q: ProjectionAdapter>(self, projection: Q) -> LocationPipeline<Q> {
        LocationPipeline {
            projection,
            selector: self.selector,
            validator: self.validator,
            sink: self.sink,
        }
    }

    pub fn with_selector(mut self, selector: CandidateSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_validator(mut self, validator: PulseValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn selector(&self) -> &CandidateSelector {
        &self.selector
    }

    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    pub fn locate(&self, batch: &PulseBatch) -> Result<LocationOutcome, LocationError> {
        self.locate_pulses(&batch.pulses, batch.temperature_c())
    }

    /// Run the full pipeline for one event.
    ///
    /// Numerical failures degrade to `NoViableLocation` or
    /// `InsufficientData`; only unusable input is an `Err`.
    pub fn locate_pulses(&self, pulses: &[Pulse], temperature_c: f64) -> Result<LocationOutcome, LocationError> {
        self.validator.validate_temperature(temperature_c)?;
        self.validator.validate_pulses(pulses)?;

        let speed = speed_of_sound(temperature_c);
        if !is_usable_speed(speed) {
            return Err(LocationError::InvalidSpeed { speed, temperature_c });
        }

        let projected = project_pulses(pulses, &self.projection)?;
        let mut coerced = ZoneCoercer::new(&self.projection).coerce(projected, self.sink.as_ref());
        for pulse in &mut coerced {
            // 2-D solve
            pulse.planar_position.z = 0.0;
        }

        if coerced.len() < pulses.len() {
            tracing::info!(
                received = pulses.len(),
                usable = coerced.len(),
                "pulses lost to zone coercion"
            );
        }

        let outcome = match self
            .selector
            .select(&coerced, speed, &self.projection, self.sink.as_ref())?
        {
            LocationOutcome::Located(mut results) => {
                results.sort_by(|a, b| a.fit_error.total_cmp(&b.fit_error));
                LocationOutcome::Located(results)
            }
            other => other,
        };

        match outcome.best() {
            Some(best) => tracing::info!(
                latitude = best.position.latitude,
                longitude = best.position.longitude,
                fit_error = best.fit_error,
                reference = %best.reference_sensor_id,
                "discharge located"
            ),
            None => tracing::info!(pulses = pulses.len(), "no location found"),
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{seconds_between, GeodeticPosition};
    use crate::processing::synthetic::SyntheticScenario;
    use crate::validation::diagnostics::MemorySink;
    use crate::validation::error::DiagnosticKind;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn discharge_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 9, 13, 12, 0, 0).unwrap()
    }

    fn pipeline_with_memory() -> (LocationPipeline, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (LocationPipeline::new().with_sink(sink.clone()), sink)
    }

    fn scenario(source: (f64, f64), sensors: &[(f64, f64)]) -> SyntheticScenario {
        sensors.iter().enumerate().fold(
            SyntheticScenario::new(GeodeticPosition::new(source.0, source.1, 0.0), discharge_time())
                .with_temperature(18.0),
            |scenario, (i, &(lat, lon))| {
                scenario.with_sensor(format!("SN-{:04}", i + 1), GeodeticPosition::new(lat, lon, 150.0))
            },
        )
    }

    fn planar_error(result: &GeodeticPosition, source: (f64, f64)) -> f64 {
        let utm = UtmProjection::new();
        let truth = utm.geodetic_to_planar(source.0, source.1).unwrap();
        let (easting, northing) = utm
            .geodetic_to_planar_forced(result.latitude, result.longitude, truth.zone_number, truth.zone_letter)
            .unwrap();
        (easting - truth.easting).hypot(northing - truth.northing)
    }

    const SENSORS: [(f64, f64); 5] = [
        (35.0, -81.0),
        (35.0, -80.99),
        (35.01, -80.995),
        (34.995, -80.985),
        (35.008, -81.006),
    ];

    #[test]
    fn test_recovers_synthetic_source() {
        let source = (35.002, -80.995);
        let batch = scenario(source, &SENSORS).generate(&UtmProjection::new()).unwrap();
        let (pipeline, _) = pipeline_with_memory();

        let outcome = pipeline.locate(&batch).unwrap();
        let best = outcome.best().unwrap();

        assert!(planar_error(&best.position, source) < 1.0);
        assert!(best.fit_error < 1e-3);
        assert!(seconds_between(best.discharge_time, discharge_time()).abs() < 1e-3);
        assert_eq!(best.position.elevation, 0.0);
    }

    #[test]
    fn test_results_ranked_best_first() {
        let batch = scenario((35.004, -80.992), &SENSORS)
            .generate(&UtmProjection::new())
            .unwrap();

        let outcome = LocationPipeline::new().locate(&batch).unwrap();
        let results = outcome.results();

        assert_eq!(results.len(), 2);
        assert!(results.windows(2).all(|pair| pair[0].fit_error <= pair[1].fit_error));
        assert_eq!(results[0].reference_sensor_id, results[1].reference_sensor_id);
    }

    #[test]
    fn test_best_result_independent_of_pulse_order() {
        let source = (35.002, -80.995);
        let batch = scenario(source, &SENSORS).generate(&UtmProjection::new()).unwrap();
        let mut reversed = batch.clone();
        reversed.pulses.reverse();
        let mut rotated = batch.clone();
        rotated.pulses.rotate_left(2);

        let pipeline = LocationPipeline::new();
        let expected = pipeline.locate(&batch).unwrap().best().cloned().unwrap();

        for permuted in [reversed, rotated] {
            let best = pipeline.locate(&permuted).unwrap().best().cloned().unwrap();
            assert!((best.position.latitude - expected.position.latitude).abs() < 1e-8);
            assert!((best.position.longitude - expected.position.longitude).abs() < 1e-8);
            assert!(best.fit_error < 1e-3);
        }
    }

    #[test]
    fn test_parallel_search_gives_same_outcome() {
        let batch = scenario((35.002, -80.995), &SENSORS)
            .generate(&UtmProjection::new())
            .unwrap();
        let config = LocatorConfig::new().with_parallel(true).with_log_file(None);

        let sequential = LocationPipeline::new().locate(&batch).unwrap();
        let parallel = LocationPipeline::from_config(&config).locate(&batch).unwrap();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_recovers_source_across_zone_boundary() {
        // zone 17 / 18 boundary at 78 W
        let source = (35.003, -78.004);
        let sensors = [(35.0, -78.02), (35.01, -78.01), (35.0, -77.99), (34.995, -77.985)];
        let batch = scenario(source, &sensors).generate(&UtmProjection::new()).unwrap();
        let (pipeline, sink) = pipeline_with_memory();

        let outcome = pipeline.locate(&batch).unwrap();
        let best = outcome.best().unwrap();

        assert!(planar_error(&best.position, source) < 1.0);
        assert_eq!(sink.count(DiagnosticKind::ZoneCoercionDataLoss), 0);
    }

    #[test]
    fn test_fewer_than_three_pulses() {
        let batch = scenario((35.002, -80.995), &SENSORS[..2])
            .generate(&UtmProjection::new())
            .unwrap();
        let (pipeline, sink) = pipeline_with_memory();

        let outcome = pipeline.locate(&batch).unwrap();

        assert_eq!(outcome, LocationOutcome::InsufficientData { available: 2, required: 3 });
        assert_eq!(sink.count(DiagnosticKind::InsufficientPulses), 1);

        let empty = pipeline.locate_pulses(&[], 20.0).unwrap();
        assert_eq!(empty, LocationOutcome::InsufficientData { available: 0, required: 3 });
    }

    #[test]
    fn test_zone_drop_can_leave_too_few_pulses() {
        let batch = scenario((35.002, -80.995), &[(35.0, -81.0), (35.01, -80.99), (35.0, -70.0)])
            .generate(&UtmProjection::new())
            .unwrap();
        let (pipeline, sink) = pipeline_with_memory();

        let outcome = pipeline.locate(&batch).unwrap();

        assert_eq!(outcome, LocationOutcome::InsufficientData { available: 2, required: 3 });
        assert_eq!(sink.count(DiagnosticKind::ZoneCoercionDataLoss), 1);
    }

    #[test]
    fn test_impossible_arrivals_yield_empty_results() {
        let speed = speed_of_sound(20.0);
        let t0 = discharge_time();
        let offset = |seconds: f64| crate::core::offset_by_seconds(t0, seconds).unwrap();
        // about 100 m baselines with 200 m range differences
        let pulses = vec![
            Pulse::new(Uuid::new_v4(), "A", t0, GeodeticPosition::new(35.0, -81.0, 0.0)),
            Pulse::new(Uuid::new_v4(), "B", offset(200.0 / speed), GeodeticPosition::new(35.0, -80.9989033, 0.0)),
            Pulse::new(Uuid::new_v4(), "C", offset(-200.0 / speed), GeodeticPosition::new(35.0009, -81.0, 0.0)),
        ];
        let (pipeline, sink) = pipeline_with_memory();

        let outcome = pipeline.locate_pulses(&pulses, 20.0).unwrap();

        assert_eq!(outcome, LocationOutcome::NoViableLocation);
        assert!(outcome.results().is_empty());
        assert_eq!(sink.count(DiagnosticKind::NoRealRoot), 3);
    }

    #[test]
    fn test_invalid_input_is_an_error() {
        let batch = scenario((35.002, -80.995), &SENSORS)
            .generate(&UtmProjection::new())
            .unwrap();

        let result = LocationPipeline::new().locate_pulses(&batch.pulses, -300.0);
        assert!(matches!(result, Err(LocationError::Validation(_))));

        let mut polar = batch.pulses.clone();
        polar[0].location.latitude = 85.0;
        let result = LocationPipeline::new().locate_pulses(&polar, 20.0);
        assert!(matches!(result, Err(LocationError::Projection { .. })));
    }

    #[test]
    fn test_config_file_sink_records_singular_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("error.log");
        let config = LocatorConfig::new().with_log_file(Some(log.clone()));

        let t0 = discharge_time();
        // along the zone 17 central meridian, exactly collinear in the plane
        let pulses: Vec<Pulse> = [35.0, 35.01, 35.02]
            .iter()
            .enumerate()
            .map(|(i, &lat)| {
                Pulse::new(
                    Uuid::new_v4(),
                    format!("SN-{}", i),
                    crate::core::offset_by_seconds(t0, i as f64 * 0.5).unwrap(),
                    GeodeticPosition::new(lat, -81.0, 0.0),
                )
            })
            .collect();

        let outcome = LocationPipeline::from_config(&config).locate_pulses(&pulses, 20.0).unwrap();
        assert_eq!(outcome, LocationOutcome::NoViableLocation);

        let content = std::fs::read_to_string(&log).unwrap();
        assert_eq!(content.lines().filter(|l| l.contains("SingularSystem")).count(), 3);
        assert!(content.contains("NoViableLocation"));
    }
}
