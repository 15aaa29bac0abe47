//! Acoustic discharge location
//!
//! Locates the origin of an acoustic event from the arrival times of its
//! pressure pulse at geolocated sensors (time difference of arrival), using
//! Reddi's closed-form 2-D multilateration over a UTM projection.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{Algorithm, GeodeticPosition, LocationOutcome, LocationResult, ProjectedPulse, Pulse};
pub use algorithms::{speed_of_sound, CandidateSelector, Multilaterator, ProjectionAdapter, ProjectionError, UtmProjection};
pub use processing::{IngestError, PulseBatch, PulseParser, SyntheticScenario, Weather, ZoneCoercer};
pub use validation::{
    Diagnostic, DiagnosticKind, DiagnosticSink, FileSink, LocationError, MemorySink, Severity, SolveError, TeeSink,
    TracingSink,
};
pub use utils::{init_logging, LocatorConfig, LogConfig};
pub use api::{LocationPipeline, OutputFormat};
