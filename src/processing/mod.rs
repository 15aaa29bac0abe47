//! Pulse ingestion, recordings, zone reconciliation and synthetic data

pub mod parser;
pub mod synthetic;
pub mod wav;
pub mod zones;

pub use parser::{IngestError, PulseBatch, PulseParser, Weather};
pub use synthetic::{SyntheticError, SyntheticScenario};
pub use wav::{batch_from_picks, PulsePick, SensorRecording, WavError};
pub use zones::{project_pulse, project_pulses, ZoneCoercer};
