//! Core location algorithms

pub mod coordinates;
pub mod multilateration;
pub mod selection;
pub mod sound_speed;

pub use coordinates::{PlanarCoordinate, ProjectionAdapter, ProjectionError, UtmProjection};
pub use multilateration::Multilaterator;
pub use selection::CandidateSelector;
pub use sound_speed::speed_of_sound;
