//! Core types and constants for discharge location

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
