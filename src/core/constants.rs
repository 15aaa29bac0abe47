//! Physical constants and system parameters

/// Speed of sound coefficient in dry air (m/s per sqrt(K))
pub const SPEED_OF_SOUND_COEFFICIENT: f64 = 20.03;

/// Offset between Celsius and Kelvin
pub const CELSIUS_TO_KELVIN: f64 = 273.15;

/// Minimum number of pulses for a 2-D solve (one reference plus two others)
pub const MIN_PULSES: usize = 3;

/// Zone-number distance at which a pulse is dropped instead of reprojected
pub const ZONE_DROP_DISTANCE: i32 = 2;

/// Default upper bound on the fit error of a viable location (m^2)
pub const DEFAULT_MAX_FIT_ERROR: f64 = 10_000.0;

/// Singular values below this fraction of the largest one mark a rank-deficient system
pub const SINGULAR_VALUE_TOLERANCE: f64 = 1e-10;

/// Tracing target of every diagnostic event
pub const DIAGNOSTICS_TARGET: &str = "discharge_locator::diagnostics";

/// Default `sink` field value on diagnostic events
pub const DEFAULT_SINK_NAME: &str = "locator";

/// Default append-only diagnostics file
pub const DEFAULT_DIAGNOSTICS_FILE: &str = "error.log";
