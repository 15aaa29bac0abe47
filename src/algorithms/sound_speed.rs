//! Speed of sound in air

use crate::core::{CELSIUS_TO_KELVIN, SPEED_OF_SOUND_COEFFICIENT};

/// Speed of sound (m/s) for an air temperature in degrees Celsius.
///
/// Returns NaN below absolute zero.
pub fn speed_of_sound(temperature_c: f64) -> f64 {
    SPEED_OF_SOUND_COEFFICIENT * (temperature_c + CELSIUS_TO_KELVIN).sqrt()
}

/// True when `speed` can be used to convert time differences to ranges
pub fn is_usable_speed(speed: f64) -> bool {
    speed.is_finite() && speed > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_at_reference_temperatures() {
        assert!((speed_of_sound(0.0) - 331.0).abs() < 0.1);
        assert!((speed_of_sound(20.0) - 343.0).abs() < 0.2);
        assert!(speed_of_sound(35.0) > speed_of_sound(-10.0));
    }

    #[test]
    fn test_unusable_speeds() {
        assert!(!is_usable_speed(speed_of_sound(-300.0)));
        assert!(!is_usable_speed(speed_of_sound(-CELSIUS_TO_KELVIN)));
        assert!(is_usable_speed(speed_of_sound(-40.0)));
    }
}
