//! Geodetic <-> planar projection for sensor arrays
//!
//! Sensor positions are solved in Universal Transverse Mercator coordinates,
//! which are locally near-Cartesian. The adapter supports projecting a point
//! into an explicit zone and band so that arrays straddling a zone boundary
//! can be unified into one planar frame.
//!
//! The false northing is chosen from the hemisphere of the zone letter, not
//! from the sign of the point's latitude. A northern point forced into a
//! southern band therefore carries the southern false northing and converts
//! back to the correct hemisphere.

use thiserror::Error;

/// Semi-major axis (WGS84)
pub const EARTH_RADIUS_WGS84: f64 = 6378137.0;

/// Eccentricity squared (WGS84)
pub const ECCENTRICITY_SQUARED_WGS84: f64 = 0.00669438;

/// UTM central meridian scale factor
pub const UTM_SCALE_FACTOR: f64 = 0.9996;

pub const UTM_FALSE_EASTING: f64 = 500_000.0;

pub const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Latitude band letters from -80 to 84 degrees in 8 degree steps (X is 12 degrees)
pub const ZONE_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWXX";

pub const MIN_LATITUDE: f64 = -80.0;
pub const MAX_LATITUDE: f64 = 84.0;

/// Projection failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("{field} {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid zone {zone_number}{zone_letter}")]
    InvalidZone { zone_number: u8, zone_letter: char },
}

/// Planar coordinates with the zone they are expressed in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarCoordinate {
    pub easting: f64,
    pub northing: f64,
    pub zone_number: u8,
    pub zone_letter: char,
}

/// Conversion between geodetic and planar projected coordinates
pub trait ProjectionAdapter: Send + Sync {
    /// Project into the point's natural zone and band
    fn geodetic_to_planar(&self, latitude: f64, longitude: f64) -> Result<PlanarCoordinate, ProjectionError>;

    /// Project into an explicit zone and band, returning (easting, northing)
    fn geodetic_to_planar_forced(
        &self,
        latitude: f64,
        longitude: f64,
        zone_number: u8,
        zone_letter: char,
    ) -> Result<(f64, f64), ProjectionError>;

    /// Inverse projection, returning (latitude, longitude)
    fn planar_to_geodetic(
        &self,
        easting: f64,
        northing: f64,
        zone_number: u8,
        zone_letter: char,
    ) -> Result<(f64, f64), ProjectionError>;
}

/// Series coefficients derived from the ellipsoid
#[derive(Debug, Clone, Copy)]
struct SeriesCoefficients {
    e: f64,
    e_p2: f64,
    m1: f64,
    m2: f64,
    m3: f64,
    m4: f64,
    p2: f64,
    p3: f64,
    p4: f64,
    p5: f64,
}

impl SeriesCoefficients {
    fn new(e: f64) -> Self {
        let e2 = e * e;
        let e3 = e2 * e;
        let sqrt_e = (1.0 - e).sqrt();
        let n = (1.0 - sqrt_e) / (1.0 + sqrt_e);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;

        Self {
            e,
            e_p2: e / (1.0 - e),
            m1: 1.0 - e / 4.0 - 3.0 * e2 / 64.0 - 5.0 * e3 / 256.0,
            m2: 3.0 * e / 8.0 + 3.0 * e2 / 32.0 + 45.0 * e3 / 1024.0,
            m3: 15.0 * e2 / 256.0 + 45.0 * e3 / 1024.0,
            m4: 35.0 * e3 / 3072.0,
            p2: 3.0 / 2.0 * n - 27.0 / 32.0 * n3 + 269.0 / 512.0 * n5,
            p3: 21.0 / 16.0 * n2 - 55.0 / 32.0 * n4,
            p4: 151.0 / 96.0 * n3 - 417.0 / 128.0 * n5,
            p5: 1097.0 / 512.0 * n4,
        }
    }
}

/// WGS84 Universal Transverse Mercator projection
#[derive(Debug, Clone, Copy)]
pub struct UtmProjection {
    radius: f64,
    scale_factor: f64,
    series: SeriesCoefficients,
}

impl Default for UtmProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl UtmProjection {
    pub fn new() -> Self {
        Self {
            radius: EARTH_RADIUS_WGS84,
            scale_factor: UTM_SCALE_FACTOR,
            series: SeriesCoefficients::new(ECCENTRICITY_SQUARED_WGS84),
        }
    }

    /// Natural zone number, including the Norway and Svalbard exceptions
    pub fn zone_number(latitude: f64, longitude: f64) -> u8 {
        if (56.0..64.0).contains(&latitude) && (3.0..12.0).contains(&longitude) {
            return 32;
        }

        if (72.0..=84.0).contains(&latitude) && longitude >= 0.0 {
            if longitude < 9.0 {
                return 31;
            } else if longitude < 21.0 {
                return 33;
            } else if longitude < 33.0 {
                return 35;
            } else if longitude < 42.0 {
                return 37;
            }
        }

        if longitude >= 180.0 {
            return 60;
        }

        (((longitude + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8
    }

    /// Latitude band letter, `None` outside [-80, 84]
    pub fn zone_letter(latitude: f64) -> Option<char> {
        if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
            return None;
        }
        let index = ((latitude + 80.0) as usize) >> 3;
        ZONE_LETTERS.get(index).map(|&b| b as char)
    }

    pub fn central_longitude(zone_number: u8) -> f64 {
        (zone_number as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    /// Bands N..X lie in the northern hemisphere
    pub fn is_northern(zone_letter: char) -> bool {
        zone_letter.to_ascii_uppercase() >= 'N'
    }

    fn validate_zone(zone_number: u8, zone_letter: char) -> Result<char, ProjectionError> {
        let letter = zone_letter.to_ascii_uppercase();
        if !(1..=60).contains(&zone_number) || !ZONE_LETTERS.contains(&(letter as u8)) {
            return Err(ProjectionError::InvalidZone { zone_number, zone_letter });
        }
        Ok(letter)
    }

    fn validate_geodetic(latitude: f64, longitude: f64) -> Result<(), ProjectionError> {
        if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
            return Err(ProjectionError::OutOfRange {
                field: "latitude",
                value: latitude,
                min: MIN_LATITUDE,
                max: MAX_LATITUDE,
            });
        }
        if !(-180.0..180.0).contains(&longitude) {
            return Err(ProjectionError::OutOfRange {
                field: "longitude",
                value: longitude,
                min: -180.0,
                max: 180.0,
            });
        }
        Ok(())
    }

    fn project(&self, latitude: f64, longitude: f64, zone_number: u8, northern: bool) -> (f64, f64) {
        let s = &self.series;
        let lat_rad = latitude.to_radians();
        let lat_sin = lat_rad.sin();
        let lat_cos = lat_rad.cos();
        let lat_tan = lat_sin / lat_cos;
        let lat_tan2 = lat_tan * lat_tan;
        let lat_tan4 = lat_tan2 * lat_tan2;

        let central = Self::central_longitude(zone_number).to_radians();

        let n = self.radius / (1.0 - s.e * lat_sin * lat_sin).sqrt();
        let c = s.e_p2 * lat_cos * lat_cos;

        let a = lat_cos * wrap_angle(longitude.to_radians() - central);
        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a3 * a;
        let a5 = a4 * a;
        let a6 = a5 * a;

        let m = self.radius
            * (s.m1 * lat_rad - s.m2 * (2.0 * lat_rad).sin() + s.m3 * (4.0 * lat_rad).sin()
                - s.m4 * (6.0 * lat_rad).sin());

        let easting = self.scale_factor
            * n
            * (a + a3 / 6.0 * (1.0 - lat_tan2 + c)
                + a5 / 120.0 * (5.0 - 18.0 * lat_tan2 + lat_tan4 + 72.0 * c - 58.0 * s.e_p2))
            + UTM_FALSE_EASTING;

        let mut northing = self.scale_factor
            * (m + n
                * lat_tan
                * (a2 / 2.0
                    + a4 / 24.0 * (5.0 - lat_tan2 + 9.0 * c + 4.0 * c * c)
                    + a6 / 720.0 * (61.0 - 58.0 * lat_tan2 + lat_tan4 + 600.0 * c - 330.0 * s.e_p2)));

        if !northern {
            northing += UTM_FALSE_NORTHING_SOUTH;
        }

        (easting, northing)
    }
}

impl ProjectionAdapter for UtmProjection {
    fn geodetic_to_planar(&self, latitude: f64, longitude: f64) -> Result<PlanarCoordinate, ProjectionError> {
        Self::validate_geodetic(latitude, longitude)?;
        let zone_number = Self::zone_number(latitude, longitude);
        let zone_letter = Self::zone_letter(latitude).ok_or(ProjectionError::OutOfRange {
            field: "latitude",
            value: latitude,
            min: MIN_LATITUDE,
            max: MAX_LATITUDE,
        })?;

        let (easting, northing) = self.project(latitude, longitude, zone_number, Self::is_northern(zone_letter));
        Ok(PlanarCoordinate {
            easting,
            northing,
            zone_number,
            zone_letter,
        })
    }

    fn geodetic_to_planar_forced(
        &self,
        latitude: f64,
        longitude: f64,
        zone_number: u8,
        zone_letter: char,
    ) -> Result<(f64, f64), ProjectionError> {
        Self::validate_geodetic(latitude, longitude)?;
        let letter = Self::validate_zone(zone_number, zone_letter)?;
        Ok(self.project(latitude, longitude, zone_number, Self::is_northern(letter)))
    }

    fn planar_to_geodetic(
        &self,
        easting: f64,
        northing: f64,
        zone_number: u8,
        zone_letter: char,
    ) -> Result<(f64, f64), ProjectionError> {
        let letter = Self::validate_zone(zone_number, zone_letter)?;
        for (field, value) in [("easting", easting), ("northing", northing)] {
            if !value.is_finite() {
                return Err(ProjectionError::OutOfRange {
                    field,
                    value,
                    min: f64::MIN,
                    max: f64::MAX,
                });
            }
        }

        let s = &self.series;
        let x = easting - UTM_FALSE_EASTING;
        let mut y = northing;
        if !Self::is_northern(letter) {
            y -= UTM_FALSE_NORTHING_SOUTH;
        }

        let m = y / self.scale_factor;
        let mu = m / (self.radius * s.m1);

        let p_rad = mu
            + s.p2 * (2.0 * mu).sin()
            + s.p3 * (4.0 * mu).sin()
            + s.p4 * (6.0 * mu).sin()
            + s.p5 * (8.0 * mu).sin();

        let p_sin = p_rad.sin();
        let p_sin2 = p_sin * p_sin;
        let p_cos = p_rad.cos();
        let p_tan = p_sin / p_cos;
        let p_tan2 = p_tan * p_tan;
        let p_tan4 = p_tan2 * p_tan2;

        let ep_sin = 1.0 - s.e * p_sin2;
        let n = self.radius / ep_sin.sqrt();
        let r = (1.0 - s.e) / ep_sin;
        let c = s.e_p2 * p_cos * p_cos;
        let c2 = c * c;

        let d = x / (n * self.scale_factor);
        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d3 * d;
        let d5 = d4 * d;
        let d6 = d5 * d;

        let latitude = p_rad
            - (p_tan / r)
                * (d2 / 2.0 - d4 / 24.0 * (5.0 + 3.0 * p_tan2 + 10.0 * c - 4.0 * c2 - 9.0 * s.e_p2)
                    + d6 / 720.0 * (61.0 + 90.0 * p_tan2 + 298.0 * c + 45.0 * p_tan4 - 252.0 * s.e_p2 - 3.0 * c2));

        let longitude = (d - d3 / 6.0 * (1.0 + 2.0 * p_tan2 + c)
            + d5 / 120.0 * (5.0 - 2.0 * c + 28.0 * p_tan2 - 3.0 * c2 + 8.0 * s.e_p2 + 24.0 * p_tan4))
            / p_cos;

        let longitude = wrap_angle(longitude + Self::central_longitude(zone_number).to_radians());
        let (latitude, longitude) = (latitude.to_degrees(), longitude.to_degrees());

        // planar points far outside the zone fold the series past the poles
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ProjectionError::OutOfRange {
                field: "latitude",
                value: latitude,
                min: -90.0,
                max: 90.0,
            });
        }
        if !longitude.is_finite() {
            return Err(ProjectionError::OutOfRange {
                field: "longitude",
                value: longitude,
                min: -180.0,
                max: 180.0,
            });
        }

        Ok((latitude, longitude))
    }
}

/// Wrap an angle into [-pi, pi)
fn wrap_angle(value: f64) -> f64 {
    use std::f64::consts::PI;
    (value + PI).rem_euclid(2.0 * PI) - PI
}
