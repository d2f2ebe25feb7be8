//! Geometry helpers: WGS84 coordinates, haversine distance and location fuzzing.
//!
//! Every coordinate that leaves the session store has gone through
//! [`fuzz`]. The coarser [`redact`] helper exists only so that log lines never
//! carry anything finer than city-level precision.
//!
//! ## Example
//!
//! ```
//! use live_match::geo::{Coordinate, fuzz, haversine_km};
//!
//! let home = Coordinate::new(40.0, -74.0).unwrap();
//! let reported = fuzz(home, 0.5).unwrap();
//! assert!(haversine_km(home, reported) < 0.6);
//! ```

pub mod errors;
pub mod fuzzer;

pub use errors::{GeoError, GeoResult};
pub use fuzzer::{FUZZ_DECIMALS, REDACT_DECIMALS, fuzz, fuzz_with_rng, redact};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean earth radius used for haversine distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres covered by one degree of latitude
pub const KM_PER_DEGREE: f64 = 111.32;

/// A validated WGS84 coordinate
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Validate and build a coordinate
    ///
    /// # Errors
    ///
    /// * `GeoError::InvalidCoordinate` - Latitude outside [-90, 90], longitude
    ///   outside [-180, 180], or either value not finite
    pub fn new(latitude: f64, longitude: f64) -> GeoResult<Self> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(GeoError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Coordinate rounded for log output
    pub fn redacted(&self) -> Redacted {
        Redacted(redact(*self))
    }
}

// Debug output is used by log macros; keep it at log precision.
impl fmt::Debug for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = redact(*self);
        write!(f, "Coordinate({:.2}, {:.2})", r.latitude, r.longitude)
    }
}

/// City-level view of a coordinate, safe to log
#[derive(Clone, Copy)]
pub struct Redacted(Coordinate);

impl fmt::Display for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.0.latitude, self.0.longitude)
    }
}

/// Great-circle distance between two coordinates in kilometres
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(Coordinate::new(90.01, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_haversine_known_distance() {
        // New York to Los Angeles, roughly 3936 km
        let nyc = Coordinate::new(40.7128, -74.0060).unwrap();
        let la = Coordinate::new(34.0522, -118.2437).unwrap();
        let d = haversine_km(nyc, la);
        assert!((d - 3936.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_haversine_across_antimeridian() {
        let east = Coordinate::new(0.0, 179.9).unwrap();
        let west = Coordinate::new(0.0, -179.9).unwrap();
        assert!(haversine_km(east, west) < 23.0);
    }

    #[test]
    fn test_haversine_zero() {
        let p = Coordinate::new(51.5, -0.12).unwrap();
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn test_debug_is_redacted() {
        let p = Coordinate::new(40.712_345, -74.006_789).unwrap();
        assert_eq!(format!("{p:?}"), "Coordinate(40.71, -74.01)");
        assert_eq!(p.redacted().to_string(), "(40.71, -74.01)");
    }
}
