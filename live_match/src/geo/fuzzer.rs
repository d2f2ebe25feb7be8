//! Bounded-radius location fuzzing.

use super::{Coordinate, GeoError, GeoResult, KM_PER_DEGREE};
use rand::Rng;
use std::f64::consts::TAU;

/// Decimal places kept on fuzzed coordinates (~111 m grid)
pub const FUZZ_DECIMALS: i32 = 3;

/// Decimal places kept by the log redaction helper (~1.1 km grid)
pub const REDACT_DECIMALS: i32 = 2;

/// Below this cos(latitude) the longitude correction is clamped.
const MIN_LONGITUDE_SCALE: f64 = 0.01;

/// Fuzz a coordinate within `radius_km`
///
/// Draws a fresh random offset on every call; two sessions started from the
/// same spot get independent draws.
///
/// # Arguments
///
/// * `origin` - True coordinate
/// * `radius_km` - Maximum offset before rounding
///
/// # Returns
///
/// * `GeoResult<Coordinate>` - Perturbed coordinate on a 3-decimal grid
///
/// # Errors
///
/// * `GeoError::InvalidRadius` - Radius negative or not finite
pub fn fuzz(origin: Coordinate, radius_km: f64) -> GeoResult<Coordinate> {
    fuzz_with_rng(&mut rand::rng(), origin, radius_km)
}

/// Fuzz with a caller-supplied random source
pub fn fuzz_with_rng<R: Rng + ?Sized>(
    rng: &mut R,
    origin: Coordinate,
    radius_km: f64,
) -> GeoResult<Coordinate> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(GeoError::InvalidRadius(radius_km));
    }

    let angle = rng.random::<f64>() * TAU;
    // sqrt keeps the density uniform over the disc instead of piling up at the centre
    let distance_km = radius_km * rng.random::<f64>().sqrt();

    let d_lat = distance_km * angle.cos() / KM_PER_DEGREE;
    let longitude_scale = origin
        .latitude
        .to_radians()
        .cos()
        .abs()
        .max(MIN_LONGITUDE_SCALE);
    let d_lon = distance_km * angle.sin() / (KM_PER_DEGREE * longitude_scale);

    let latitude = (origin.latitude + d_lat).clamp(-90.0, 90.0);
    let longitude = wrap_longitude(origin.longitude + d_lon);

    Ok(Coordinate {
        latitude: round_to(latitude, FUZZ_DECIMALS).clamp(-90.0, 90.0),
        longitude: wrap_longitude(round_to(longitude, FUZZ_DECIMALS)),
    })
}

/// Round a coordinate to city-level precision for logging
///
/// Applies no random offset and must not be used for session coordinates.
pub fn redact(coordinate: Coordinate) -> Coordinate {
    Coordinate {
        latitude: round_to(coordinate.latitude, REDACT_DECIMALS),
        longitude: round_to(coordinate.longitude, REDACT_DECIMALS),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        return longitude;
    }
    let wrapped = (longitude + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid maps +180 onto -180; both name the same meridian
    if wrapped == -180.0 && longitude > 0.0 {
        180.0
    } else {
        wrapped
    }
}
