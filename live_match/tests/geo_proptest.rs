/// Property-based tests for location fuzzing using proptest
///
/// These tests check that fuzzed coordinates stay inside the requested
/// radius (plus grid rounding) and remain valid WGS84 points everywhere
/// outside the polar caps.
use live_match::geo::{Coordinate, FUZZ_DECIMALS, fuzz, haversine_km, redact};
use proptest::prelude::*;

/// Worst-case displacement introduced by rounding to the fuzz grid
fn rounding_error_km() -> f64 {
    let half_step_degrees = 0.5 * 10f64.powi(-FUZZ_DECIMALS);
    // Diagonal of a half-step cell at the equator
    half_step_degrees * 111.32 * std::f64::consts::SQRT_2
}

// Strategy to generate coordinates away from the poles
fn coordinate_strategy() -> impl Strategy<Value = Coordinate> {
    (-80.0f64..80.0, -180.0f64..=180.0)
        .prop_map(|(lat, lon)| Coordinate::new(lat, lon).expect("strategy stays in bounds"))
}

proptest! {
    #[test]
    fn test_fuzzed_point_within_radius(origin in coordinate_strategy(), radius in 0.0f64..5.0) {
        let fuzzed = fuzz(origin, radius).unwrap();
        let offset = haversine_km(origin, fuzzed);
        // Small slack for the flat-earth offset at high latitudes
        prop_assert!(
            offset <= radius * 1.01 + rounding_error_km(),
            "offset {} km exceeds radius {} km", offset, radius
        );
    }

    #[test]
    fn test_fuzzed_point_is_valid(origin in coordinate_strategy(), radius in 0.0f64..50.0) {
        let fuzzed = fuzz(origin, radius).unwrap();
        prop_assert!(Coordinate::new(fuzzed.latitude, fuzzed.longitude).is_ok());
    }

    #[test]
    fn test_redaction_is_city_level(origin in coordinate_strategy()) {
        let redacted = redact(origin);
        prop_assert!((redacted.latitude - origin.latitude).abs() <= 0.005 + 1e-9);
        prop_assert!((redacted.longitude - origin.longitude).abs() <= 0.005 + 1e-9);
    }

    #[test]
    fn test_negative_radius_rejected(origin in coordinate_strategy(), radius in -100.0f64..-0.001) {
        prop_assert!(fuzz(origin, radius).is_err());
    }
}

#[test]
fn test_repeated_fuzzing_differs() {
    let origin = Coordinate::new(40.0, -74.0).unwrap();
    let draws: Vec<Coordinate> = (0..20).map(|_| fuzz(origin, 0.5).unwrap()).collect();
    assert!(draws.windows(2).any(|pair| pair[0] != pair[1]));
}
