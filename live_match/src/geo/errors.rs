//! Geometry error types.

use thiserror::Error;

/// Geometry errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoError {
    /// Latitude or longitude outside WGS84 bounds (or not finite)
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// Fuzz radius negative or not finite
    #[error("Invalid radius: {0} km")]
    InvalidRadius(f64),
}

impl GeoError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            GeoError::InvalidCoordinate { .. } => "INVALID_COORDINATE",
            GeoError::InvalidRadius(_) => "INVALID_RADIUS",
        }
    }

    /// Client-safe message. Never echoes the submitted coordinate back.
    pub fn client_message(&self) -> String {
        match self {
            GeoError::InvalidCoordinate { .. } => {
                "Latitude must be within [-90, 90] and longitude within [-180, 180]".to_string()
            }
            GeoError::InvalidRadius(_) => "Radius must be a non-negative number".to_string(),
        }
    }
}

/// Result type for geometry operations
pub type GeoResult<T> = Result<T, GeoError>;
