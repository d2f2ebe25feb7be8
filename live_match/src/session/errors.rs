//! Session error types.

use crate::{db::StoreError, geo::GeoError};
use thiserror::Error;

/// Session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Coordinate rejected
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// No live profile yet
    #[error("A live profile is required before starting a session")]
    ProfileRequired,

    /// User already has an open session
    #[error("A live session is already active")]
    SessionAlreadyActive,

    /// User has no open session
    #[error("No active live session")]
    NoActiveSession,

    /// Requested duration outside the allowed window
    #[error("Duration must be between {min} and {max} minutes")]
    InvalidDuration { min: i64, max: i64 },

    /// Requested extension outside the allowed window
    #[error("Extension must be between 1 and {max} minutes")]
    InvalidExtension { max: i64 },
}

impl SessionError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Store(_) => "INTERNAL",
            SessionError::Geo(e) => e.code(),
            SessionError::ProfileRequired => "PROFILE_REQUIRED",
            SessionError::SessionAlreadyActive => "SESSION_ALREADY_ACTIVE",
            SessionError::NoActiveSession => "NO_ACTIVE_SESSION",
            SessionError::InvalidDuration { .. } => "INVALID_DURATION",
            SessionError::InvalidExtension { .. } => "INVALID_EXTENSION",
        }
    }

    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Store(_) => "Internal server error".to_string(),
            SessionError::Geo(e) => e.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
