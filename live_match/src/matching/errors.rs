//! Matching error types.

use crate::{db::StoreError, profile::ProfileError};
use thiserror::Error;

/// Matching, decline and nearby-count errors
#[derive(Debug, Error)]
pub enum MatchError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Profile lookup failed
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Caller has no open session
    #[error("No active live session")]
    NoActiveSession,

    /// Match unknown, not the caller's, or no longer open
    #[error("Match not found")]
    MatchNotFound,
}

impl MatchError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::Store(_) => "INTERNAL",
            MatchError::Profile(e) => e.code(),
            MatchError::NoActiveSession => "NO_ACTIVE_SESSION",
            MatchError::MatchNotFound => "MATCH_NOT_FOUND",
        }
    }

    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            MatchError::Store(_) => "Internal server error".to_string(),
            MatchError::Profile(e) => e.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for matching operations
pub type MatchResult<T> = Result<T, MatchError>;
