//! Profile error types.

use crate::{db::StoreError, events::CollaboratorError};
use thiserror::Error;

/// Profile and preference errors
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Collaborator (user directory, photo storage) failed
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Main platform profile missing
    #[error("User {0} not found")]
    UserNotFound(i64),

    /// Live profile missing
    #[error("Live profile not found for user {0}")]
    ProfileNotFound(i64),

    /// Live profile already created
    #[error("Live profile already exists for user {0}")]
    ProfileAlreadyExists(i64),

    /// Preferences missing
    #[error("Preferences not found for user {0}")]
    PreferencesNotFound(i64),

    /// Preferences already created
    #[error("Preferences already exist for user {0}")]
    PreferencesAlreadyExist(i64),

    /// Description too long
    #[error("Description exceeds {max} characters")]
    DescriptionTooLong { max: usize },

    /// Preference values out of range
    #[error("Invalid preferences: {0}")]
    InvalidPreferences(String),

    /// Photo rejected by validation
    #[error("Invalid photo: {0}")]
    InvalidPhoto(String),
}

impl ProfileError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ProfileError::Store(_) | ProfileError::Collaborator(_) => "INTERNAL",
            ProfileError::UserNotFound(_) => "USER_NOT_FOUND",
            ProfileError::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
            ProfileError::ProfileAlreadyExists(_) => "PROFILE_ALREADY_EXISTS",
            ProfileError::PreferencesNotFound(_) => "PREFERENCES_NOT_FOUND",
            ProfileError::PreferencesAlreadyExist(_) => "PREFERENCES_ALREADY_EXIST",
            ProfileError::DescriptionTooLong { .. } | ProfileError::InvalidPreferences(_) => {
                "VALIDATION_FAILED"
            }
            ProfileError::InvalidPhoto(_) => "INVALID_PHOTO",
        }
    }

    /// Get a client-safe error message that doesn't leak internals or user IDs
    pub fn client_message(&self) -> String {
        match self {
            ProfileError::Store(_) | ProfileError::Collaborator(_) => {
                "Internal server error".to_string()
            }
            ProfileError::UserNotFound(_) => "User not found".to_string(),
            ProfileError::ProfileNotFound(_) => "Live profile not found".to_string(),
            ProfileError::ProfileAlreadyExists(_) => "Live profile already exists".to_string(),
            ProfileError::PreferencesNotFound(_) => "Preferences not found".to_string(),
            ProfileError::PreferencesAlreadyExist(_) => "Preferences already exist".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for profile operations
pub type ProfileResult<T> = Result<T, ProfileError>;
