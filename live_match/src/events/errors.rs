//! Collaborator error types.

use thiserror::Error;

/// Failures reported by external collaborators (user directory, photo
/// storage, push delivery)
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The collaborator could not be reached
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The collaborator returned something we cannot use
    #[error("Invalid data from {service}: {reason}")]
    InvalidData {
        service: &'static str,
        reason: String,
    },
}

/// Result type for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
