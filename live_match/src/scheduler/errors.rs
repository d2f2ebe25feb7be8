//! Scheduler error types.

use thiserror::Error;

/// Errors from the delayed-task facility itself
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// No delayed-task facility is running
    #[error("Task queue unavailable: {0}")]
    Unavailable(String),

    /// The queue actor stopped before answering
    #[error("Task queue closed")]
    Closed,
}

/// Result type for scheduling calls
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors returned by task callbacks
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Worth retrying (store or collaborator hiccup)
    #[error("Transient task failure: {0}")]
    Transient(String),

    /// Retrying cannot help
    #[error("Permanent task failure: {0}")]
    Permanent(String),
}

impl TaskError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TaskError::Transient(_))
    }
}
