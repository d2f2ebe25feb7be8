//! Store error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the session, match, decline and profile stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Query did not finish in time
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// A stored row could not be decoded into a domain value
    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

impl StoreError {
    pub fn corrupt(table: &'static str, detail: impl Into<String>) -> Self {
        StoreError::Corrupt {
            table,
            detail: detail.into(),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
