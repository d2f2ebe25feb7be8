//! Query timeout helpers.
//!
//! Every `PgStore` round-trip goes through one of these wrappers so that a
//! stuck connection surfaces as `StoreError::Timeout` instead of hanging a
//! request handler or a timer callback.

use super::errors::{StoreError, StoreResult};
use std::{future::Future, time::Duration};
use tokio::time::timeout;

/// Default timeout for single queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for multi-statement transactions (10 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for schema setup at start-up (30 seconds)
pub const SCHEMA_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a store operation with a deadline
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Async operation to execute
///
/// # Returns
///
/// * `StoreResult<T>` - Result or `StoreError::Timeout`
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<StoreError>,
{
    match timeout(duration, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(StoreError::Timeout(duration)),
    }
}

/// Run a single query with the default timeout
pub async fn with_query_timeout<F, T, E>(future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<StoreError>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}

/// Run a transaction body with the transaction timeout
pub async fn with_transaction_timeout<F, T, E>(future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<StoreError>,
{
    with_timeout(DEFAULT_TRANSACTION_TIMEOUT, future).await
}
