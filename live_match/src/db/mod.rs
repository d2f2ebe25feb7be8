//! Storage layer: PostgreSQL pool, schema, and the live-matching repositories.
//!
//! [`PgStore`] is the production store; [`MemoryStore`] implements the same
//! traits in process memory for tests and `--in-memory` runs.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod config;
pub mod errors;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod schema;
pub mod timeouts;

pub use config::DatabaseConfig;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repository::{
    DeclineKind, DeclineRepository, LiveStore, MatchRepository, ProfileRepository,
    SessionRepository,
};

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// # Arguments
    ///
    /// * `config` - Database configuration
    ///
    /// # Returns
    ///
    /// * `Result<Database, sqlx::Error>` - Database instance or error
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use live_match::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), live_match::db::StoreError> {
    ///     let db = Database::new(&DatabaseConfig::development()).await?;
    ///     db.ensure_schema().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the live-matching tables and indexes if they are missing
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        timeouts::with_timeout(
            timeouts::SCHEMA_TIMEOUT,
            sqlx::raw_sql(schema::SCHEMA).execute(&self.pool),
        )
        .await?;
        log::info!("Live-match schema ready");
        Ok(())
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL (set DATABASE_URL)"]
    async fn test_database_connection_and_schema() {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://postgres@localhost/live_match_test".to_string());
        let config = DatabaseConfig::development().with_url(database_url);

        let db = Database::new(&config)
            .await
            .expect("Failed to connect to database");
        db.health_check().await.expect("Health check failed");
        db.ensure_schema().await.expect("Schema setup failed");
        // Applying twice is a no-op
        db.ensure_schema().await.expect("Schema setup not idempotent");
        db.close().await;
    }
}
