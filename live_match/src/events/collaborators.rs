//! Contracts for the services live mode consumes but does not own.
//!
//! The main profile lives in the platform's `users` table, photos in an
//! object store, and push delivery in a notification service. Each is reached
//! through a narrow trait so managers can be wired against real backends or
//! the in-process stand-ins below.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::errors::{CollaboratorError, CollaboratorResult};
use crate::{
    matching::MatchId,
    profile::{UserId, UserSummary},
};

/// Read access to the main platform profile
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> CollaboratorResult<Option<UserSummary>>;
}

/// Object storage for live-profile photos
#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Store validated photo bytes and return the object key
    async fn store(
        &self,
        user_id: UserId,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> CollaboratorResult<String>;

    /// Short-lived URL for an object key
    async fn url_for(&self, key: &str) -> CollaboratorResult<String>;
}

/// A push notification payload
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub match_id: Option<MatchId>,
}

impl Notification {
    pub fn match_found(match_id: MatchId) -> Self {
        Self {
            title: "It's a live match".to_string(),
            body: "Someone nearby is available right now.".to_string(),
            match_id: Some(match_id),
        }
    }
}

/// Push delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, notification: &Notification)
    -> CollaboratorResult<()>;
}

/// `UserDirectory` over the platform `users` table
pub struct PgUserDirectory {
    pool: Arc<PgPool>,
}

impl PgUserDirectory {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, user_id: UserId) -> CollaboratorResult<Option<UserSummary>> {
        let row = sqlx::query(
            "SELECT id, display_name, birthdate, gender, orientation FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let invalid = |reason: String| CollaboratorError::InvalidData {
            service: "user directory",
            reason,
        };
        let birthdate: NaiveDate = row.get("birthdate");
        let age = Utc::now()
            .date_naive()
            .years_since(birthdate)
            .ok_or_else(|| invalid(format!("birthdate in the future for user {user_id}")))?;

        Ok(Some(UserSummary {
            user_id: row.get("id"),
            display_name: row.get("display_name"),
            age: i32::try_from(age).map_err(|e| invalid(e.to_string()))?,
            gender: row.get::<String, _>("gender").parse().map_err(invalid)?,
            orientation: row
                .get::<Option<String>, _>("orientation")
                .map(|o| o.parse())
                .transpose()
                .map_err(invalid)?,
        }))
    }
}

/// `UserDirectory` held in memory
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, UserSummary>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserSummary) {
        self.users.write().await.insert(user.user_id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, user_id: UserId) -> CollaboratorResult<Option<UserSummary>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }
}

/// `PhotoStorage` held in memory
#[derive(Default)]
pub struct InMemoryPhotoStorage {
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl InMemoryPhotoStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored content type and bytes for a key
    pub async fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.read().await.get(key).cloned()
    }
}

#[async_trait]
impl PhotoStorage for InMemoryPhotoStorage {
    async fn store(
        &self,
        user_id: UserId,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> CollaboratorResult<String> {
        let key = format!("{user_id}/{}", Uuid::new_v4());
        self.objects
            .write()
            .await
            .insert(key.clone(), (content_type.to_string(), bytes));
        Ok(key)
    }

    async fn url_for(&self, key: &str) -> CollaboratorResult<String> {
        if !self.objects.read().await.contains_key(key) {
            return Err(CollaboratorError::InvalidData {
                service: "photo storage",
                reason: format!("unknown key {key}"),
            });
        }
        Ok(format!("memory://photos/{key}"))
    }
}

/// `Notifier` that only writes a log line
///
/// Stands in for push delivery when no push service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        user_id: UserId,
        notification: &Notification,
    ) -> CollaboratorResult<()> {
        log::info!(
            "Push to user {}: {} (match {:?})",
            user_id,
            notification.title,
            notification.match_id
        );
        Ok(())
    }
}
