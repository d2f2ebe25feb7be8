//! Decline memory: per-pair decline streaks with a wrap rule.
//!
//! The first decline of B by A stores counter 1; each further decline
//! increments it until the wrap threshold, and a decline at the threshold
//! starts a new streak at 1. A record keeps the pair apart (in both
//! directions) only while its counter is below the threshold.

use chrono::Utc;
use std::sync::Arc;

use super::{
    errors::MatchResult,
    models::DeclineRecord,
};
use crate::{db::LiveStore, profile::UserId, session::SessionId};

/// Decline memory
#[derive(Clone)]
pub struct DeclineMemory {
    store: Arc<dyn LiveStore>,
}

impl DeclineMemory {
    pub fn new(store: Arc<dyn LiveStore>) -> Self {
        Self { store }
    }

    /// Atomically record a decline
    ///
    /// # Arguments
    ///
    /// * `decliner` - User who declined
    /// * `declined` - User who was declined
    /// * `session_id` - Decliner's session at the time
    ///
    /// # Returns
    ///
    /// * `MatchResult<DeclineRecord>` - Record after the upsert
    pub async fn record_decline(
        &self,
        decliner: UserId,
        declined: UserId,
        session_id: SessionId,
    ) -> MatchResult<DeclineRecord> {
        let record = self
            .store
            .record_decline(decliner, declined, session_id, Utc::now())
            .await?;
        log::info!(
            "User {} declined user {} (streak {})",
            decliner,
            declined,
            record.counter
        );
        Ok(record)
    }

    pub async fn find(
        &self,
        decliner: UserId,
        declined: UserId,
    ) -> MatchResult<Option<DeclineRecord>> {
        Ok(self.store.find_decline(decliner, declined).await?)
    }

    /// Whether a decline in either direction keeps `a` and `b` apart
    pub async fn is_excluded(&self, a: UserId, b: UserId) -> MatchResult<bool> {
        Ok(self.store.excluded_users(a).await?.contains(&b))
    }
}
