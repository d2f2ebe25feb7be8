//! Session expiry timers.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{
    delay_until,
    queue::TaskQueue,
    tasks::{ScheduleMode, Task, TaskKey},
};
use crate::session::SessionId;

/// Arms, re-arms and disarms the task that ends a session
///
/// Failures are logged and swallowed; the store stays authoritative and a
/// missed expiry is picked up by start-up recovery.
#[derive(Clone)]
pub struct ExpiryScheduler {
    queue: Arc<dyn TaskQueue>,
}

impl ExpiryScheduler {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Arm the expiry task, replacing any armed one for the session
    ///
    /// # Returns
    ///
    /// * `bool` - Whether the queue accepted the task
    pub async fn arm(&self, session_id: SessionId, expires_at: DateTime<Utc>) -> bool {
        let task = Task::ExpireSession { session_id };
        match self
            .queue
            .schedule(task, delay_until(expires_at), ScheduleMode::Replace)
            .await
        {
            Ok(outcome) => {
                log::debug!("Expiry for session {session_id} at {expires_at}: {outcome:?}");
                true
            }
            Err(e) => {
                log::warn!("Could not arm expiry for session {session_id}: {e}");
                false
            }
        }
    }

    /// Disarm the expiry task
    pub async fn disarm(&self, session_id: SessionId) {
        if let Err(e) = self.queue.cancel(&TaskKey::expiry(session_id)).await {
            log::warn!("Could not disarm expiry for session {session_id}: {e}");
        }
    }
}
