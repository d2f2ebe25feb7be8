//! Unanswered-match timers.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{
    delay_until,
    queue::TaskQueue,
    tasks::{ScheduleMode, Task, TaskKey},
};
use crate::matching::MatchId;

/// Arms and cancels the silent decline of an unanswered match
#[derive(Clone)]
pub struct AutoDeclineScheduler {
    queue: Arc<dyn TaskQueue>,
}

impl AutoDeclineScheduler {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Arm the auto-decline for `match_id` at `at`
    pub async fn arm(&self, match_id: MatchId, at: DateTime<Utc>) -> bool {
        match self
            .queue
            .schedule(
                Task::AutoDecline { match_id },
                delay_until(at),
                ScheduleMode::Replace,
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Could not arm auto-decline for match {match_id}: {e}");
                false
            }
        }
    }

    pub async fn cancel(&self, match_id: MatchId) {
        if let Err(e) = self.queue.cancel(&TaskKey::auto_decline(match_id)).await {
            log::warn!("Could not cancel auto-decline for match {match_id}: {e}");
        }
    }
}
