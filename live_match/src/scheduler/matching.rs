//! Debounced matching-engine triggers.

use std::{sync::Arc, time::Duration};

use super::{
    fallback::LocalFallback,
    queue::TaskQueue,
    tasks::{ScheduleMode, ScheduleOutcome, Task, TaskKey},
};
use crate::{profile::UserId, session::SessionId};

/// Delays applied to each trigger source
#[derive(Debug, Clone, Copy)]
pub struct TriggerDelays {
    /// After a session starts
    pub settle: Duration,
    /// After this user declined someone
    pub decline_cooldown: Duration,
    /// After this user's match ended without them acting
    pub release: Duration,
}

/// Schedules engine runs per session
///
/// Triggers for the same session coalesce: while one run is pending, later
/// triggers are folded into it. When the queue refuses a trigger and a
/// fallback is set, the run goes to a local timer instead, so matching keeps
/// working without the queue.
#[derive(Clone)]
pub struct MatchingScheduler {
    queue: Arc<dyn TaskQueue>,
    delays: TriggerDelays,
    fallback: Option<LocalFallback>,
}

impl MatchingScheduler {
    pub fn new(queue: Arc<dyn TaskQueue>, delays: TriggerDelays) -> Self {
        Self {
            queue,
            delays,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: LocalFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn delays(&self) -> TriggerDelays {
        self.delays
    }

    /// Request an engine run for `session_id` after `delay`
    pub async fn trigger(
        &self,
        user_id: UserId,
        session_id: SessionId,
        delay: Duration,
    ) -> Option<ScheduleOutcome> {
        let task = Task::RunMatching {
            user_id,
            session_id,
        };
        let outcome = match self
            .queue
            .schedule(task.clone(), delay, ScheduleMode::KeepExisting)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                let fallback = match &self.fallback {
                    Some(fallback) => fallback.run_later(task, delay).await,
                    None => None,
                };
                match fallback {
                    Some(outcome) => {
                        log::debug!(
                            "Queue refused matching for user {user_id} ({e}), using a local timer"
                        );
                        outcome
                    }
                    None => {
                        log::warn!("Could not schedule matching for user {user_id}: {e}");
                        return None;
                    }
                }
            }
        };

        log::debug!(
            "Matching trigger for user {user_id} session {session_id} in {delay:?}: {outcome:?}"
        );
        Some(outcome)
    }

    pub async fn on_session_start(&self, user_id: UserId, session_id: SessionId) {
        self.trigger(user_id, session_id, self.delays.settle).await;
    }

    pub async fn on_decline(&self, user_id: UserId, session_id: SessionId) {
        self.trigger(user_id, session_id, self.delays.decline_cooldown)
            .await;
    }

    pub async fn on_release(&self, user_id: UserId, session_id: SessionId) {
        self.trigger(user_id, session_id, self.delays.release).await;
    }

    /// Drop any pending run for a session that ended
    pub async fn cancel(&self, session_id: SessionId) {
        let key = TaskKey::matching(session_id);
        if let Some(fallback) = &self.fallback
            && fallback.cancel(&key).await
        {
            return;
        }
        if let Err(e) = self.queue.cancel(&key).await {
            log::debug!("Could not cancel matching for session {session_id}: {e}");
        }
    }
}
