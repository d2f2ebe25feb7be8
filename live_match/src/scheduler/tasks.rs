//! Delayed task definitions.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use super::errors::TaskError;
use crate::{matching::MatchId, profile::UserId, session::SessionId};

/// Identity of a pending task; at most one task per key is armed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn expiry(session_id: SessionId) -> Self {
        Self(format!("expire:{session_id}"))
    }

    pub fn auto_decline(match_id: MatchId) -> Self {
        Self(format!("auto_decline:{match_id}"))
    }

    pub fn matching(session_id: SessionId) -> Self {
        Self(format!("matching:{session_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Work the live-match service runs after a delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Close a session whose time is up
    ExpireSession { session_id: SessionId },
    /// Silently decline an unanswered match
    AutoDecline { match_id: MatchId },
    /// Run the matching engine for a session
    RunMatching {
        user_id: UserId,
        session_id: SessionId,
    },
}

impl Task {
    pub fn key(&self) -> TaskKey {
        match self {
            Task::ExpireSession { session_id } => TaskKey::expiry(*session_id),
            Task::AutoDecline { match_id } => TaskKey::auto_decline(*match_id),
            Task::RunMatching { session_id, .. } => TaskKey::matching(*session_id),
        }
    }
}

/// How `schedule` treats an already-armed task with the same key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    /// Drop the armed task and arm the new one
    Replace,
    /// Keep the armed task; the new request is coalesced into it
    KeepExisting,
}

/// What `schedule` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Armed,
    Rescheduled,
    Coalesced,
}

/// Callback invoked when a task comes due
///
/// Callbacks must be idempotent: a task may run after the state it targets
/// already changed, and failed runs are retried.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task) -> Result<(), TaskError>;
}
