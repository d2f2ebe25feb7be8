//! In-process live event bus backed by a `tokio::sync::broadcast` channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    matching::MatchId,
    profile::UserId,
    session::{EndReason, SessionId},
};

/// Something that happened in live mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    SessionStarted {
        user_id: UserId,
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    },
    SessionExtended {
        user_id: UserId,
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    },
    SessionEnded {
        user_id: UserId,
        session_id: SessionId,
        reason: EndReason,
    },
    MatchCreated {
        match_id: MatchId,
        user_a: UserId,
        user_b: UserId,
        auto_decline_at: DateTime<Utc>,
    },
    MatchDeclined {
        match_id: MatchId,
        declined_by: UserId,
        other_user: UserId,
        auto: bool,
    },
    MatchAccepted {
        match_id: MatchId,
        accepted_by: UserId,
        other_user: UserId,
    },
}

impl LiveEvent {
    /// Short name used for metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::SessionStarted { .. } => "session_started",
            LiveEvent::SessionExtended { .. } => "session_extended",
            LiveEvent::SessionEnded { .. } => "session_ended",
            LiveEvent::MatchCreated { .. } => "match_created",
            LiveEvent::MatchDeclined { .. } => "match_declined",
            LiveEvent::MatchAccepted { .. } => "match_accepted",
        }
    }

    /// Users who should see this event on their stream
    ///
    /// A silent decline is not announced to the declined side; they only
    /// observe going back to `searching`.
    pub fn recipients(&self) -> Vec<UserId> {
        match self {
            LiveEvent::SessionStarted { user_id, .. }
            | LiveEvent::SessionExtended { user_id, .. }
            | LiveEvent::SessionEnded { user_id, .. } => vec![*user_id],
            LiveEvent::MatchCreated { user_a, user_b, .. } => vec![*user_a, *user_b],
            LiveEvent::MatchDeclined { declined_by, .. } => vec![*declined_by],
            LiveEvent::MatchAccepted {
                accepted_by,
                other_user,
                ..
            } => vec![*accepted_by, *other_user],
        }
    }

    pub fn is_for(&self, user_id: UserId) -> bool {
        self.recipients().contains(&user_id)
    }
}

/// Default buffer capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus for [`LiveEvent`]s
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and slow subscribers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<LiveEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: LiveEvent) {
        log::debug!("Publishing {} event", event.kind());
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
