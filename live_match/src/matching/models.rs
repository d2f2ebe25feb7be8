//! Match and decline data models.

use crate::{
    profile::UserId,
    session::SessionId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Match ID type
pub type MatchId = Uuid;

/// Decline count at which a pair becomes matchable again
pub const DECLINE_WRAP_THRESHOLD: i32 = 3;

/// A proposed pairing between two live sessions
///
/// `user_a` is the side whose engine run produced the match; `user_b` is the
/// candidate it surfaced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub session_a: SessionId,
    pub user_a: UserId,
    pub session_b: SessionId,
    pub user_b: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub declined_by: Option<UserId>,
    pub declined_at: Option<DateTime<Utc>>,
    pub auto_declined: bool,
    pub accepted_by: Option<UserId>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Match {
    /// Build a fresh, undecided match
    pub fn new(
        initiator: (UserId, SessionId),
        candidate: (UserId, SessionId),
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_a: initiator.1,
            user_a: initiator.0,
            session_b: candidate.1,
            user_b: candidate.0,
            created_at: now,
            expires_at,
            declined_by: None,
            declined_at: None,
            auto_declined: false,
            accepted_by: None,
            accepted_at: None,
        }
    }

    /// Undeclined and unexpired
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.declined_by.is_none() && self.expires_at > now
    }

    /// Nobody has acted on it yet
    pub fn is_undecided(&self) -> bool {
        self.declined_by.is_none() && self.accepted_at.is_none()
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The other participant, if `user_id` takes part
    pub fn counterpart(&self, user_id: UserId) -> Option<(UserId, SessionId)> {
        if self.user_a == user_id {
            Some((self.user_b, self.session_b))
        } else if self.user_b == user_id {
            Some((self.user_a, self.session_a))
        } else {
            None
        }
    }

    pub fn participants(&self) -> [(UserId, SessionId); 2] {
        [(self.user_a, self.session_a), (self.user_b, self.session_b)]
    }
}

/// Per-(decliner, declined) decline streak
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclineRecord {
    pub decliner_id: UserId,
    pub declined_id: UserId,
    pub counter: i32,
    pub first_declined_at: DateTime<Utc>,
    pub last_session_id: SessionId,
    pub updated_at: DateTime<Utc>,
}

impl DeclineRecord {
    /// Record for a first decline between the pair
    pub fn first(
        decliner_id: UserId,
        declined_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            decliner_id,
            declined_id,
            counter: 1,
            first_declined_at: now,
            last_session_id: session_id,
            updated_at: now,
        }
    }

    /// Record after one more decline
    ///
    /// Increments until the wrap threshold; a decline at the threshold starts
    /// a fresh streak at 1.
    pub fn next(&self, session_id: SessionId, now: DateTime<Utc>) -> Self {
        let wrapped = self.counter >= DECLINE_WRAP_THRESHOLD;
        Self {
            decliner_id: self.decliner_id,
            declined_id: self.declined_id,
            counter: if wrapped { 1 } else { self.counter + 1 },
            first_declined_at: if wrapped { now } else { self.first_declined_at },
            last_session_id: session_id,
            updated_at: now,
        }
    }

    /// Whether this record keeps the pair apart
    pub fn excludes(&self) -> bool {
        self.counter < DECLINE_WRAP_THRESHOLD
    }

    /// The user on the other side of the record from `user_id`
    pub fn other(&self, user_id: UserId) -> UserId {
        if self.decliner_id == user_id {
            self.declined_id
        } else {
            self.decliner_id
        }
    }
}

/// Candidate card shown for a live match
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchProfile {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub age: Option<i32>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
}

/// Result of `GET /match/current`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CurrentMatch {
    NoSession,
    Searching,
    #[serde(rename_all = "camelCase")]
    Matched {
        match_id: MatchId,
        profile: MatchProfile,
        distance_km: f64,
        auto_decline_at: DateTime<Utc>,
        accepted: bool,
    },
}

/// Result of `GET /nearby/count`
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyCount {
    pub count: usize,
    pub max_distance_km: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_counter_wraps_after_threshold() {
        let now = Utc::now();
        let session = Uuid::new_v4();
        let mut record = DeclineRecord::first(1, 2, session, now);
        assert_eq!(record.counter, 1);
        assert!(record.excludes());

        record = record.next(session, now);
        assert_eq!(record.counter, 2);
        assert!(record.excludes());

        record = record.next(session, now);
        assert_eq!(record.counter, 3);
        assert!(!record.excludes());

        let later = now + chrono::Duration::minutes(5);
        record = record.next(session, later);
        assert_eq!(record.counter, 1);
        assert_eq!(record.first_declined_at, later);
    }

    #[test]
    fn test_counterpart() {
        let now = Utc::now();
        let (sa, sb) = (Uuid::new_v4(), Uuid::new_v4());
        let m = Match::new((1, sa), (2, sb), now, now + chrono::Duration::minutes(2));
        assert_eq!(m.counterpart(1), Some((2, sb)));
        assert_eq!(m.counterpart(2), Some((1, sa)));
        assert_eq!(m.counterpart(3), None);
        assert!(m.is_live(now));
        assert!(!m.is_live(m.expires_at));
    }

    #[test]
    fn test_current_match_serialization() {
        let json = serde_json::to_value(CurrentMatch::Searching).unwrap();
        assert_eq!(json["status"], "searching");
        let json = serde_json::to_value(CurrentMatch::NoSession).unwrap();
        assert_eq!(json["status"], "no_session");
    }
}
