//! Repository traits for the live-matching tables.
//!
//! Managers only ever talk to these traits, so the Postgres store and the
//! in-memory store are interchangeable. Every method that guards an
//! invariant (one active session per user, one live match per user, atomic
//! decline counters) is a single conditional write in both implementations.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use super::errors::StoreResult;
use crate::{
    matching::{DeclineRecord, Match, MatchId},
    profile::{EphemeralProfile, Preferences, UserId},
    session::{ClosedSession, DeviceFingerprint, Session, SessionId},
};

/// Session store operations
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session unless the user already has an active one
    ///
    /// Returns `false` when another active session exists.
    async fn insert_session(&self, session: &Session) -> StoreResult<bool>;

    /// Find a session by id, active or not
    async fn find_session(&self, session_id: SessionId) -> StoreResult<Option<Session>>;

    /// Find the user's active session
    async fn find_active_session(&self, user_id: UserId) -> StoreResult<Option<Session>>;

    /// All sessions with no end time
    async fn list_active_sessions(&self) -> StoreResult<Vec<Session>>;

    /// Push the active session's expiry out by `extra`
    ///
    /// The new expiry is `max(expires_at, now) + extra`. Returns `None` when
    /// the user has no active session.
    async fn extend_session(
        &self,
        user_id: UserId,
        extra: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>>;

    /// Close an active session and cut short every live match referencing it
    ///
    /// With `expired_by` set, the session is only closed if its expiry is at
    /// or before that instant. Returns `None` when nothing was closed.
    async fn close_session(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
        expired_by: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<ClosedSession>>;

    /// Store the device fingerprint captured at session start
    async fn record_device(&self, fingerprint: &DeviceFingerprint) -> StoreResult<()>;
}

/// How a match is being declined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineKind {
    /// A participant declined; the match must still be live
    Manual,
    /// The unanswered-match timer fired; the match must be undecided
    Auto,
}

/// Match store operations
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Insert a match if neither participant has a live match and both
    /// sessions are still active
    async fn insert_match_if_free(&self, candidate: &Match, now: DateTime<Utc>)
    -> StoreResult<bool>;

    /// Find a match by id
    async fn find_match(&self, match_id: MatchId) -> StoreResult<Option<Match>>;

    /// The user's live (undeclined, unexpired) match, if any
    async fn find_live_match(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Match>>;

    /// Users currently holding a live match
    async fn users_with_live_match(&self, now: DateTime<Utc>) -> StoreResult<HashSet<UserId>>;

    /// Mark a match declined if it is still open to that kind of decline
    ///
    /// Returns the updated match, or `None` when the condition failed.
    async fn decline_match(
        &self,
        match_id: MatchId,
        declined_by: UserId,
        kind: DeclineKind,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Match>>;

    /// Mark a live match accepted; returns `None` when it is no longer live
    async fn accept_match(
        &self,
        match_id: MatchId,
        accepted_by: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Match>>;

    /// Undecided matches whose sessions are both still active
    async fn list_pending_matches(&self) -> StoreResult<Vec<Match>>;
}

/// Decline memory operations
#[async_trait]
pub trait DeclineRepository: Send + Sync {
    /// Atomically record one more decline of `declined_id` by `decliner_id`
    async fn record_decline(
        &self,
        decliner_id: UserId,
        declined_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> StoreResult<DeclineRecord>;

    /// The decline record for an ordered pair
    async fn find_decline(
        &self,
        decliner_id: UserId,
        declined_id: UserId,
    ) -> StoreResult<Option<DeclineRecord>>;

    /// Users kept apart from `user_id` by a non-wrapped record in either direction
    async fn excluded_users(&self, user_id: UserId) -> StoreResult<HashSet<UserId>>;
}

/// Ephemeral profile and preference operations
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Insert a profile; `false` if one already exists
    async fn insert_profile(&self, profile: &EphemeralProfile) -> StoreResult<bool>;

    async fn find_profile(&self, user_id: UserId) -> StoreResult<Option<EphemeralProfile>>;

    /// Overwrite description and photo; `false` if no profile exists
    async fn update_profile(&self, profile: &EphemeralProfile) -> StoreResult<bool>;

    /// Insert preferences; `false` if they already exist
    async fn insert_preferences(&self, preferences: &Preferences) -> StoreResult<bool>;

    async fn find_preferences(&self, user_id: UserId) -> StoreResult<Option<Preferences>>;

    /// Overwrite preferences; `false` if none exist
    async fn update_preferences(&self, preferences: &Preferences) -> StoreResult<bool>;
}

/// Everything the live-matching services need from storage
#[async_trait]
pub trait LiveStore:
    SessionRepository + MatchRepository + DeclineRepository + ProfileRepository
{
    /// Cheap reachability check
    async fn health_check(&self) -> StoreResult<()>;
}
