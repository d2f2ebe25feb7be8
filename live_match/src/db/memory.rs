//! In-memory store for tests and local development.
//!
//! All tables live behind one async mutex, so every trait method is a single
//! critical section and the conditional writes are linearizable exactly like
//! their Postgres counterparts.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use super::{
    errors::StoreResult,
    repository::{
        DeclineKind, DeclineRepository, LiveStore, MatchRepository, ProfileRepository,
        SessionRepository,
    },
};
use crate::{
    matching::{DeclineRecord, Match, MatchId},
    profile::{EphemeralProfile, Preferences, UserId},
    session::{ClosedSession, DeviceFingerprint, Session, SessionId},
};

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<SessionId, Session>,
    active_by_user: HashMap<UserId, SessionId>,
    matches: HashMap<MatchId, Match>,
    declines: HashMap<(UserId, UserId), DeclineRecord>,
    profiles: HashMap<UserId, EphemeralProfile>,
    preferences: HashMap<UserId, Preferences>,
    devices: HashMap<SessionId, DeviceFingerprint>,
}

impl MemoryState {
    fn has_live_match(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        self.matches
            .values()
            .any(|m| m.involves(user_id) && m.is_live(now))
    }

    fn session_active(&self, session_id: SessionId) -> bool {
        self.sessions
            .get(&session_id)
            .is_some_and(Session::is_active)
    }
}

/// `LiveStore` backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of device fingerprints recorded
    pub async fn device_count(&self) -> usize {
        self.state.lock().await.devices.len()
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn insert_session(&self, session: &Session) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.active_by_user.contains_key(&session.user_id) {
            return Ok(false);
        }
        state.active_by_user.insert(session.user_id, session.id);
        state.sessions.insert(session.id, session.clone());
        Ok(true)
    }

    async fn find_session(&self, session_id: SessionId) -> StoreResult<Option<Session>> {
        Ok(self.state.lock().await.sessions.get(&session_id).cloned())
    }

    async fn find_active_session(&self, user_id: UserId) -> StoreResult<Option<Session>> {
        let state = self.state.lock().await;
        Ok(state
            .active_by_user
            .get(&user_id)
            .and_then(|id| state.sessions.get(id))
            .cloned())
    }

    async fn list_active_sessions(&self) -> StoreResult<Vec<Session>> {
        let state = self.state.lock().await;
        Ok(state
            .active_by_user
            .values()
            .filter_map(|id| state.sessions.get(id))
            .cloned()
            .collect())
    }

    async fn extend_session(
        &self,
        user_id: UserId,
        extra: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let mut state = self.state.lock().await;
        let Some(session_id) = state.active_by_user.get(&user_id).copied() else {
            return Ok(None);
        };
        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        session.expires_at = session.expires_at.max(now) + extra;
        Ok(Some(session.clone()))
    }

    async fn close_session(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
        expired_by: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<ClosedSession>> {
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        if !session.is_active() {
            return Ok(None);
        }
        if expired_by.is_some_and(|deadline| session.expires_at > deadline) {
            return Ok(None);
        }

        session.ended_at = Some(now);
        let closed = session.clone();
        state.active_by_user.remove(&closed.user_id);

        let mut invalidated_matches = Vec::new();
        for m in state.matches.values_mut() {
            if (m.session_a == session_id || m.session_b == session_id) && m.is_live(now) {
                m.expires_at = now;
                invalidated_matches.push(m.clone());
            }
        }

        Ok(Some(ClosedSession {
            session: closed,
            invalidated_matches,
        }))
    }

    async fn record_device(&self, fingerprint: &DeviceFingerprint) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .devices
            .entry(fingerprint.session_id)
            .or_insert_with(|| fingerprint.clone());
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for MemoryStore {
    async fn insert_match_if_free(
        &self,
        candidate: &Match,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.has_live_match(candidate.user_a, now)
            || state.has_live_match(candidate.user_b, now)
            || !state.session_active(candidate.session_a)
            || !state.session_active(candidate.session_b)
        {
            return Ok(false);
        }
        state.matches.insert(candidate.id, candidate.clone());
        Ok(true)
    }

    async fn find_match(&self, match_id: MatchId) -> StoreResult<Option<Match>> {
        Ok(self.state.lock().await.matches.get(&match_id).cloned())
    }

    async fn find_live_match(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Match>> {
        Ok(self
            .state
            .lock()
            .await
            .matches
            .values()
            .find(|m| m.involves(user_id) && m.is_live(now))
            .cloned())
    }

    async fn users_with_live_match(&self, now: DateTime<Utc>) -> StoreResult<HashSet<UserId>> {
        Ok(self
            .state
            .lock()
            .await
            .matches
            .values()
            .filter(|m| m.is_live(now))
            .flat_map(|m| [m.user_a, m.user_b])
            .collect())
    }

    async fn decline_match(
        &self,
        match_id: MatchId,
        declined_by: UserId,
        kind: DeclineKind,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Match>> {
        let mut state = self.state.lock().await;
        let Some(m) = state.matches.get_mut(&match_id) else {
            return Ok(None);
        };
        let open = match kind {
            DeclineKind::Manual => m.is_live(now),
            DeclineKind::Auto => m.is_undecided(),
        };
        if !open {
            return Ok(None);
        }

        m.declined_by = Some(declined_by);
        m.declined_at = Some(now);
        m.auto_declined = kind == DeclineKind::Auto;
        Ok(Some(m.clone()))
    }

    async fn accept_match(
        &self,
        match_id: MatchId,
        accepted_by: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Match>> {
        let mut state = self.state.lock().await;
        let Some(m) = state.matches.get_mut(&match_id) else {
            return Ok(None);
        };
        if !m.is_live(now) {
            return Ok(None);
        }
        if m.accepted_at.is_none() {
            m.accepted_by = Some(accepted_by);
            m.accepted_at = Some(now);
        }
        Ok(Some(m.clone()))
    }

    async fn list_pending_matches(&self) -> StoreResult<Vec<Match>> {
        let state = self.state.lock().await;
        Ok(state
            .matches
            .values()
            .filter(|m| {
                m.is_undecided()
                    && state.session_active(m.session_a)
                    && state.session_active(m.session_b)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DeclineRepository for MemoryStore {
    async fn record_decline(
        &self,
        decliner_id: UserId,
        declined_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> StoreResult<DeclineRecord> {
        let mut state = self.state.lock().await;
        let record = match state.declines.get(&(decliner_id, declined_id)) {
            Some(existing) => existing.next(session_id, now),
            None => DeclineRecord::first(decliner_id, declined_id, session_id, now),
        };
        state
            .declines
            .insert((decliner_id, declined_id), record.clone());
        Ok(record)
    }

    async fn find_decline(
        &self,
        decliner_id: UserId,
        declined_id: UserId,
    ) -> StoreResult<Option<DeclineRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .declines
            .get(&(decliner_id, declined_id))
            .cloned())
    }

    async fn excluded_users(&self, user_id: UserId) -> StoreResult<HashSet<UserId>> {
        Ok(self
            .state
            .lock()
            .await
            .declines
            .values()
            .filter(|r| (r.decliner_id == user_id || r.declined_id == user_id) && r.excludes())
            .map(|r| r.other(user_id))
            .collect())
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn insert_profile(&self, profile: &EphemeralProfile) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.profiles.contains_key(&profile.user_id) {
            return Ok(false);
        }
        state.profiles.insert(profile.user_id, profile.clone());
        Ok(true)
    }

    async fn find_profile(&self, user_id: UserId) -> StoreResult<Option<EphemeralProfile>> {
        Ok(self.state.lock().await.profiles.get(&user_id).cloned())
    }

    async fn update_profile(&self, profile: &EphemeralProfile) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.profiles.get_mut(&profile.user_id) {
            Some(existing) => {
                existing.description = profile.description.clone();
                existing.photo_key = profile.photo_key.clone();
                existing.updated_at = profile.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_preferences(&self, preferences: &Preferences) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.preferences.contains_key(&preferences.user_id) {
            return Ok(false);
        }
        state
            .preferences
            .insert(preferences.user_id, preferences.clone());
        Ok(true)
    }

    async fn find_preferences(&self, user_id: UserId) -> StoreResult<Option<Preferences>> {
        Ok(self.state.lock().await.preferences.get(&user_id).cloned())
    }

    async fn update_preferences(&self, preferences: &Preferences) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.preferences.get_mut(&preferences.user_id) {
            Some(existing) => {
                *existing = preferences.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl LiveStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use uuid::Uuid;

    fn session(user_id: UserId, now: DateTime<Utc>, minutes: i64) -> Session {
        let location = Coordinate::new(40.0, -74.0).unwrap();
        Session {
            id: Uuid::new_v4(),
            user_id,
            started_at: now,
            expires_at: now + Duration::minutes(minutes),
            ended_at: None,
            true_location: location,
            fuzzed_location: location,
        }
    }

    #[tokio::test]
    async fn test_one_active_session_per_user() {
        let store = MemoryStore::new();
        let now = Utc::now();
        assert!(store.insert_session(&session(1, now, 30)).await.unwrap());
        assert!(!store.insert_session(&session(1, now, 30)).await.unwrap());
        assert!(store.insert_session(&session(2, now, 30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_close_session_is_idempotent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let s = session(1, now, 30);
        store.insert_session(&s).await.unwrap();

        assert!(store.close_session(s.id, now, None).await.unwrap().is_some());
        assert!(store.close_session(s.id, now, None).await.unwrap().is_none());
        assert!(store.find_active_session(1).await.unwrap().is_none());

        // A new session can start after the old one closed
        assert!(store.insert_session(&session(1, now, 30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_close_respects_expiry_condition() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let s = session(1, now, 30);
        store.insert_session(&s).await.unwrap();

        let closed = store.close_session(s.id, now, Some(now)).await.unwrap();
        assert!(closed.is_none(), "session not yet expired must stay open");
    }

    #[tokio::test]
    async fn test_close_invalidates_live_matches() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (a, b) = (session(1, now, 30), session(2, now, 30));
        store.insert_session(&a).await.unwrap();
        store.insert_session(&b).await.unwrap();

        let m = Match::new((1, a.id), (2, b.id), now, now + Duration::minutes(2));
        assert!(store.insert_match_if_free(&m, now).await.unwrap());

        let closed = store.close_session(a.id, now, None).await.unwrap().unwrap();
        assert_eq!(closed.invalidated_matches.len(), 1);
        assert!(store.find_live_match(2, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_insert_guards_double_matching() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (a, b, c) = (session(1, now, 30), session(2, now, 30), session(3, now, 30));
        for s in [&a, &b, &c] {
            store.insert_session(s).await.unwrap();
        }
        let expires = now + Duration::minutes(2);

        assert!(store
            .insert_match_if_free(&Match::new((1, a.id), (2, b.id), now, expires), now)
            .await
            .unwrap());
        assert!(!store
            .insert_match_if_free(&Match::new((3, c.id), (2, b.id), now, expires), now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_auto_decline_skips_accepted_match() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (a, b) = (session(1, now, 30), session(2, now, 30));
        store.insert_session(&a).await.unwrap();
        store.insert_session(&b).await.unwrap();
        let m = Match::new((1, a.id), (2, b.id), now, now + Duration::minutes(2));
        store.insert_match_if_free(&m, now).await.unwrap();

        store.accept_match(m.id, 2, now).await.unwrap().unwrap();
        let auto = store
            .decline_match(m.id, 2, DeclineKind::Auto, m.expires_at)
            .await
            .unwrap();
        assert!(auto.is_none());
    }

    #[tokio::test]
    async fn test_excluded_users_both_directions() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sid = Uuid::new_v4();
        store.record_decline(1, 2, sid, now).await.unwrap();
        store.record_decline(3, 1, sid, now).await.unwrap();

        let excluded = store.excluded_users(1).await.unwrap();
        assert!(excluded.contains(&2));
        assert!(excluded.contains(&3));
        assert_eq!(excluded.len(), 2);
    }
}
