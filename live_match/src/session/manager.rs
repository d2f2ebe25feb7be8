//! Session lifecycle: start, extend, end and expire.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    errors::{SessionError, SessionResult},
    models::{
        ClosedSession, DeviceFingerprint, EndReason, Session, SessionId, SessionStatus,
        StartSessionRequest,
    },
};
use crate::{
    config::LiveMatchConfig,
    db::LiveStore,
    events::{EventBus, LiveEvent},
    geo::{self, Coordinate},
    profile::UserId,
    scheduler::{AutoDeclineScheduler, ExpiryScheduler, MatchingScheduler},
};

/// Slack allowed between a timer firing and the stored expiry
const EXPIRY_GRACE_SECS: i64 = 1;

/// Session manager
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn LiveStore>,
    expiry: ExpiryScheduler,
    auto_decline: AutoDeclineScheduler,
    matching: MatchingScheduler,
    events: Arc<EventBus>,
    config: Arc<LiveMatchConfig>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        store: Arc<dyn LiveStore>,
        expiry: ExpiryScheduler,
        auto_decline: AutoDeclineScheduler,
        matching: MatchingScheduler,
        events: Arc<EventBus>,
        config: Arc<LiveMatchConfig>,
    ) -> Self {
        Self {
            store,
            expiry,
            auto_decline,
            matching,
            events,
            config,
        }
    }

    /// Start a live session
    ///
    /// The coordinate is fuzzed before anything else sees it. Timers are
    /// armed after the insert; a scheduling failure is logged and the
    /// session stands.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Caller
    /// * `request` - Duration in minutes, true coordinate, optional device
    ///
    /// # Returns
    ///
    /// * `SessionResult<Session>` - The new session
    ///
    /// # Errors
    ///
    /// * `SessionError::InvalidDuration` - Duration outside the allowed window
    /// * `SessionError::Geo` - Coordinate outside WGS84 bounds
    /// * `SessionError::ProfileRequired` - No live profile
    /// * `SessionError::SessionAlreadyActive` - Another session is open
    pub async fn start(
        &self,
        user_id: UserId,
        request: &StartSessionRequest,
    ) -> SessionResult<Session> {
        let (min, max) = (
            self.config.min_session_minutes,
            self.config.max_session_minutes,
        );
        if !(min..=max).contains(&request.duration) {
            return Err(SessionError::InvalidDuration { min, max });
        }
        let true_location = Coordinate::new(request.latitude, request.longitude)?;

        if self.store.find_profile(user_id).await?.is_none() {
            return Err(SessionError::ProfileRequired);
        }

        let fuzzed_location = geo::fuzz(true_location, self.config.fuzz_radius_km)?;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            started_at: now,
            expires_at: now + Duration::minutes(request.duration),
            ended_at: None,
            true_location,
            fuzzed_location,
        };

        if !self.store.insert_session(&session).await? {
            return Err(SessionError::SessionAlreadyActive);
        }

        if let Some(device) = &request.device {
            let fingerprint = DeviceFingerprint {
                user_id,
                session_id: session.id,
                device_id: device.device_id.clone(),
                device_model: device.device_model.clone(),
                platform: device.platform.clone(),
                created_at: now,
            };
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = store.record_device(&fingerprint).await {
                    log::warn!(
                        "Device fingerprint for session {} not stored: {}",
                        fingerprint.session_id,
                        e
                    );
                }
            });
        }

        self.expiry.arm(session.id, session.expires_at).await;
        self.matching.on_session_start(user_id, session.id).await;

        log::info!(
            "User {} started session {} near {} for {} min",
            user_id,
            session.id,
            true_location.redacted(),
            request.duration
        );
        self.events.publish(LiveEvent::SessionStarted {
            user_id,
            session_id: session.id,
            expires_at: session.expires_at,
        });

        Ok(session)
    }

    /// End the caller's session
    ///
    /// # Errors
    ///
    /// * `SessionError::NoActiveSession` - Nothing to end
    pub async fn end(&self, user_id: UserId) -> SessionResult<Session> {
        let session = self
            .store
            .find_active_session(user_id)
            .await?
            .ok_or(SessionError::NoActiveSession)?;

        let closed = self
            .store
            .close_session(session.id, Utc::now(), None)
            .await?
            .ok_or(SessionError::NoActiveSession)?;

        Ok(self.after_close(closed, EndReason::Manual).await)
    }

    /// Extend the caller's session by `additional_minutes`
    ///
    /// The expiry timer is replaced, not stacked.
    ///
    /// # Errors
    ///
    /// * `SessionError::InvalidExtension` - Minutes outside 1..=max
    /// * `SessionError::NoActiveSession` - Nothing to extend
    pub async fn extend(&self, user_id: UserId, additional_minutes: i64) -> SessionResult<Session> {
        let max = self.config.max_extend_minutes;
        if !(1..=max).contains(&additional_minutes) {
            return Err(SessionError::InvalidExtension { max });
        }

        let session = self
            .store
            .extend_session(user_id, Duration::minutes(additional_minutes), Utc::now())
            .await?
            .ok_or(SessionError::NoActiveSession)?;

        self.expiry.arm(session.id, session.expires_at).await;

        log::info!(
            "User {} extended session {} by {} min",
            user_id,
            session.id,
            additional_minutes
        );
        self.events.publish(LiveEvent::SessionExtended {
            user_id,
            session_id: session.id,
            expires_at: session.expires_at,
        });

        Ok(session)
    }

    /// Active flag and remaining seconds for the caller
    pub async fn status(&self, user_id: UserId) -> SessionResult<SessionStatus> {
        let status = match self.store.find_active_session(user_id).await? {
            Some(session) => SessionStatus {
                active: true,
                session_id: Some(session.id),
                expires_at: Some(session.expires_at),
                remaining_seconds: session.remaining_seconds(Utc::now()),
            },
            None => SessionStatus::inactive(),
        };
        Ok(status)
    }

    /// The caller's active session, if any
    pub async fn active_session(&self, user_id: UserId) -> SessionResult<Option<Session>> {
        Ok(self.store.find_active_session(user_id).await?)
    }

    /// Expiry timer callback
    ///
    /// A no-op when the session is already closed. If the stored expiry
    /// moved into the future (an extend raced the timer) the timer is
    /// re-armed instead.
    ///
    /// # Returns
    ///
    /// * `SessionResult<Option<Session>>` - The closed session, if this call closed it
    pub async fn expire(&self, session_id: SessionId) -> SessionResult<Option<Session>> {
        let Some(session) = self.store.find_session(session_id).await? else {
            log::debug!("Expiry for unknown session {session_id} ignored");
            return Ok(None);
        };
        if !session.is_active() {
            log::debug!("Session {session_id} already closed");
            return Ok(None);
        }

        let now = Utc::now();
        let deadline = now + Duration::seconds(EXPIRY_GRACE_SECS);
        if session.expires_at > deadline {
            log::info!(
                "Session {} expiry moved to {}, re-arming",
                session_id,
                session.expires_at
            );
            self.expiry.arm(session_id, session.expires_at).await;
            return Ok(None);
        }

        match self
            .store
            .close_session(session_id, now, Some(deadline))
            .await?
        {
            Some(closed) => Ok(Some(self.after_close(closed, EndReason::Expired).await)),
            None => Ok(None),
        }
    }

    /// Re-arm timers for sessions found open at start-up
    ///
    /// Sessions already past their expiry are closed on the spot. A session
    /// that fails to close is logged and skipped; the rest still recover.
    pub async fn recover(&self) -> SessionResult<usize> {
        let now = Utc::now();
        let sessions = self.store.list_active_sessions().await?;
        let count = sessions.len();

        for session in sessions {
            if session.expires_at <= now {
                if let Err(e) = self.expire(session.id).await {
                    log::error!("Failed to close expired session {}: {}", session.id, e);
                }
            } else {
                self.expiry.arm(session.id, session.expires_at).await;
                self.matching.on_session_start(session.user_id, session.id).await;
            }
        }

        Ok(count)
    }

    /// Disarm the closed session's timers and put its partners back in the pool
    async fn after_close(&self, closed: ClosedSession, reason: EndReason) -> Session {
        let ClosedSession {
            session,
            invalidated_matches,
        } = closed;

        self.expiry.disarm(session.id).await;
        self.matching.cancel(session.id).await;

        for m in &invalidated_matches {
            self.auto_decline.cancel(m.id).await;
            if let Some((partner, partner_session)) = m.counterpart(session.user_id) {
                self.matching.on_release(partner, partner_session).await;
            }
        }

        log::info!(
            "Session {} of user {} ended ({}), {} match(es) invalidated",
            session.id,
            session.user_id,
            reason,
            invalidated_matches.len()
        );
        self.events.publish(LiveEvent::SessionEnded {
            user_id: session.user_id,
            session_id: session.id,
            reason,
        });

        session
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{
            DeclineKind, DeclineRepository, MatchRepository, MemoryStore, ProfileRepository,
            SessionRepository, StoreError, StoreResult,
        },
        matching::{DeclineRecord, Match, MatchId},
        profile::{EphemeralProfile, Preferences},
        scheduler::{NoopTaskQueue, TaskQueue},
    };
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashSet;

    /// Memory store whose `close_session` times out for one session
    struct StuckSessionStore {
        inner: MemoryStore,
        stuck: SessionId,
    }

    #[async_trait]
    impl SessionRepository for StuckSessionStore {
        async fn insert_session(&self, session: &Session) -> StoreResult<bool> {
            self.inner.insert_session(session).await
        }

        async fn find_session(&self, session_id: SessionId) -> StoreResult<Option<Session>> {
            self.inner.find_session(session_id).await
        }

        async fn find_active_session(&self, user_id: UserId) -> StoreResult<Option<Session>> {
            self.inner.find_active_session(user_id).await
        }

        /// The stuck session always comes first
        async fn list_active_sessions(&self) -> StoreResult<Vec<Session>> {
            let mut sessions = self.inner.list_active_sessions().await?;
            sessions.sort_by_key(|s| s.id != self.stuck);
            Ok(sessions)
        }

        async fn extend_session(
            &self,
            user_id: UserId,
            extra: Duration,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<Session>> {
            self.inner.extend_session(user_id, extra, now).await
        }

        async fn close_session(
            &self,
            session_id: SessionId,
            now: DateTime<Utc>,
            expired_by: Option<DateTime<Utc>>,
        ) -> StoreResult<Option<ClosedSession>> {
            if session_id == self.stuck {
                return Err(StoreError::Timeout(std::time::Duration::from_secs(5)));
            }
            self.inner.close_session(session_id, now, expired_by).await
        }

        async fn record_device(&self, fingerprint: &DeviceFingerprint) -> StoreResult<()> {
            self.inner.record_device(fingerprint).await
        }
    }

    #[async_trait]
    impl MatchRepository for StuckSessionStore {
        async fn insert_match_if_free(
            &self,
            candidate: &Match,
            now: DateTime<Utc>,
        ) -> StoreResult<bool> {
            self.inner.insert_match_if_free(candidate, now).await
        }

        async fn find_match(&self, match_id: MatchId) -> StoreResult<Option<Match>> {
            self.inner.find_match(match_id).await
        }

        async fn find_live_match(
            &self,
            user_id: UserId,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<Match>> {
            self.inner.find_live_match(user_id, now).await
        }

        async fn users_with_live_match(
            &self,
            now: DateTime<Utc>,
        ) -> StoreResult<HashSet<UserId>> {
            self.inner.users_with_live_match(now).await
        }

        async fn decline_match(
            &self,
            match_id: MatchId,
            declined_by: UserId,
            kind: DeclineKind,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<Match>> {
            self.inner
                .decline_match(match_id, declined_by, kind, now)
                .await
        }

        async fn accept_match(
            &self,
            match_id: MatchId,
            accepted_by: UserId,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<Match>> {
            self.inner.accept_match(match_id, accepted_by, now).await
        }

        async fn list_pending_matches(&self) -> StoreResult<Vec<Match>> {
            self.inner.list_pending_matches().await
        }
    }

    #[async_trait]
    impl DeclineRepository for StuckSessionStore {
        async fn record_decline(
            &self,
            decliner_id: UserId,
            declined_id: UserId,
            session_id: SessionId,
            now: DateTime<Utc>,
        ) -> StoreResult<DeclineRecord> {
            self.inner
                .record_decline(decliner_id, declined_id, session_id, now)
                .await
        }

        async fn find_decline(
            &self,
            decliner_id: UserId,
            declined_id: UserId,
        ) -> StoreResult<Option<DeclineRecord>> {
            self.inner.find_decline(decliner_id, declined_id).await
        }

        async fn excluded_users(&self, user_id: UserId) -> StoreResult<HashSet<UserId>> {
            self.inner.excluded_users(user_id).await
        }
    }

    #[async_trait]
    impl ProfileRepository for StuckSessionStore {
        async fn insert_profile(&self, profile: &EphemeralProfile) -> StoreResult<bool> {
            self.inner.insert_profile(profile).await
        }

        async fn find_profile(&self, user_id: UserId) -> StoreResult<Option<EphemeralProfile>> {
            self.inner.find_profile(user_id).await
        }

        async fn update_profile(&self, profile: &EphemeralProfile) -> StoreResult<bool> {
            self.inner.update_profile(profile).await
        }

        async fn insert_preferences(&self, preferences: &Preferences) -> StoreResult<bool> {
            self.inner.insert_preferences(preferences).await
        }

        async fn find_preferences(&self, user_id: UserId) -> StoreResult<Option<Preferences>> {
            self.inner.find_preferences(user_id).await
        }

        async fn update_preferences(&self, preferences: &Preferences) -> StoreResult<bool> {
            self.inner.update_preferences(preferences).await
        }
    }

    #[async_trait]
    impl LiveStore for StuckSessionStore {
        async fn health_check(&self) -> StoreResult<()> {
            self.inner.health_check().await
        }
    }

    fn session(user_id: UserId, expires_in_minutes: i64) -> Session {
        let now = Utc::now();
        let location = Coordinate::new(40.0, -74.0).unwrap();
        Session {
            id: Uuid::new_v4(),
            user_id,
            started_at: now - Duration::minutes(60),
            expires_at: now + Duration::minutes(expires_in_minutes),
            ended_at: None,
            true_location: location,
            fuzzed_location: location,
        }
    }

    fn manager(store: Arc<dyn LiveStore>) -> SessionManager {
        let queue: Arc<dyn TaskQueue> = Arc::new(NoopTaskQueue);
        let config = Arc::new(LiveMatchConfig::default());
        SessionManager::new(
            store,
            ExpiryScheduler::new(queue.clone()),
            AutoDeclineScheduler::new(queue.clone()),
            MatchingScheduler::new(queue, config.trigger_delays()),
            Arc::new(EventBus::default()),
            config,
        )
    }

    #[tokio::test]
    async fn test_recover_continues_past_a_failing_session() {
        let stuck = session(1, -5);
        let expired = session(2, -5);
        let open = session(3, 20);

        let store = Arc::new(StuckSessionStore {
            inner: MemoryStore::new(),
            stuck: stuck.id,
        });
        for s in [&stuck, &expired, &open] {
            assert!(store.insert_session(s).await.unwrap());
        }

        let sessions = manager(store.clone());
        assert_eq!(sessions.recover().await.unwrap(), 3);

        assert!(store.find_active_session(1).await.unwrap().is_some());
        assert!(store.find_active_session(2).await.unwrap().is_none());
        assert!(store.find_active_session(3).await.unwrap().is_some());
    }
}
