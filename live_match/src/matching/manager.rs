//! Match lifecycle: creation, decline, auto-decline, accept and lookups.

use chrono::Utc;
use std::sync::Arc;

use super::{
    decline::DeclineMemory,
    engine::MatchingEngine,
    errors::{MatchError, MatchResult},
    models::{CurrentMatch, Match, MatchId, NearbyCount},
    nearby::NearbyEstimator,
};
use crate::{
    db::{DeclineKind, LiveStore},
    events::{EventBus, LiveEvent, Notification, Notifier},
    geo::haversine_km,
    profile::{DEFAULT_MAX_DISTANCE_KM, ProfileError, ProfileManager, UserId},
    scheduler::{AutoDeclineScheduler, MatchingScheduler},
    session::{Session, SessionId},
};

/// Round a distance to one decimal for display
fn display_km(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

/// Match manager
#[derive(Clone)]
pub struct MatchManager {
    store: Arc<dyn LiveStore>,
    engine: MatchingEngine,
    declines: DeclineMemory,
    nearby: NearbyEstimator,
    profiles: ProfileManager,
    auto_decline: AutoDeclineScheduler,
    matching: MatchingScheduler,
    events: Arc<EventBus>,
    notifier: Arc<dyn Notifier>,
}

impl MatchManager {
    /// Create a new match manager
    pub fn new(
        store: Arc<dyn LiveStore>,
        engine: MatchingEngine,
        profiles: ProfileManager,
        auto_decline: AutoDeclineScheduler,
        matching: MatchingScheduler,
        events: Arc<EventBus>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            declines: DeclineMemory::new(store.clone()),
            nearby: NearbyEstimator::new(store.clone()),
            store,
            engine,
            profiles,
            auto_decline,
            matching,
            events,
            notifier,
        }
    }

    pub fn declines(&self) -> &DeclineMemory {
        &self.declines
    }

    /// Matching trigger callback
    ///
    /// A no-op when the session closed or changed owner since the trigger
    /// was scheduled.
    pub async fn run_matching(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> MatchResult<Option<Match>> {
        let Some(session) = self.store.find_session(session_id).await? else {
            return Ok(None);
        };
        if session.user_id != user_id || !session.is_active() {
            log::debug!("Matching for closed session {session_id} skipped");
            return Ok(None);
        }

        let Some(new_match) = self.engine.find_candidate(&session).await? else {
            return Ok(None);
        };

        self.matching.cancel(new_match.session_b).await;
        self.auto_decline
            .arm(new_match.id, new_match.expires_at)
            .await;

        self.events.publish(LiveEvent::MatchCreated {
            match_id: new_match.id,
            user_a: new_match.user_a,
            user_b: new_match.user_b,
            auto_decline_at: new_match.expires_at,
        });

        let notification = Notification::match_found(new_match.id);
        for user in [new_match.user_a, new_match.user_b] {
            if let Err(e) = self.notifier.notify(user, &notification).await {
                log::warn!(
                    "Match {} notification to user {} failed: {}",
                    new_match.id,
                    user,
                    e
                );
            }
        }

        Ok(Some(new_match))
    }

    /// Decline a live match
    ///
    /// Records the decline, cancels the auto-decline timer and puts both
    /// users back in the pool; the decliner after the cooldown.
    ///
    /// # Errors
    ///
    /// * `MatchError::NoActiveSession` - Caller has no open session
    /// * `MatchError::MatchNotFound` - Unknown, not the caller's, or already decided
    pub async fn decline(&self, user_id: UserId, match_id: MatchId) -> MatchResult<Match> {
        let session = self
            .store
            .find_active_session(user_id)
            .await?
            .ok_or(MatchError::NoActiveSession)?;

        let found = self.store.find_match(match_id).await?;
        if !found.is_some_and(|m| m.involves(user_id)) {
            return Err(MatchError::MatchNotFound);
        }

        let declined = self
            .store
            .decline_match(match_id, user_id, DeclineKind::Manual, Utc::now())
            .await?
            .ok_or(MatchError::MatchNotFound)?;
        let (other, other_session) = declined
            .counterpart(user_id)
            .ok_or(MatchError::MatchNotFound)?;

        self.declines
            .record_decline(user_id, other, session.id)
            .await?;

        self.auto_decline.cancel(match_id).await;
        self.matching.on_decline(user_id, session.id).await;
        self.matching.on_release(other, other_session).await;

        self.events.publish(LiveEvent::MatchDeclined {
            match_id,
            declined_by: user_id,
            other_user: other,
            auto: false,
        });

        Ok(declined)
    }

    /// Auto-decline timer callback
    ///
    /// Declines on behalf of the candidate side. An accepted match is left
    /// as it is and both users return to the pool; a match that was already
    /// declined or invalidated is a no-op.
    pub async fn auto_decline(&self, match_id: MatchId) -> MatchResult<Option<Match>> {
        let Some(found) = self.store.find_match(match_id).await? else {
            log::debug!("Auto-decline for unknown match {match_id} ignored");
            return Ok(None);
        };

        if found.accepted_at.is_some() {
            log::info!("Match {match_id} was accepted, releasing both users");
            self.release_both(&found).await;
            return Ok(None);
        }
        if !found.is_undecided() {
            log::debug!("Match {match_id} already decided");
            return Ok(None);
        }
        for (_, session_id) in found.participants() {
            let open = self
                .store
                .find_session(session_id)
                .await?
                .is_some_and(|s| s.is_active());
            if !open {
                log::debug!("Match {match_id} outlived session {session_id}, nothing to decline");
                return Ok(None);
            }
        }

        let Some(declined) = self
            .store
            .decline_match(match_id, found.user_b, DeclineKind::Auto, Utc::now())
            .await?
        else {
            return Ok(None);
        };

        self.declines
            .record_decline(declined.user_b, declined.user_a, declined.session_b)
            .await?;
        self.release_both(&declined).await;

        log::info!("Match {match_id} auto-declined");
        self.events.publish(LiveEvent::MatchDeclined {
            match_id,
            declined_by: declined.user_b,
            other_user: declined.user_a,
            auto: true,
        });

        Ok(Some(declined))
    }

    /// Accept a live match
    ///
    /// Accepting again is harmless. The auto-decline timer stays armed and
    /// ends the match window when it fires.
    ///
    /// # Errors
    ///
    /// * `MatchError::NoActiveSession` - Caller has no open session
    /// * `MatchError::MatchNotFound` - Unknown, not the caller's, or no longer live
    pub async fn accept(&self, user_id: UserId, match_id: MatchId) -> MatchResult<Match> {
        if self.store.find_active_session(user_id).await?.is_none() {
            return Err(MatchError::NoActiveSession);
        }

        let found = self.store.find_match(match_id).await?;
        if !found.is_some_and(|m| m.involves(user_id)) {
            return Err(MatchError::MatchNotFound);
        }

        let accepted = self
            .store
            .accept_match(match_id, user_id, Utc::now())
            .await?
            .ok_or(MatchError::MatchNotFound)?;
        let (other, _) = accepted
            .counterpart(user_id)
            .ok_or(MatchError::MatchNotFound)?;

        log::info!("User {user_id} accepted match {match_id}");
        self.events.publish(LiveEvent::MatchAccepted {
            match_id,
            accepted_by: user_id,
            other_user: other,
        });

        Ok(accepted)
    }

    /// What the caller currently sees
    pub async fn current(&self, user_id: UserId) -> MatchResult<CurrentMatch> {
        let Some(session) = self.store.find_active_session(user_id).await? else {
            return Ok(CurrentMatch::NoSession);
        };

        let now = Utc::now();
        let Some(live) = self.store.find_live_match(user_id, now).await? else {
            return Ok(CurrentMatch::Searching);
        };
        let Some((other, other_session_id)) = live.counterpart(user_id) else {
            return Ok(CurrentMatch::Searching);
        };
        let Some(other_session) = self.store.find_session(other_session_id).await? else {
            log::warn!(
                "Match {} points at missing session {}",
                live.id,
                other_session_id
            );
            return Ok(CurrentMatch::Searching);
        };

        let profile = self.profiles.match_profile(other).await?;
        Ok(CurrentMatch::Matched {
            match_id: live.id,
            profile,
            distance_km: display_km(haversine_km(
                session.fuzzed_location,
                other_session.fuzzed_location,
            )),
            auto_decline_at: live.expires_at,
            accepted: live.accepted_at.is_some(),
        })
    }

    /// Approximate number of other active sessions within the caller's range
    ///
    /// # Errors
    ///
    /// * `MatchError::NoActiveSession` - Caller has no open session
    pub async fn nearby(&self, user_id: UserId) -> MatchResult<NearbyCount> {
        let session = self
            .store
            .find_active_session(user_id)
            .await?
            .ok_or(MatchError::NoActiveSession)?;

        let max_distance_km = self.max_distance_for(&session).await?;
        let count = self
            .nearby
            .count_nearby(session.fuzzed_location, max_distance_km)
            .await?;

        Ok(NearbyCount {
            count,
            max_distance_km,
        })
    }

    /// Re-arm auto-decline timers for undecided matches
    pub async fn recover(&self) -> MatchResult<usize> {
        let pending = self.store.list_pending_matches().await?;
        for m in &pending {
            self.auto_decline.arm(m.id, m.expires_at).await;
        }
        Ok(pending.len())
    }

    async fn max_distance_for(&self, session: &Session) -> MatchResult<f64> {
        match self.profiles.user_summary(session.user_id).await {
            Ok(summary) => Ok(self
                .profiles
                .effective_preferences(&summary)
                .await?
                .max_distance_km),
            Err(ProfileError::UserNotFound(_)) => Ok(DEFAULT_MAX_DISTANCE_KM),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_both(&self, m: &Match) {
        for (user, session) in m.participants() {
            self.matching.on_release(user, session).await;
        }
    }
}
