//! Candidate selection and match creation.

use chrono::{DateTime, Duration, Utc};
use std::{cmp::Ordering, sync::Arc};

use super::{errors::MatchResult, models::Match};
use crate::{
    db::LiveStore,
    geo::haversine_km,
    profile::{Preferences, ProfileError, ProfileManager, UserSummary},
    session::Session,
};

/// Minimum slack kept between a match's expiry and either session's expiry
const SESSION_MARGIN_SECS: i64 = 1;

/// A compatible session with its distance from the seeker
#[derive(Debug, Clone)]
pub struct Candidate {
    pub session: Session,
    pub distance_km: f64,
}

/// Both sides accept each other on age, gender and distance
pub fn mutually_compatible(
    seeker: (&UserSummary, &Preferences),
    other: (&UserSummary, &Preferences),
    distance_km: f64,
) -> bool {
    let (seeker_summary, seeker_prefs) = seeker;
    let (other_summary, other_prefs) = other;
    seeker_prefs.accepts(other_summary)
        && other_prefs.accepts(seeker_summary)
        && distance_km <= seeker_prefs.max_distance_km
        && distance_km <= other_prefs.max_distance_km
}

/// Nearest first; ties go to the longer-waiting session, then the lower user id
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.session.started_at.cmp(&b.session.started_at))
            .then_with(|| a.session.user_id.cmp(&b.session.user_id))
            .then(Ordering::Equal)
    });
}

/// Expiry for a match between two sessions, or `None` if no window is left
pub fn match_expiry(
    now: DateTime<Utc>,
    ttl: Duration,
    a: &Session,
    b: &Session,
) -> Option<DateTime<Utc>> {
    let margin = Duration::seconds(SESSION_MARGIN_SECS);
    let expires_at = (now + ttl)
        .min(a.expires_at - margin)
        .min(b.expires_at - margin);
    (expires_at > now).then_some(expires_at)
}

/// Matching engine
///
/// Reads candidates from the store and writes at most one match per run.
/// The double-matching guard is the store's conditional insert; losing that
/// race simply means no match this round.
#[derive(Clone)]
pub struct MatchingEngine {
    store: Arc<dyn LiveStore>,
    profiles: ProfileManager,
    match_ttl: Duration,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn LiveStore>, profiles: ProfileManager, match_ttl: Duration) -> Self {
        Self {
            store,
            profiles,
            match_ttl,
        }
    }

    /// Find the best candidate for `session` and create a match with them
    ///
    /// # Returns
    ///
    /// * `MatchResult<Option<Match>>` - The new match, or `None` when the
    ///   session is closed, already matched, nobody fits, or the insert lost
    ///   a race
    pub async fn find_candidate(&self, session: &Session) -> MatchResult<Option<Match>> {
        let now = Utc::now();
        if !session.is_active() || session.expires_at <= now {
            return Ok(None);
        }
        if self
            .store
            .find_live_match(session.user_id, now)
            .await?
            .is_some()
        {
            log::debug!("User {} already has a live match", session.user_id);
            return Ok(None);
        }

        let candidates = self.candidates(session, now).await?;
        let Some(best) = candidates
            .into_iter()
            .find_map(|c| match_expiry(now, self.match_ttl, session, &c.session).map(|e| (c, e)))
        else {
            log::debug!("No candidate for session {}", session.id);
            return Ok(None);
        };

        let (candidate, expires_at) = best;
        let new_match = Match::new(
            (session.user_id, session.id),
            (candidate.session.user_id, candidate.session.id),
            now,
            expires_at,
        );

        if !self.store.insert_match_if_free(&new_match, now).await? {
            log::info!(
                "Match between users {} and {} lost a race, retrying later",
                new_match.user_a,
                new_match.user_b
            );
            return Ok(None);
        }

        log::info!(
            "Matched user {} with user {} ({:.1} km) until {}",
            new_match.user_a,
            new_match.user_b,
            candidate.distance_km,
            expires_at
        );
        Ok(Some(new_match))
    }

    /// Compatible, unmatched, non-declined sessions, ranked
    pub async fn candidates(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> MatchResult<Vec<Candidate>> {
        let seeker = match self.profiles.user_summary(session.user_id).await {
            Ok(summary) => summary,
            Err(ProfileError::UserNotFound(id)) => {
                log::warn!("User {id} has a session but no main profile");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let seeker_prefs = self.profiles.effective_preferences(&seeker).await?;

        let excluded = self.store.excluded_users(session.user_id).await?;
        let busy = self.store.users_with_live_match(now).await?;

        let mut candidates = Vec::new();
        for other in self.store.list_active_sessions().await? {
            if other.user_id == session.user_id
                || other.expires_at <= now
                || excluded.contains(&other.user_id)
                || busy.contains(&other.user_id)
            {
                continue;
            }

            let distance_km = haversine_km(session.fuzzed_location, other.fuzzed_location);
            if distance_km > seeker_prefs.max_distance_km {
                continue;
            }

            let other_summary = match self.profiles.user_summary(other.user_id).await {
                Ok(summary) => summary,
                Err(ProfileError::UserNotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            let other_prefs = self.profiles.effective_preferences(&other_summary).await?;

            if mutually_compatible(
                (&seeker, &seeker_prefs),
                (&other_summary, &other_prefs),
                distance_km,
            ) {
                candidates.push(Candidate {
                    session: other,
                    distance_km,
                });
            }
        }

        rank(&mut candidates);
        Ok(candidates)
    }
}
