//! Approximate count of other active sessions in range.

use std::sync::Arc;

use super::errors::MatchResult;
use crate::{
    db::LiveStore,
    geo::{Coordinate, haversine_km},
    session::Session,
};

/// Sessions whose fuzzed coordinate lies within `radius_km` of `center`
pub fn count_within(sessions: &[Session], center: Coordinate, radius_km: f64) -> usize {
    sessions
        .iter()
        .filter(|s| s.is_active() && haversine_km(center, s.fuzzed_location) <= radius_km)
        .count()
}

/// Nearby-count estimator
///
/// Counts by fuzzed coordinate, so the figure is approximate. It is shown
/// to users and never feeds matching.
#[derive(Clone)]
pub struct NearbyEstimator {
    store: Arc<dyn LiveStore>,
}

impl NearbyEstimator {
    pub fn new(store: Arc<dyn LiveStore>) -> Self {
        Self { store }
    }

    /// Active sessions within `radius_km` of `center`, minus the caller
    pub async fn count_nearby(&self, center: Coordinate, radius_km: f64) -> MatchResult<usize> {
        let sessions = self.store.list_active_sessions().await?;
        Ok(count_within(&sessions, center, radius_km).saturating_sub(1))
    }
}
