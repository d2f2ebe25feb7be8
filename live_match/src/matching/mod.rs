//! Candidate matching, decline memory and the nearby count.
//!
//! [`MatchManager`] drives a match from creation to its end: the engine
//! picks a candidate, the auto-decline timer bounds how long it stays open,
//! and declines are remembered per pair.

pub mod decline;
pub mod engine;
pub mod errors;
pub mod manager;
pub mod models;
pub mod nearby;

pub use decline::DeclineMemory;
pub use engine::{Candidate, MatchingEngine, match_expiry, mutually_compatible, rank};
pub use errors::{MatchError, MatchResult};
pub use manager::MatchManager;
pub use models::{
    CurrentMatch, DECLINE_WRAP_THRESHOLD, DeclineRecord, Match, MatchId, MatchProfile,
    NearbyCount,
};
pub use nearby::{NearbyEstimator, count_within};
