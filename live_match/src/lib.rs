//! # Live Match
//!
//! Timed, proximity-based live matching.
//!
//! A user with a live profile opens a session for a bounded number of
//! minutes at a (fuzzed) coordinate. While sessions are open the engine pairs
//! mutually compatible users nearby, one candidate at a time; each match is
//! accepted, declined, or silently auto-declined when its window closes.
//!
//! ## Core Modules
//!
//! - [`session`]: Session lifecycle and expiry
//! - [`matching`]: Candidate selection, declines, nearby count
//! - [`profile`]: Ephemeral profiles, photos and preferences
//! - [`scheduler`]: Delayed tasks (expiry, auto-decline, matching triggers)
//! - [`geo`]: Coordinates, fuzzing and great-circle distance
//! - [`db`]: PostgreSQL and in-memory stores
//! - [`events`]: Event bus and external collaborators
//!
//! ## Example
//!
//! ```no_run
//! use live_match::{
//!     LiveMatch,
//!     db::MemoryStore,
//!     events::{InMemoryPhotoStorage, InMemoryUserDirectory},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (service, timer) = LiveMatch::builder(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(InMemoryUserDirectory::new()),
//!         Arc::new(InMemoryPhotoStorage::new()),
//!     )
//!     .spawn();
//!
//!     let _events = service.events().subscribe();
//!     timer.shutdown().await;
//! }
//! ```

pub mod config;
pub mod db;
pub mod events;
pub mod geo;
pub mod matching;
pub mod profile;
pub mod scheduler;
pub mod service;
pub mod session;

pub use config::LiveMatchConfig;
pub use geo::{Coordinate, haversine_km};
pub use service::{LiveMatch, LiveMatchBuilder, RecoveryError, RecoveryReport};
