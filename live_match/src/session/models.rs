//! Session data models.

use crate::{geo::Coordinate, matching::Match, profile::UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Session ID type
pub type SessionId = Uuid;

/// A user's time-boxed availability window
///
/// The true coordinate is crate-private: only the store and the session
/// manager ever see it. Everything else works with `fuzzed_location`.
#[derive(Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub(crate) true_location: Coordinate,
    pub fuzzed_location: Coordinate,
}

impl Session {
    /// Whether the session is still open
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Seconds until expiry, floored at zero
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Client-facing view
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            started_at: self.started_at,
            expires_at: self.expires_at,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("started_at", &self.started_at)
            .field("expires_at", &self.expires_at)
            .field("ended_at", &self.ended_at)
            .field("fuzzed_location", &self.fuzzed_location)
            .finish_non_exhaustive()
    }
}

/// Session as returned to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of `GET /session`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub active: bool,
    pub session_id: Option<SessionId>,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_seconds: i64,
}

impl SessionStatus {
    pub fn inactive() -> Self {
        Self {
            active: false,
            session_id: None,
            expires_at: None,
            remaining_seconds: 0,
        }
    }
}

/// Start-session request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    /// Duration in minutes
    pub duration: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub device: Option<DeviceInfo>,
}

/// Client device description sent with a session start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_model: Option<String>,
    pub platform: Option<String>,
}

/// Device fingerprint stored for abuse analysis
#[derive(Debug, Clone, Serialize)]
pub struct DeviceFingerprint {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub device_id: String,
    pub device_model: Option<String>,
    pub platform: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Why a session closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Manual,
    Expired,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Manual => write!(f, "manual"),
            EndReason::Expired => write!(f, "expired"),
        }
    }
}

/// Outcome of closing a session in the store
#[derive(Debug, Clone)]
pub struct ClosedSession {
    pub session: Session,
    /// Live matches that referenced the session and were cut short with it
    pub invalidated_matches: Vec<Match>,
}
