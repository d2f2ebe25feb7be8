//! Live-mode tuning knobs.

use std::time::Duration;

use crate::scheduler::{RetryPolicy, TriggerDelays};

/// Timings and limits for live mode
#[derive(Debug, Clone)]
pub struct LiveMatchConfig {
    /// Maximum offset applied to session coordinates
    pub fuzz_radius_km: f64,
    /// Shortest allowed session
    pub min_session_minutes: i64,
    /// Longest allowed session
    pub max_session_minutes: i64,
    /// Largest single extension
    pub max_extend_minutes: i64,
    /// Matching delay after a session starts
    pub settle_delay: Duration,
    /// Matching delay after the user declines; longer than `settle_delay`
    pub decline_cooldown: Duration,
    /// Matching delay after a match is released
    pub release_delay: Duration,
    /// Upper bound on how long a match waits for an answer
    pub match_ttl: Duration,
    /// Photo upload size limit in bytes
    pub max_photo_bytes: usize,
    /// Retry behaviour of the timer queue
    pub retry: RetryPolicy,
}

impl LiveMatchConfig {
    pub fn trigger_delays(&self) -> TriggerDelays {
        TriggerDelays {
            settle: self.settle_delay,
            decline_cooldown: self.decline_cooldown,
            release: self.release_delay,
        }
    }

    /// Check cross-field invariants
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if !self.fuzz_radius_km.is_finite() || self.fuzz_radius_km < 0.0 {
            return Err("fuzz radius must be a non-negative number".to_string());
        }
        if self.min_session_minutes < 1 || self.max_session_minutes < self.min_session_minutes {
            return Err(format!(
                "session bounds {}..={} minutes are invalid",
                self.min_session_minutes, self.max_session_minutes
            ));
        }
        if self.max_extend_minutes < 1 {
            return Err("max extension must be at least 1 minute".to_string());
        }
        if self.decline_cooldown <= self.settle_delay {
            return Err("decline cooldown must be longer than the settle delay".to_string());
        }
        if self.match_ttl < Duration::from_secs(1) {
            return Err("match TTL must be at least 1 second".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for LiveMatchConfig {
    fn default() -> Self {
        Self {
            fuzz_radius_km: 0.5,
            min_session_minutes: 5,
            max_session_minutes: 120,
            max_extend_minutes: 60,
            settle_delay: Duration::from_secs(15),
            decline_cooldown: Duration::from_secs(30),
            release_delay: Duration::from_secs(5),
            match_ttl: Duration::from_secs(120),
            max_photo_bytes: 5 * 1024 * 1024,
            retry: RetryPolicy::default(),
        }
    }
}
