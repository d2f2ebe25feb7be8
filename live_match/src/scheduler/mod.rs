//! Delayed work: session expiry, match auto-decline and matching triggers.
//!
//! Everything here is signalling only. The store is the source of truth,
//! every callback re-reads state before acting, and a queue that is down or
//! disabled ([`NoopTaskQueue`]) degrades to log warnings rather than failed
//! requests. Matching triggers fall back to local timers ([`LocalFallback`])
//! in that case; expiry and auto-decline do not.

pub mod auto_decline;
pub mod errors;
pub mod expiry;
pub mod fallback;
pub mod matching;
pub mod queue;
pub mod tasks;

pub use auto_decline::AutoDeclineScheduler;
pub use errors::{SchedulerError, SchedulerResult, TaskError};
pub use expiry::ExpiryScheduler;
pub use fallback::LocalFallback;
pub use matching::{MatchingScheduler, TriggerDelays};
pub use queue::{NoopTaskQueue, RetryPolicy, TaskQueue, TimerHandle, TimerQueue, spawn_timer_queue};
pub use tasks::{ScheduleMode, ScheduleOutcome, Task, TaskHandler, TaskKey};

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Time from now until `at`, zero if already past
pub(crate) fn delay_until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}
