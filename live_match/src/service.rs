//! Wiring: one [`LiveMatch`] owns every manager and dispatches timer tasks.

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use thiserror::Error;

use crate::{
    config::LiveMatchConfig,
    db::{LiveStore, StoreResult},
    events::{EventBus, LogNotifier, Notifier, PhotoStorage, UserDirectory},
    matching::{MatchError, MatchManager, MatchingEngine},
    profile::{ProfileError, ProfileManager},
    scheduler::{
        AutoDeclineScheduler, ExpiryScheduler, LocalFallback, MatchingScheduler, NoopTaskQueue,
        Task, TaskError, TaskHandler, TaskQueue, TimerHandle, TimerQueue,
    },
    session::{SessionError, SessionManager},
};

/// Failure while re-arming timers at start-up
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

/// What `recover` found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub sessions: usize,
    pub pending_matches: usize,
}

/// The live-matching service
pub struct LiveMatch {
    pub sessions: SessionManager,
    pub profiles: ProfileManager,
    pub matches: MatchManager,
    store: Arc<dyn LiveStore>,
    events: Arc<EventBus>,
    config: Arc<LiveMatchConfig>,
}

impl LiveMatch {
    /// Start building a service over `store` and its collaborators
    pub fn builder(
        store: Arc<dyn LiveStore>,
        directory: Arc<dyn UserDirectory>,
        photos: Arc<dyn PhotoStorage>,
    ) -> LiveMatchBuilder {
        LiveMatchBuilder {
            store,
            directory,
            photos,
            notifier: Arc::new(LogNotifier),
            events: Arc::new(EventBus::default()),
            config: LiveMatchConfig::default(),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn config(&self) -> &LiveMatchConfig {
        &self.config
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        self.store.health_check().await
    }

    /// Re-arm timers from the store after a restart
    ///
    /// Sessions already past their expiry are closed; undecided matches get
    /// their auto-decline timer back.
    pub async fn recover(&self) -> Result<RecoveryReport, RecoveryError> {
        let sessions = self.sessions.recover().await?;
        let pending_matches = self.matches.recover().await?;
        log::info!("Recovered {sessions} session(s) and {pending_matches} pending match(es)");
        Ok(RecoveryReport {
            sessions,
            pending_matches,
        })
    }
}

#[async_trait]
impl TaskHandler for LiveMatch {
    async fn handle(&self, task: Task) -> Result<(), TaskError> {
        match task {
            Task::ExpireSession { session_id } => self
                .sessions
                .expire(session_id)
                .await
                .map(|_| ())
                .map_err(session_task_error),
            Task::AutoDecline { match_id } => self
                .matches
                .auto_decline(match_id)
                .await
                .map(|_| ())
                .map_err(match_task_error),
            Task::RunMatching {
                user_id,
                session_id,
            } => self
                .matches
                .run_matching(user_id, session_id)
                .await
                .map(|_| ())
                .map_err(match_task_error),
        }
    }
}

fn session_task_error(e: SessionError) -> TaskError {
    match e {
        SessionError::Store(_) => TaskError::Transient(e.to_string()),
        _ => TaskError::Permanent(e.to_string()),
    }
}

fn match_task_error(e: MatchError) -> TaskError {
    match e {
        MatchError::Store(_)
        | MatchError::Profile(ProfileError::Store(_))
        | MatchError::Profile(ProfileError::Collaborator(_)) => {
            TaskError::Transient(e.to_string())
        }
        _ => TaskError::Permanent(e.to_string()),
    }
}

/// Builder for [`LiveMatch`]
pub struct LiveMatchBuilder {
    store: Arc<dyn LiveStore>,
    directory: Arc<dyn UserDirectory>,
    photos: Arc<dyn PhotoStorage>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
    config: LiveMatchConfig,
}

impl LiveMatchBuilder {
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn config(mut self, config: LiveMatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Build against an explicit task queue
    ///
    /// The caller is responsible for routing due tasks back to the service.
    /// Matching triggers the queue refuses run on local timers instead.
    pub fn build_with_queue(self, queue: Arc<dyn TaskQueue>) -> Arc<LiveMatch> {
        let config = Arc::new(self.config);
        let match_ttl = chrono::Duration::from_std(config.match_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));

        let expiry = ExpiryScheduler::new(queue.clone());
        let auto_decline = AutoDeclineScheduler::new(queue.clone());
        let fallback = LocalFallback::new();
        let matching =
            MatchingScheduler::new(queue, config.trigger_delays()).with_fallback(fallback.clone());

        let profiles = ProfileManager::new(
            self.store.clone(),
            self.directory,
            self.photos,
            config.max_photo_bytes,
        );
        let sessions = SessionManager::new(
            self.store.clone(),
            expiry,
            auto_decline.clone(),
            matching.clone(),
            self.events.clone(),
            config.clone(),
        );
        let engine = MatchingEngine::new(self.store.clone(), profiles.clone(), match_ttl);
        let matches = MatchManager::new(
            self.store.clone(),
            engine,
            profiles.clone(),
            auto_decline,
            matching,
            self.events.clone(),
            self.notifier,
        );

        let service = Arc::new(LiveMatch {
            sessions,
            profiles,
            matches,
            store: self.store,
            events: self.events,
            config,
        });
        let handler: Weak<LiveMatch> = Arc::downgrade(&service);
        fallback.attach(handler);
        service
    }

    /// Build without a task queue
    ///
    /// Sessions never expire on their own and matches are never
    /// auto-declined. Matching still runs, on local timers that are lost
    /// on restart.
    pub fn build_degraded(self) -> Arc<LiveMatch> {
        self.build_with_queue(Arc::new(NoopTaskQueue))
    }

    /// Build with an in-process timer queue and spawn it
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> (Arc<LiveMatch>, TimerHandle) {
        let (timer, handle) = TimerQueue::new(self.config.retry);
        let service = self.build_with_queue(Arc::new(handle.clone()));
        tokio::spawn(timer.run(service.clone()));
        (service, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use std::time::Duration;

    #[test]
    fn test_store_failures_are_retried() {
        let timeout = || StoreError::Timeout(Duration::from_secs(5));
        assert!(session_task_error(SessionError::Store(timeout())).is_transient());
        assert!(match_task_error(MatchError::Store(timeout())).is_transient());
        assert!(
            match_task_error(MatchError::Profile(ProfileError::Store(timeout()))).is_transient()
        );
    }

    #[test]
    fn test_logic_failures_are_not_retried() {
        assert!(!session_task_error(SessionError::NoActiveSession).is_transient());
        assert!(!match_task_error(MatchError::MatchNotFound).is_transient());
    }
}
