//! Plain tokio timers for tasks the queue refused.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock, Weak},
    time::Duration,
};
use tokio::{sync::Mutex, task::JoinHandle};

use super::tasks::{ScheduleOutcome, Task, TaskHandler, TaskKey};

/// Runs a task after a delay on a spawned tokio timer
///
/// Nothing is persisted and failures are not retried. One timer per key,
/// like the queue. The handler is attached after construction and held
/// weakly, since it usually owns this runner.
#[derive(Clone, Default)]
pub struct LocalFallback {
    handler: Arc<OnceLock<Weak<dyn TaskHandler>>>,
    pending: Arc<Mutex<HashMap<TaskKey, JoinHandle<()>>>>,
}

impl LocalFallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route due tasks to `handler`; only the first call has an effect
    pub fn attach(&self, handler: Weak<dyn TaskHandler>) {
        if self.handler.set(handler).is_err() {
            log::warn!("Fallback timer handler already attached");
        }
    }

    /// Run `task` after `delay` unless one with the same key is pending
    ///
    /// # Returns
    ///
    /// * `Option<ScheduleOutcome>` - `None` without a handler or runtime
    pub async fn run_later(&self, task: Task, delay: Duration) -> Option<ScheduleOutcome> {
        let handler = self.handler.get()?.clone();
        let runtime = tokio::runtime::Handle::try_current().ok()?;

        let key = task.key();
        let mut pending = self.pending.lock().await;
        pending.retain(|_, timer| !timer.is_finished());
        if pending.contains_key(&key) {
            return Some(ScheduleOutcome::Coalesced);
        }

        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(handler) = handler.upgrade() else {
                return;
            };
            let key = task.key();
            if let Err(e) = handler.handle(task).await {
                log::warn!("Fallback task {key} failed: {e}");
            }
        });
        pending.insert(key, timer);
        Some(ScheduleOutcome::Armed)
    }

    /// Abort the pending timer for `key`; `true` if there was one
    pub async fn cancel(&self, key: &TaskKey) -> bool {
        match self.pending.lock().await.remove(key) {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}
