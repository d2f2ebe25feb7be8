//! Delayed task queue: the trait, the in-process timer actor, and a no-op
//! stand-in for running without one.

use async_trait::async_trait;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep_until},
};

use super::{
    errors::{SchedulerError, SchedulerResult},
    tasks::{ScheduleMode, ScheduleOutcome, Task, TaskHandler, TaskKey},
};

/// Fire-and-forget delayed execution keyed by [`TaskKey`]
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Arm `task` to run after `delay`
    async fn schedule(
        &self,
        task: Task,
        delay: Duration,
        mode: ScheduleMode,
    ) -> SchedulerResult<ScheduleOutcome>;

    /// Disarm the task with `key`; `true` if one was pending
    async fn cancel(&self, key: &TaskKey) -> SchedulerResult<bool>;
}

/// Queue that refuses every request
///
/// Used when delayed tasks are disabled; callers log and carry on.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTaskQueue;

#[async_trait]
impl TaskQueue for NoopTaskQueue {
    async fn schedule(
        &self,
        task: Task,
        _delay: Duration,
        _mode: ScheduleMode,
    ) -> SchedulerResult<ScheduleOutcome> {
        Err(SchedulerError::Unavailable(format!(
            "scheduler disabled, dropping {}",
            task.key()
        )))
    }

    async fn cancel(&self, key: &TaskKey) -> SchedulerResult<bool> {
        Err(SchedulerError::Unavailable(format!(
            "scheduler disabled, cannot cancel {key}"
        )))
    }
}

/// Backoff for failed callbacks
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total runs including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before run number `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Messages accepted by the timer actor
#[derive(Debug)]
enum TimerMessage {
    Schedule {
        task: Task,
        delay: Duration,
        mode: ScheduleMode,
        response: oneshot::Sender<ScheduleOutcome>,
    },
    Cancel {
        key: TaskKey,
        response: oneshot::Sender<bool>,
    },
    Pending {
        response: oneshot::Sender<Vec<TaskKey>>,
    },
    Shutdown,
}

/// A failed run waiting to be re-armed
#[derive(Debug)]
struct Retry {
    task: Task,
    attempt: u32,
}

struct Entry {
    task: Task,
    slot: (Instant, u64),
    attempt: u32,
}

/// Handle for talking to a running [`TimerQueue`]
#[derive(Clone)]
pub struct TimerHandle {
    sender: mpsc::Sender<TimerMessage>,
}

impl TimerHandle {
    /// Keys of every armed task, in no particular order
    pub async fn pending(&self) -> SchedulerResult<Vec<TaskKey>> {
        let (response, rx) = oneshot::channel();
        self.send(TimerMessage::Pending { response }).await?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }

    /// Stop the actor; armed tasks are dropped
    pub async fn shutdown(&self) {
        let _ = self.sender.send(TimerMessage::Shutdown).await;
    }

    async fn send(&self, message: TimerMessage) -> SchedulerResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| SchedulerError::Closed)
    }
}

#[async_trait]
impl TaskQueue for TimerHandle {
    async fn schedule(
        &self,
        task: Task,
        delay: Duration,
        mode: ScheduleMode,
    ) -> SchedulerResult<ScheduleOutcome> {
        let (response, rx) = oneshot::channel();
        self.send(TimerMessage::Schedule {
            task,
            delay,
            mode,
            response,
        })
        .await?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }

    async fn cancel(&self, key: &TaskKey) -> SchedulerResult<bool> {
        let (response, rx) = oneshot::channel();
        self.send(TimerMessage::Cancel {
            key: key.clone(),
            response,
        })
        .await?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }
}

/// In-process timer actor
///
/// Owns every armed task. Due tasks are handed to the [`TaskHandler`] on
/// their own tokio task so a slow callback never delays other timers; a
/// transient failure is re-armed with backoff unless a newer task with the
/// same key was armed meanwhile.
pub struct TimerQueue {
    inbox: mpsc::Receiver<TimerMessage>,
    retry_tx: mpsc::UnboundedSender<Retry>,
    retry_rx: mpsc::UnboundedReceiver<Retry>,
    entries: HashMap<TaskKey, Entry>,
    deadlines: BTreeMap<(Instant, u64), TaskKey>,
    sequence: u64,
    policy: RetryPolicy,
}

impl TimerQueue {
    /// Create a new timer actor
    ///
    /// # Returns
    ///
    /// * `(TimerQueue, TimerHandle)` - Actor to spawn and handle for scheduling
    pub fn new(policy: RetryPolicy) -> (Self, TimerHandle) {
        let (sender, inbox) = mpsc::channel(1024);
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();

        let actor = Self {
            inbox,
            retry_tx,
            retry_rx,
            entries: HashMap::new(),
            deadlines: BTreeMap::new(),
            sequence: 0,
            policy,
        };

        (actor, TimerHandle { sender })
    }

    /// Run the actor event loop until shutdown or every handle is dropped
    pub async fn run(mut self, handler: Arc<dyn TaskHandler>) {
        log::info!("Timer queue starting");

        loop {
            let next = self.deadlines.keys().next().map(|(at, _)| *at);
            // Never polled while nothing is armed
            let wake_at = next.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(TimerMessage::Shutdown) | None => break,
                    Some(message) => self.handle_message(message),
                },

                Some(retry) = self.retry_rx.recv() => self.requeue(retry),

                _ = sleep_until(wake_at), if next.is_some() => self.fire_due(&handler),
            }
        }

        log::info!("Timer queue stopped with {} task(s) armed", self.entries.len());
    }

    fn handle_message(&mut self, message: TimerMessage) {
        match message {
            TimerMessage::Schedule {
                task,
                delay,
                mode,
                response,
            } => {
                let outcome = self.arm(task, delay, mode, 1);
                let _ = response.send(outcome);
            }

            TimerMessage::Cancel { key, response } => {
                let removed = self.disarm(&key);
                let _ = response.send(removed);
            }

            TimerMessage::Pending { response } => {
                let _ = response.send(self.entries.keys().cloned().collect());
            }

            // Handled by the run loop
            TimerMessage::Shutdown => {}
        }
    }

    fn arm(&mut self, task: Task, delay: Duration, mode: ScheduleMode, attempt: u32) -> ScheduleOutcome {
        let key = task.key();
        let outcome = match (self.entries.contains_key(&key), mode) {
            (true, ScheduleMode::KeepExisting) => return ScheduleOutcome::Coalesced,
            (true, ScheduleMode::Replace) => {
                self.disarm(&key);
                ScheduleOutcome::Rescheduled
            }
            (false, _) => ScheduleOutcome::Armed,
        };

        self.sequence += 1;
        let slot = (Instant::now() + delay, self.sequence);
        self.deadlines.insert(slot, key.clone());
        self.entries.insert(
            key,
            Entry {
                task,
                slot,
                attempt,
            },
        );
        outcome
    }

    fn disarm(&mut self, key: &TaskKey) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.deadlines.remove(&entry.slot);
                true
            }
            None => false,
        }
    }

    fn requeue(&mut self, retry: Retry) {
        let key = retry.task.key();
        if self.entries.contains_key(&key) {
            log::debug!("Dropping retry of {key}: a newer task is armed");
            return;
        }
        let delay = self.policy.backoff(retry.attempt - 1);
        log::info!("Retrying {key} in {delay:?} (attempt {})", retry.attempt);
        self.arm(retry.task, delay, ScheduleMode::KeepExisting, retry.attempt);
    }

    fn fire_due(&mut self, handler: &Arc<dyn TaskHandler>) {
        let now = Instant::now();
        while let Some((&slot, _)) = self.deadlines.first_key_value() {
            if slot.0 > now {
                break;
            }
            let Some(key) = self.deadlines.remove(&slot) else {
                break;
            };
            let Some(entry) = self.entries.remove(&key) else {
                continue;
            };
            self.dispatch(entry, handler.clone());
        }
    }

    fn dispatch(&self, entry: Entry, handler: Arc<dyn TaskHandler>) {
        let retry_tx = self.retry_tx.clone();
        let max_attempts = self.policy.max_attempts;

        tokio::spawn(async move {
            let key = entry.task.key();
            match handler.handle(entry.task.clone()).await {
                Ok(()) => log::debug!("Task {key} done"),
                Err(e) if e.is_transient() && entry.attempt < max_attempts => {
                    log::warn!("Task {key} failed on attempt {}: {e}", entry.attempt);
                    let _ = retry_tx.send(Retry {
                        task: entry.task,
                        attempt: entry.attempt + 1,
                    });
                }
                Err(e) => {
                    log::error!("Task {key} abandoned after {} attempt(s): {e}", entry.attempt);
                }
            }
        });
    }
}

/// Spawn a timer actor bound to `handler` and return its handle
pub fn spawn_timer_queue(policy: RetryPolicy, handler: Arc<dyn TaskHandler>) -> TimerHandle {
    let (queue, handle) = TimerQueue::new(policy);
    tokio::spawn(queue.run(handler));
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::errors::TaskError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Task>>,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl TaskHandler for Recorder {
        async fn handle(&self, task: Task) -> Result<(), TaskError> {
            self.calls.lock().await.push(task);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(TaskError::Transient("store hiccup".to_string()));
            }
            Ok(())
        }
    }

    fn expire_task() -> Task {
        Task::ExpireSession {
            session_id: Uuid::new_v4(),
        }
    }

    fn start(recorder: Arc<Recorder>) -> TimerHandle {
        spawn_timer_queue(RetryPolicy::default(), recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_fires_after_delay() {
        let recorder = Arc::new(Recorder::default());
        let handle = start(recorder.clone());
        let task = expire_task();

        let outcome = handle
            .schedule(task.clone(), Duration::from_secs(10), ScheduleMode::Replace)
            .await
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::Armed);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(recorder.calls.lock().await.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*recorder.calls.lock().await, vec![task]);
        assert!(handle.pending().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_existing_coalesces() {
        let recorder = Arc::new(Recorder::default());
        let handle = start(recorder.clone());
        let task = Task::RunMatching {
            user_id: 1,
            session_id: Uuid::new_v4(),
        };

        handle
            .schedule(task.clone(), Duration::from_secs(5), ScheduleMode::KeepExisting)
            .await
            .unwrap();
        let second = handle
            .schedule(task.clone(), Duration::from_secs(1), ScheduleMode::KeepExisting)
            .await
            .unwrap();
        assert_eq!(second, ScheduleOutcome::Coalesced);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(recorder.calls.lock().await.is_empty(), "earlier trigger kept");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(recorder.calls.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_reschedules() {
        let recorder = Arc::new(Recorder::default());
        let handle = start(recorder.clone());
        let task = expire_task();

        handle
            .schedule(task.clone(), Duration::from_secs(10), ScheduleMode::Replace)
            .await
            .unwrap();
        let outcome = handle
            .schedule(task.clone(), Duration::from_secs(30), ScheduleMode::Replace)
            .await
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::Rescheduled);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(recorder.calls.lock().await.is_empty());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(recorder.calls.lock().await.len(), 1, "no stacked timers");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let recorder = Arc::new(Recorder::default());
        let handle = start(recorder.clone());
        let task = expire_task();

        handle
            .schedule(task.clone(), Duration::from_secs(10), ScheduleMode::Replace)
            .await
            .unwrap();
        assert!(handle.cancel(&task.key()).await.unwrap());
        assert!(!handle.cancel(&task.key()).await.unwrap());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(recorder.calls.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let recorder = Arc::new(Recorder {
            failures_left: AtomicU32::new(2),
            ..Default::default()
        });
        let handle = start(recorder.clone());

        handle
            .schedule(expire_task(), Duration::from_secs(1), ScheduleMode::Replace)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.calls.lock().await.len(), 3);
        assert!(handle.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_noop_queue_reports_unavailable() {
        let queue = NoopTaskQueue;
        let err = queue
            .schedule(expire_task(), Duration::from_secs(1), ScheduleMode::Replace)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Unavailable(_)));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(20), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_closed_queue_reports_closed() {
        let (queue, handle) = TimerQueue::new(RetryPolicy::default());
        drop(queue);
        let err = handle
            .schedule(expire_task(), Duration::from_secs(1), ScheduleMode::Replace)
            .await
            .unwrap_err();
        assert_eq!(err, SchedulerError::Closed);
    }
}
