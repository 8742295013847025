//! In-memory task queue for single-process deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use super::{DEFAULT_LEASE, QueuedTask, TaskQueue, TaskState};
use crate::error::QueueError;
use crate::task::{BackoffPolicy, FulfillmentTask, TaskOptions};

#[derive(Debug, Clone)]
struct Entry {
    id: Uuid,
    task: FulfillmentTask,
    state: TaskState,
    attempts: u32,
    max_attempts: u32,
    backoff: BackoffPolicy,
    run_at: Instant,
    locked_until: Option<Instant>,
    last_error: Option<String>,
}

impl Entry {
    fn is_due(&self, now: Instant) -> bool {
        self.state == TaskState::Queued
            && self.run_at <= now
            && self.locked_until.is_none_or(|until| until <= now)
    }
}

/// In-memory task queue.
///
/// Tasks are ordered by due time. Consumers parked in
/// [`TaskQueue::wait_for_work`] are woken on enqueue and retry.
#[derive(Debug, Clone)]
pub struct InMemoryTaskQueue {
    tasks: Arc<Mutex<HashMap<String, Entry>>>,
    notify: Arc<Notify>,
    lease: Duration,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self {
            tasks: Arc::default(),
            notify: Arc::default(),
            lease: DEFAULT_LEASE,
        }
    }
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub async fn state_of(&self, key: &str) -> Option<TaskState> {
        self.tasks.lock().await.get(key).map(|e| e.state)
    }

    pub async fn last_error(&self, key: &str) -> Option<String> {
        self.tasks
            .lock()
            .await
            .get(key)
            .and_then(|e| e.last_error.clone())
    }

    /// Number of tasks still waiting to run, leased or not.
    pub async fn queued_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|e| e.state == TaskState::Queued)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Applies `f` to the entry a leased task came from.
    async fn with_entry<F>(&self, task: &QueuedTask, f: F) -> Result<(), QueueError>
    where
        F: FnOnce(&mut Entry),
    {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks
            .get_mut(&task.key)
            .filter(|e| e.id == task.id)
            .ok_or_else(|| QueueError::TaskNotFound(task.key.clone()))?;
        f(entry);
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: FulfillmentTask, options: TaskOptions) -> Result<bool, QueueError> {
        let key = task.key();
        let now = Instant::now();
        let mut tasks = self.tasks.lock().await;

        let scheduled = match tasks.get_mut(&key) {
            Some(entry) if entry.state == TaskState::Queued => false,
            Some(entry) => {
                entry.task = task;
                entry.state = TaskState::Queued;
                entry.attempts = 0;
                entry.max_attempts = options.max_attempts;
                entry.backoff = options.backoff;
                entry.run_at = now;
                entry.locked_until = None;
                entry.last_error = None;
                true
            }
            None => {
                tasks.insert(
                    key.clone(),
                    Entry {
                        id: Uuid::new_v4(),
                        task,
                        state: TaskState::Queued,
                        attempts: 0,
                        max_attempts: options.max_attempts,
                        backoff: options.backoff,
                        run_at: now,
                        locked_until: None,
                        last_error: None,
                    },
                );
                true
            }
        };
        drop(tasks);

        if scheduled {
            tracing::debug!(task_key = %key, "task enqueued");
            self.notify.notify_one();
        }
        Ok(scheduled)
    }

    async fn dequeue(&self) -> Result<Option<QueuedTask>, QueueError> {
        let now = Instant::now();
        let mut tasks = self.tasks.lock().await;

        let Some((key, entry)) = tasks
            .iter_mut()
            .filter(|(_, e)| e.is_due(now))
            .min_by_key(|(_, e)| e.run_at)
        else {
            return Ok(None);
        };

        entry.attempts += 1;
        entry.locked_until = Some(now + self.lease);

        Ok(Some(QueuedTask {
            id: entry.id,
            key: key.clone(),
            task: entry.task,
            attempts: entry.attempts,
            max_attempts: entry.max_attempts,
            backoff: entry.backoff,
        }))
    }

    async fn complete(&self, task: &QueuedTask) -> Result<(), QueueError> {
        self.with_entry(task, |e| {
            e.state = TaskState::Completed;
            e.locked_until = None;
        })
        .await
    }

    async fn retry(&self, task: &QueuedTask, delay: Duration) -> Result<(), QueueError> {
        self.with_entry(task, |e| {
            e.run_at = Instant::now() + delay;
            e.locked_until = None;
        })
        .await?;
        self.notify.notify_one();
        Ok(())
    }

    async fn discard(&self, task: &QueuedTask, reason: &str) -> Result<(), QueueError> {
        self.with_entry(task, |e| {
            e.state = TaskState::Discarded;
            e.locked_until = None;
            e.last_error = Some(reason.to_string());
        })
        .await
    }

    async fn wait_for_work(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

#[cfg(test)]
mod tests {
    use common::{DeliveryJobId, OrderId};

    use super::*;

    fn task() -> FulfillmentTask {
        FulfillmentTask::new(OrderId::new(), DeliveryJobId::new())
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_while_queued() {
        let queue = InMemoryTaskQueue::new();
        let t = task();

        assert!(queue.enqueue(t, TaskOptions::default()).await.unwrap());
        assert!(!queue.enqueue(t, TaskOptions::default()).await.unwrap());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn dequeue_leases_the_task() {
        let queue = InMemoryTaskQueue::new();
        let t = task();
        queue.enqueue(t, TaskOptions::default()).await.unwrap();

        let leased = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(leased.task, t);
        assert_eq!(leased.attempts, 1);
        assert_eq!(leased.key, t.key());

        // Leased tasks are invisible to other consumers.
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_is_redelivered() {
        let queue = InMemoryTaskQueue::new().with_lease(Duration::from_secs(10));
        queue.enqueue(task(), TaskOptions::default()).await.unwrap();

        queue.dequeue().await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        let again = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_for_delay() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue(task(), TaskOptions::default()).await.unwrap();

        let leased = queue.dequeue().await.unwrap().unwrap();
        queue.retry(&leased, Duration::from_secs(5)).await.unwrap();
        assert!(queue.dequeue().await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(queue.dequeue().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn finished_task_can_be_revived() {
        let queue = InMemoryTaskQueue::new();
        let t = task();
        queue.enqueue(t, TaskOptions::default()).await.unwrap();

        let leased = queue.dequeue().await.unwrap().unwrap();
        queue.discard(&leased, "job already finished").await.unwrap();
        assert_eq!(queue.state_of(&t.key()).await, Some(TaskState::Discarded));
        assert_eq!(
            queue.last_error(&t.key()).await.as_deref(),
            Some("job already finished")
        );

        assert!(queue.enqueue(t, TaskOptions::default()).await.unwrap());
        let revived = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(revived.attempts, 1);
    }

    #[tokio::test]
    async fn completed_tasks_are_not_dequeued() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue(task(), TaskOptions::default()).await.unwrap();

        let leased = queue.dequeue().await.unwrap().unwrap();
        queue.complete(&leased).await.unwrap();

        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.queued_count().await, 0);
    }

    #[tokio::test]
    async fn enqueue_wakes_waiting_consumer() {
        let queue = InMemoryTaskQueue::new();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_for_work(Duration::from_secs(30)).await })
        };

        queue.enqueue(task(), TaskOptions::default()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
