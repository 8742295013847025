//! Task queue contract and backends.

mod memory;
mod postgres;

pub use memory::InMemoryTaskQueue;
pub use postgres::PostgresTaskQueue;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueError;
use crate::task::{BackoffPolicy, FulfillmentTask, TaskOptions};

/// How long a dequeued task stays invisible to other consumers.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(5 * 60);

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Completed,
    Discarded,
}

impl TaskState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "QUEUED",
            TaskState::Completed => "COMPLETED",
            TaskState::Discarded => "DISCARDED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(TaskState::Queued),
            "COMPLETED" => Some(TaskState::Completed),
            "DISCARDED" => Some(TaskState::Discarded),
            _ => None,
        }
    }
}

/// A task handed out by [`TaskQueue::dequeue`], leased to one consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTask {
    pub id: Uuid,
    pub key: String,
    pub task: FulfillmentTask,
    /// Deliveries of this task so far, including the current one.
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl QueuedTask {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// At-least-once task queue.
///
/// `enqueue` is idempotent per task key: while a task with the same key is
/// queued, enqueueing again is a no-op. A finished task with the same key is
/// revived.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Schedules a task to run now. Returns false if a live task with the
    /// same key already exists.
    async fn enqueue(
        &self,
        task: FulfillmentTask,
        options: TaskOptions,
    ) -> Result<bool, QueueError>;

    /// Claims the next due task, if any, and leases it.
    async fn dequeue(&self) -> Result<Option<QueuedTask>, QueueError>;

    async fn complete(&self, task: &QueuedTask) -> Result<(), QueueError>;

    /// Releases the lease and schedules the task again after `delay`.
    async fn retry(&self, task: &QueuedTask, delay: Duration) -> Result<(), QueueError>;

    /// Finishes the task without running it again.
    async fn discard(&self, task: &QueuedTask, reason: &str) -> Result<(), QueueError>;

    /// Waits until new work may be available, at most `timeout`.
    async fn wait_for_work(&self, timeout: Duration) {
        tokio::time::sleep(timeout).await;
    }
}

#[async_trait]
impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    async fn enqueue(
        &self,
        task: FulfillmentTask,
        options: TaskOptions,
    ) -> Result<bool, QueueError> {
        (**self).enqueue(task, options).await
    }

    async fn dequeue(&self) -> Result<Option<QueuedTask>, QueueError> {
        (**self).dequeue().await
    }

    async fn complete(&self, task: &QueuedTask) -> Result<(), QueueError> {
        (**self).complete(task).await
    }

    async fn retry(&self, task: &QueuedTask, delay: Duration) -> Result<(), QueueError> {
        (**self).retry(task, delay).await
    }

    async fn discard(&self, task: &QueuedTask, reason: &str) -> Result<(), QueueError> {
        (**self).discard(task, reason).await
    }

    async fn wait_for_work(&self, timeout: Duration) {
        (**self).wait_for_work(timeout).await
    }
}
