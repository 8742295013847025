//! PostgreSQL task queue shared by workers in several processes.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{DEFAULT_LEASE, QueuedTask, TaskQueue, TaskState};
use crate::error::QueueError;
use crate::task::{BackoffPolicy, FulfillmentTask, SEND_ORDER_EMAIL, TaskOptions};

/// Task queue stored in the `fulfillment_tasks` table.
///
/// Claiming uses `FOR UPDATE SKIP LOCKED`, so concurrent consumers never
/// receive the same task. A claimed task carries a lease (`locked_until`);
/// if its consumer dies the task becomes due again once the lease expires.
#[derive(Clone)]
pub struct PostgresTaskQueue {
    pool: PgPool,
    lease: Duration,
}

impl PostgresTaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Returns the state of the task with the given key.
    pub async fn state_of(&self, key: &str) -> Result<Option<TaskState>, QueueError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM fulfillment_tasks WHERE task_key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status.as_deref().and_then(TaskState::from_db_str))
    }

    fn row_to_task(row: PgRow) -> Result<QueuedTask, QueueError> {
        let payload: serde_json::Value = row.try_get("payload")?;
        let attempts: i32 = row.try_get("attempts")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;
        let backoff_ms: i64 = row.try_get("backoff_ms")?;

        Ok(QueuedTask {
            id: row.try_get("id")?,
            key: row.try_get("task_key")?,
            task: serde_json::from_value(payload)?,
            attempts: u32::try_from(attempts).unwrap_or_default(),
            max_attempts: u32::try_from(max_attempts).unwrap_or(1),
            backoff: BackoffPolicy::exponential(Duration::from_millis(
                u64::try_from(backoff_ms).unwrap_or_default(),
            )),
        })
    }

    async fn finish(
        &self,
        task: &QueuedTask,
        state: TaskState,
        reason: Option<&str>,
    ) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE fulfillment_tasks
            SET status = $2,
                locked_until = NULL,
                last_error = COALESCE($3, last_error),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(state.as_db_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::TaskNotFound(task.key.clone()));
        }
        Ok(())
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl TaskQueue for PostgresTaskQueue {
    async fn enqueue(&self, task: FulfillmentTask, options: TaskOptions) -> Result<bool, QueueError> {
        let key = task.key();
        // Revives a finished task with the same key; leaves a queued one alone.
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO fulfillment_tasks
                (id, task_key, kind, payload, status, attempts, max_attempts, backoff_ms, run_at)
            VALUES ($1, $2, $3, $4, 'QUEUED', 0, $5, $6, NOW())
            ON CONFLICT (task_key) DO UPDATE
            SET payload = EXCLUDED.payload,
                status = 'QUEUED',
                attempts = 0,
                max_attempts = EXCLUDED.max_attempts,
                backoff_ms = EXCLUDED.backoff_ms,
                run_at = NOW(),
                locked_until = NULL,
                last_error = NULL,
                updated_at = NOW()
            WHERE fulfillment_tasks.status <> 'QUEUED'
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&key)
        .bind(SEND_ORDER_EMAIL)
        .bind(serde_json::to_value(task)?)
        .bind(i32::try_from(options.max_attempts).unwrap_or(i32::MAX))
        .bind(millis(options.backoff.initial()))
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            tracing::debug!(task_key = %key, "task enqueued");
        }
        Ok(inserted.is_some())
    }

    async fn dequeue(&self) -> Result<Option<QueuedTask>, QueueError> {
        let row = sqlx::query(
            r#"
            UPDATE fulfillment_tasks
            SET attempts = attempts + 1,
                locked_until = NOW() + make_interval(secs => $1),
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM fulfillment_tasks
                WHERE status = 'QUEUED'
                  AND run_at <= NOW()
                  AND (locked_until IS NULL OR locked_until <= NOW())
                ORDER BY run_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, task_key, payload, attempts, max_attempts, backoff_ms
            "#,
        )
        .bind(self.lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_task).transpose()
    }

    async fn complete(&self, task: &QueuedTask) -> Result<(), QueueError> {
        self.finish(task, TaskState::Completed, None).await
    }

    async fn retry(&self, task: &QueuedTask, delay: Duration) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE fulfillment_tasks
            SET run_at = NOW() + make_interval(secs => $2),
                locked_until = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'QUEUED'
            "#,
        )
        .bind(task.id)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::TaskNotFound(task.key.clone()));
        }
        Ok(())
    }

    async fn discard(&self, task: &QueuedTask, reason: &str) -> Result<(), QueueError> {
        self.finish(task, TaskState::Discarded, Some(reason)).await
    }
}
