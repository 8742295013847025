//! PostgreSQL task queue tests
//!
//! These tests share one PostgreSQL container and truncate the task table
//! before each test, so they run serially. Run with:
//!
//! ```bash
//! cargo test -p fulfillment --test postgres_queue
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{DeliveryJobId, OrderId};
use fulfillment::{
    BackoffPolicy, FulfillmentTask, PostgresTaskQueue, TaskOptions, TaskQueue, TaskState,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_fulfillment_tasks.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_queue() -> PostgresTaskQueue {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE fulfillment_tasks")
        .execute(&pool)
        .await
        .unwrap();

    PostgresTaskQueue::new(pool)
}

fn task() -> FulfillmentTask {
    FulfillmentTask::new(OrderId::new(), DeliveryJobId::new())
}

fn options() -> TaskOptions {
    TaskOptions::new(3, BackoffPolicy::exponential(Duration::from_millis(250)))
}

#[tokio::test]
#[serial]
async fn test_enqueue_is_deduplicated_by_key() {
    let queue = get_test_queue().await;
    let task = task();

    assert!(queue.enqueue(task, options()).await.unwrap());
    assert!(!queue.enqueue(task, options()).await.unwrap());

    let leased = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(leased.task, task);
    assert_eq!(leased.key, task.key());
    assert_eq!(leased.attempts, 1);
    assert_eq!(leased.max_attempts, 3);
    assert!(queue.dequeue().await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_complete_and_revive() {
    let queue = get_test_queue().await;
    let task = task();
    queue.enqueue(task, options()).await.unwrap();

    let leased = queue.dequeue().await.unwrap().unwrap();
    queue.complete(&leased).await.unwrap();
    assert_eq!(
        queue.state_of(&task.key()).await.unwrap(),
        Some(TaskState::Completed)
    );

    // A finished task can be scheduled again under the same key.
    assert!(queue.enqueue(task, options()).await.unwrap());
    let again = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(again.id, leased.id);
    assert_eq!(again.attempts, 1);
}

#[tokio::test]
#[serial]
async fn test_retry_delays_task() {
    let queue = get_test_queue().await;
    queue.enqueue(task(), options()).await.unwrap();

    let leased = queue.dequeue().await.unwrap().unwrap();
    queue.retry(&leased, Duration::from_millis(300)).await.unwrap();
    assert!(queue.dequeue().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let retried = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(retried.id, leased.id);
    assert_eq!(retried.attempts, 2);
}

#[tokio::test]
#[serial]
async fn test_discard_records_reason() {
    let queue = get_test_queue().await;
    let task = task();
    queue.enqueue(task, options()).await.unwrap();

    let leased = queue.dequeue().await.unwrap().unwrap();
    queue.discard(&leased, "job not found").await.unwrap();

    assert_eq!(
        queue.state_of(&task.key()).await.unwrap(),
        Some(TaskState::Discarded)
    );
    assert!(queue.dequeue().await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_expired_lease_makes_task_due_again() {
    let queue = get_test_queue()
        .await
        .with_lease(Duration::from_millis(200));
    queue.enqueue(task(), options()).await.unwrap();

    let first = queue.dequeue().await.unwrap().unwrap();
    assert!(queue.dequeue().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let second = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.attempts, 2);
}

#[tokio::test]
#[serial]
async fn test_concurrent_dequeue_hands_out_each_task_once() {
    let queue = get_test_queue().await;
    for _ in 0..10 {
        queue.enqueue(task(), options()).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            while let Some(task) = queue.dequeue().await.unwrap() {
                ids.push(task.id);
            }
            ids
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 10);
}

#[tokio::test]
#[serial]
async fn test_unknown_task_cannot_be_completed() {
    let queue = get_test_queue().await;
    queue.enqueue(task(), options()).await.unwrap();
    let mut leased = queue.dequeue().await.unwrap().unwrap();
    leased.id = uuid::Uuid::new_v4();

    assert!(queue.complete(&leased).await.is_err());
}
