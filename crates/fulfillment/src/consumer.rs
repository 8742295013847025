//! Consumer loop driving the fulfillment worker from a task queue.

use std::sync::Arc;
use std::time::Duration;

use catalog::CatalogStore;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::error::Result;
use crate::queue::{QueuedTask, TaskQueue};
use crate::services::{DocumentRenderer, Notifier};
use crate::task::TaskOutcome;
use crate::worker::FulfillmentWorker;

#[derive(Debug, Clone, Copy)]
pub struct ConsumerConfig {
    /// Tasks handled at the same time.
    pub concurrency: usize,
    /// Longest wait between polls when the queue is idle.
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Pulls tasks from the queue and hands them to the worker.
pub struct TaskConsumer<Q, S, R, N>
where
    Q: TaskQueue,
    S: CatalogStore,
    R: DocumentRenderer,
    N: Notifier,
{
    queue: Q,
    worker: Arc<FulfillmentWorker<S, R, N>>,
    config: ConsumerConfig,
}

impl<Q, S, R, N> TaskConsumer<Q, S, R, N>
where
    Q: TaskQueue + Clone + 'static,
    S: CatalogStore + Clone + 'static,
    R: DocumentRenderer + 'static,
    N: Notifier + 'static,
{
    pub fn new(queue: Q, worker: FulfillmentWorker<S, R, N>, config: ConsumerConfig) -> Self {
        Self {
            queue,
            worker: Arc::new(worker),
            config,
        }
    }

    /// Claims and handles one due task. Returns false if none was due.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(task) = self.queue.dequeue().await? else {
            return Ok(false);
        };
        process(&self.queue, &self.worker, task).await?;
        Ok(true)
    }

    /// Handles due tasks until none is left. Returns how many were handled.
    pub async fn drain(&self) -> Result<usize> {
        let mut handled = 0;
        while self.process_next().await? {
            handled += 1;
        }
        Ok(handled)
    }

    /// Runs `concurrency` consumer loops until `shutdown` flips to true.
    ///
    /// A loop finishes the task in hand before it stops.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut loops = JoinSet::new();
        for slot in 0..self.config.concurrency.max(1) {
            let queue = self.queue.clone();
            let worker = Arc::clone(&self.worker);
            let shutdown = shutdown.clone();
            let poll_interval = self.config.poll_interval;
            loops.spawn(async move {
                consume(slot, queue, worker, poll_interval, shutdown).await;
            });
        }

        tracing::info!(concurrency = self.config.concurrency, "task consumer started");
        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "consumer loop panicked");
            }
        }
        tracing::info!("task consumer stopped");
    }
}

async fn consume<Q, S, R, N>(
    slot: usize,
    queue: Q,
    worker: Arc<FulfillmentWorker<S, R, N>>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    Q: TaskQueue,
    S: CatalogStore + Clone,
    R: DocumentRenderer,
    N: Notifier,
{
    while !*shutdown.borrow() {
        let idle = match queue.dequeue().await {
            Ok(Some(task)) => {
                if let Err(e) = process(&queue, &worker, task).await {
                    tracing::error!(slot, error = %e, "failed to acknowledge task");
                }
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::error!(slot, error = %e, "failed to dequeue task");
                true
            }
        };

        if idle {
            tokio::select! {
                _ = queue.wait_for_work(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Runs the worker on a leased task and acknowledges the outcome.
async fn process<Q, S, R, N>(
    queue: &Q,
    worker: &FulfillmentWorker<S, R, N>,
    task: QueuedTask,
) -> Result<()>
where
    Q: TaskQueue,
    S: CatalogStore + Clone,
    R: DocumentRenderer,
    N: Notifier,
{
    match worker.handle(&task.task).await {
        Ok(TaskOutcome::Completed) | Ok(TaskOutcome::Exhausted) => queue.complete(&task).await?,
        Ok(TaskOutcome::Discarded) => queue.discard(&task, "discarded by worker").await?,
        Ok(TaskOutcome::Retry { after }) => queue.retry(&task, after).await?,
        Err(e) if task.attempts_exhausted() => {
            tracing::error!(task_key = %task.key, error = %e, "task failed, attempts exhausted");
            queue.discard(&task, &e.to_string()).await?;
        }
        Err(e) => {
            let after = task.backoff.delay_for(task.attempts);
            tracing::warn!(
                task_key = %task.key,
                attempt = task.attempts,
                error = %e,
                "task failed, will retry"
            );
            queue.retry(&task, after).await?;
        }
    }
    Ok(())
}
