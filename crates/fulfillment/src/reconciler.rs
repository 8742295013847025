//! Reconciliation sweep for delivery jobs left behind by crashes.

use std::time::Duration;

use catalog::{CatalogStore, DeliveryJob, Order, StoreError};
use chrono::{DateTime, Utc};
use common::{AuditAction, DeliveryJobStatus, UserId};
use domain::AuditRecorder;
use tokio::sync::watch;

use crate::error::Result;
use crate::job;
use crate::queue::TaskQueue;
use crate::task::{FulfillmentTask, TaskOptions};

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Idle `Pending` jobs whose task was scheduled again.
    pub requeued: usize,
    /// Abandoned `Processing` attempts returned to `Pending`.
    pub recovered: usize,
    /// Abandoned `Processing` attempts that used the last attempt.
    pub failed: usize,
    /// `Submitted` orders that had no delivery job.
    pub created: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Repairs the gaps left when a process dies between steps.
///
/// * A `Pending` job idle past the threshold has its task enqueued again.
///   The queue ignores the enqueue while a live task exists.
/// * A `Processing` job idle past the threshold lost its worker mid-attempt.
///   The attempt counts as failed: the job goes back to `Pending` and is
///   enqueued, or becomes `Failed` if it was the last attempt.
/// * A `Submitted` order with no job gets one. The store allows one job
///   per order, so concurrent sweeps create it once.
///
/// `Failed` and `Sent` jobs are never touched.
pub struct Reconciler<S: CatalogStore, Q: TaskQueue> {
    store: S,
    queue: Q,
    audit: AuditRecorder<S>,
    options: TaskOptions,
    stale_after: Duration,
}

impl<S, Q> Reconciler<S, Q>
where
    S: CatalogStore + Clone,
    Q: TaskQueue,
{
    pub fn new(store: S, queue: Q, options: TaskOptions, stale_after: Duration) -> Self {
        Self {
            audit: AuditRecorder::new(store.clone()),
            store,
            queue,
            options,
            stale_after,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let cutoff = chrono::Duration::from_std(self.stale_after)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut report = SweepReport::default();

        for job in self
            .store
            .find_stale_jobs(DeliveryJobStatus::Pending, cutoff)
            .await?
        {
            if self.schedule(&job).await? {
                report.requeued += 1;
            }
        }

        for job in self
            .store
            .find_stale_jobs(DeliveryJobStatus::Processing, cutoff)
            .await?
        {
            match self.recover(&job).await? {
                Some(DeliveryJobStatus::Pending) => report.recovered += 1,
                Some(DeliveryJobStatus::Failed) => report.failed += 1,
                _ => {}
            }
        }

        for order in self.store.find_submitted_orders_without_jobs(cutoff).await? {
            if self.create_missing_job(&order).await? {
                report.created += 1;
            }
        }

        if !report.is_empty() {
            tracing::info!(
                requeued = report.requeued,
                recovered = report.recovered,
                failed = report.failed,
                created = report.created,
                "reconciliation sweep repaired delivery jobs"
            );
        }
        Ok(report)
    }

    /// Sweeps every `interval` until `shutdown` flips to true.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "reconciliation sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::info!("reconciler stopped");
    }

    async fn schedule(&self, job: &DeliveryJob) -> Result<bool> {
        let task = FulfillmentTask::new(job.order_id, job.id);
        Ok(self.queue.enqueue(task, self.options).await?)
    }

    async fn recover(&self, job: &DeliveryJob) -> Result<Option<DeliveryJobStatus>> {
        let update = job::attempt_failed(job, "attempt abandoned by worker");
        let updated = match self
            .store
            .update_delivery_job(job.id, DeliveryJobStatus::Processing, update)
            .await
        {
            Ok(updated) => updated,
            // The worker finished after all.
            Err(StoreError::StatusConflict { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if updated.status == DeliveryJobStatus::Pending {
            tracing::warn!(job_id = %job.id, attempt = job.attempts, "recovered abandoned attempt");
            self.schedule(&updated).await?;
        } else {
            metrics::counter!("fulfillment_failed_total").increment(1);
            tracing::error!(job_id = %job.id, attempt = job.attempts, "abandoned attempt was the last one");
            self.audit
                .record_order(
                    AuditAction::EmailFailed,
                    job.order_id,
                    UserId::system(),
                    serde_json::json!({
                        "attempts": updated.attempts,
                        "error": updated.last_error,
                    }),
                )
                .await;
        }
        Ok(Some(updated.status))
    }

    async fn create_missing_job(&self, order: &Order) -> Result<bool> {
        let Some(factory) = self.store.get_factory(order.factory_id).await? else {
            tracing::error!(
                order_id = %order.id,
                factory_id = %order.factory_id,
                "submitted order references a missing factory"
            );
            return Ok(false);
        };

        let job = match self
            .store
            .insert_delivery_job(job::new_job(order, &factory, self.options.max_attempts))
            .await
        {
            Ok(job) => job,
            // Another sweep got there first.
            Err(StoreError::Duplicate { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        self.schedule(&job).await?;
        tracing::warn!(order_id = %order.id, job_id = %job.id, "created missing delivery job");
        Ok(true)
    }
}
