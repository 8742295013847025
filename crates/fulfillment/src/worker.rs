//! Fulfillment worker: one delivery attempt per task.

use std::time::{Duration, Instant};

use catalog::{CatalogStore, CatalogStoreExt, DeliveryJob, OrderGraph, StoreError};
use chrono::Utc;
use common::{AuditAction, DocumentRef, OrderStatus, UserId};
use domain::{AuditRecorder, DomainError, MarkEmailed, OrderError, OrderService};

use crate::error::{DeliveryError, FulfillmentError, RenderError, Result};
use crate::job;
use crate::services::{DocumentRenderer, Notifier, OrderMessage};
use crate::task::{BackoffPolicy, DEFAULT_INITIAL_BACKOFF, FulfillmentTask, TaskOutcome};

/// Worker tuning.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub render_timeout: Duration,
    pub notify_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            render_timeout: Duration::from_secs(30),
            notify_timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::exponential(DEFAULT_INITIAL_BACKOFF),
        }
    }
}

/// Why an attempt did not deliver.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("order not found")]
    OrderMissing,
    #[error("failed to load order: {0}")]
    Load(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Renders the order document, notifies the factory and records the result.
pub struct FulfillmentWorker<S: CatalogStore, R: DocumentRenderer, N: Notifier> {
    store: S,
    orders: OrderService<S>,
    audit: AuditRecorder<S>,
    renderer: R,
    notifier: N,
    config: WorkerConfig,
}

impl<S, R, N> FulfillmentWorker<S, R, N>
where
    S: CatalogStore + Clone,
    R: DocumentRenderer,
    N: Notifier,
{
    pub fn new(store: S, renderer: R, notifier: N, config: WorkerConfig) -> Self {
        Self {
            orders: OrderService::new(store.clone()),
            audit: AuditRecorder::new(store.clone()),
            store,
            renderer,
            notifier,
            config,
        }
    }

    /// Handles one `send-order-email` task.
    ///
    /// Delivery failures are absorbed into the job and the returned
    /// [`TaskOutcome`]; an `Err` means the store failed while recording
    /// state and the task itself should be retried.
    #[tracing::instrument(skip(self), fields(order_id = %task.order_id, job_id = %task.job_id))]
    pub async fn handle(&self, task: &FulfillmentTask) -> Result<TaskOutcome> {
        let Some(job) = self.store.get_delivery_job(task.job_id).await? else {
            tracing::warn!("delivery job not found, discarding task");
            return Ok(TaskOutcome::Discarded);
        };
        if job.order_id != task.order_id {
            tracing::warn!(job_order_id = %job.order_id, "task does not match its job, discarding");
            return Ok(TaskOutcome::Discarded);
        }
        if job.status.is_terminal() {
            tracing::info!(status = %job.status, "job already finished");
            return Ok(TaskOutcome::Discarded);
        }
        if job.status.is_in_flight() {
            // Another consumer holds the attempt; the sweep takes over if it died.
            tracing::info!(attempt = job.attempts, "attempt already in flight");
            return Ok(TaskOutcome::Discarded);
        }

        let Some(start) = job::start_attempt(&job) else {
            // Pending with no attempts left; only reachable through manual edits.
            let message = "attempts exhausted";
            let updated = self
                .store
                .update_delivery_job(job.id, job.status, job::abandon(&job, message))
                .await?;
            metrics::counter!("fulfillment_failed_total").increment(1);
            tracing::error!(attempt = updated.attempts, "pending job has no attempts left");
            self.record_failure(&updated, message).await;
            return Ok(TaskOutcome::Exhausted);
        };

        let job = match self.store.update_delivery_job(job.id, job.status, start).await {
            Ok(job) => job,
            Err(StoreError::StatusConflict { .. }) => {
                tracing::info!("job claimed by another consumer");
                return Ok(TaskOutcome::Discarded);
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!("fulfillment_attempts_total").increment(1);
        let started = Instant::now();
        tracing::info!(attempt = job.attempts, max_attempts = job.max_attempts, "delivery attempt started");

        let outcome = match self.attempt(task, &job).await {
            Ok((graph, document)) => self.delivered(&job, &graph, document).await,
            Err(AttemptError::OrderMissing) => self.order_vanished(&job).await,
            Err(e) => self.attempt_failed(&job, e).await,
        };

        metrics::histogram!("fulfillment_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    /// Loads the order graph, renders and notifies.
    async fn attempt(
        &self,
        task: &FulfillmentTask,
        job: &DeliveryJob,
    ) -> std::result::Result<(OrderGraph, DocumentRef), AttemptError> {
        let graph = self
            .store
            .load_order_graph(task.order_id)
            .await?
            .ok_or(AttemptError::OrderMissing)?;

        let document = tokio::time::timeout(self.config.render_timeout, self.renderer.render(&graph))
            .await
            .map_err(|_| RenderError::Timeout(self.config.render_timeout))??;

        let message = OrderMessage {
            to: job.recipients.clone(),
            subject: job.subject.clone(),
            document_ref: document.clone(),
            idempotency_key: task.idempotency_key(),
            order_number: graph.order.order_number.clone(),
            organization_name: graph.organization.name.clone(),
            factory_name: graph.factory.name.clone(),
            currency: graph.order.currency.clone(),
            total_amount: graph.order.total_amount,
            item_count: graph.lines.len(),
            notes: graph.order.notes.clone(),
        };

        let sent = tokio::time::timeout(self.config.notify_timeout, self.notifier.send(&message))
            .await
            .map_err(|_| DeliveryError::Timeout(self.config.notify_timeout))
            .and_then(|r| r);
        if let Err(e) = sent {
            if let Err(discard) = self.renderer.discard(&document).await {
                tracing::warn!(document = %document, error = %discard, "failed to discard document");
            }
            return Err(e.into());
        }

        Ok((graph, document))
    }

    async fn delivered(
        &self,
        job: &DeliveryJob,
        graph: &OrderGraph,
        document: DocumentRef,
    ) -> Result<TaskOutcome> {
        let order = &graph.order;
        match self
            .orders
            .mark_emailed(MarkEmailed::new(order.id, document))
            .await
        {
            Ok(_) => {}
            // A redelivered task can find the order already marked by an
            // earlier attempt whose job update was lost.
            Err(DomainError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Emailed,
                ..
            })) => {
                tracing::info!("order already marked emailed");
            }
            Err(e) => return Err(e.into()),
        }
        self.store
            .update_delivery_job(job.id, job.status, job::sent(job, Utc::now()))
            .await?;

        metrics::counter!("fulfillment_sent_total").increment(1);
        tracing::info!(
            order_number = %order.order_number,
            attempt = job.attempts,
            "order delivered to factory"
        );

        self.audit
            .record_order(
                AuditAction::EmailSent,
                order.id,
                order.user_id,
                serde_json::json!({
                    "orderNumber": order.order_number,
                    "factory": graph.factory.name,
                    "sentTo": graph.factory.contact_email,
                }),
            )
            .await;

        Ok(TaskOutcome::Completed)
    }

    async fn attempt_failed(&self, job: &DeliveryJob, error: AttemptError) -> Result<TaskOutcome> {
        let message = error.to_string();
        let updated = self
            .store
            .update_delivery_job(job.id, job.status, job::attempt_failed(job, &message))
            .await?;

        if !updated.status.is_terminal() {
            let after = self.config.backoff.delay_for(updated.attempts);
            metrics::counter!("fulfillment_retries_total").increment(1);
            tracing::warn!(
                attempt = updated.attempts,
                max_attempts = updated.max_attempts,
                retry_in_ms = after.as_millis() as u64,
                error = %message,
                "delivery attempt failed, will retry"
            );
            return Ok(TaskOutcome::Retry { after });
        }

        metrics::counter!("fulfillment_failed_total").increment(1);
        tracing::error!(
            attempt = updated.attempts,
            error = %message,
            "delivery failed, attempts exhausted"
        );

        self.record_failure(&updated, &message).await;
        Ok(TaskOutcome::Exhausted)
    }

    /// Audits a job that ended `Failed`, attributed to the order's creator.
    async fn record_failure(&self, job: &DeliveryJob, message: &str) {
        let (actor, order_number) = match self.store.get_order(job.order_id).await {
            Ok(Some(order)) => (order.user_id, Some(order.order_number)),
            _ => (UserId::system(), None),
        };
        self.audit
            .record_order(
                AuditAction::EmailFailed,
                job.order_id,
                actor,
                serde_json::json!({
                    "orderNumber": order_number,
                    "attempts": job.attempts,
                    "error": message,
                }),
            )
            .await;
    }

    /// The order behind a job is gone: fail the job, never retry.
    async fn order_vanished(&self, job: &DeliveryJob) -> Result<TaskOutcome> {
        let error = FulfillmentError::OrderNotFound(job.order_id).to_string();
        tracing::error!(error = %error, "order vanished, failing delivery job");

        self.store
            .update_delivery_job(job.id, job.status, job::abandon(job, &error))
            .await?;
        metrics::counter!("fulfillment_failed_total").increment(1);

        self.audit
            .record_order(
                AuditAction::EmailFailed,
                job.order_id,
                UserId::system(),
                serde_json::json!({ "attempts": job.attempts, "error": error }),
            )
            .await;

        Ok(TaskOutcome::Discarded)
    }
}
