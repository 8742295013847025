//! Order submission: status change, delivery job and task scheduling.

use catalog::{CatalogStore, DeliveryJob, Factory, Order, StoreError};
use common::{AuditAction, DeliveryJobId, OrderId, UserId};
use domain::{OrderError, OrderService, SubmitOrder};
use serde::Serialize;

use crate::error::Result;
use crate::job;
use crate::queue::TaskQueue;
use crate::task::{FulfillmentTask, TaskOptions};

/// What a successful submission returns to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub order_id: OrderId,
    pub order_number: String,
    pub job_id: DeliveryJobId,
}

/// Submits orders and schedules their delivery.
pub struct FulfillmentDispatcher<S: CatalogStore, Q: TaskQueue> {
    store: S,
    orders: OrderService<S>,
    queue: Q,
    options: TaskOptions,
}

impl<S, Q> FulfillmentDispatcher<S, Q>
where
    S: CatalogStore + Clone,
    Q: TaskQueue,
{
    pub fn new(store: S, queue: Q, options: TaskOptions) -> Self {
        Self {
            orders: OrderService::new(store.clone()),
            store,
            queue,
            options,
        }
    }

    pub fn options(&self) -> TaskOptions {
        self.options
    }

    /// Submits a draft order.
    ///
    /// The order moves `Draft → Submitted`, a `Pending` delivery job is
    /// recorded and a `send-order-email` task is enqueued. The status change
    /// is conditional, so of two concurrent submissions only one creates a
    /// job. Enqueueing is not atomic with the writes: if it fails the job
    /// stays `Pending` without a task until the reconciliation sweep
    /// schedules it. Likewise, if the job cannot be recorded the order stays
    /// `Submitted` and the sweep creates the job.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn submit(&self, order_id: OrderId, actor_id: UserId) -> Result<SubmissionReceipt> {
        let order = self
            .orders
            .submit_order(SubmitOrder::new(order_id, actor_id))
            .await?;

        let (job, factory) = match self.record_job(&order).await {
            Ok(recorded) => recorded,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "order submitted but its delivery job was not recorded, leaving it to the sweep"
                );
                return Err(e);
            }
        };

        let task = FulfillmentTask::new(order.id, job.id);
        if let Err(e) = self.queue.enqueue(task, self.options).await {
            tracing::warn!(
                job_id = %job.id,
                error = %e,
                "failed to enqueue delivery task, leaving it to the sweep"
            );
        }

        self.orders
            .audit()
            .record_order(
                AuditAction::SubmitOrder,
                order.id,
                actor_id,
                serde_json::json!({
                    "orderNumber": order.order_number,
                    "status": order.status.as_db_str(),
                }),
            )
            .await;

        tracing::info!(
            order_number = %order.order_number,
            job_id = %job.id,
            recipient = %factory.contact_email,
            "order submitted for delivery"
        );

        Ok(SubmissionReceipt {
            order_id: order.id,
            order_number: order.order_number,
            job_id: job.id,
        })
    }

    async fn record_job(&self, order: &Order) -> Result<(DeliveryJob, Factory)> {
        let factory = self.store.get_factory(order.factory_id).await?.ok_or_else(|| {
            domain::DomainError::from(OrderError::ReferenceNotFound {
                entity: "Factory",
                id: order.factory_id.to_string(),
            })
        })?;

        match self
            .store
            .insert_delivery_job(job::new_job(order, &factory, self.options.max_attempts))
            .await
        {
            Ok(job) => Ok((job, factory)),
            // The sweep recorded it between the status change and here.
            Err(StoreError::Duplicate { .. }) => {
                let job = self
                    .store
                    .list_delivery_jobs(order.id)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "delivery job",
                        id: order.id.to_string(),
                    })?;
                Ok((job, factory))
            }
            Err(e) => Err(e.into()),
        }
    }
}
