//! Delivery job transitions.
//!
//! A job moves `Pending → Processing → Sent`, or from `Processing` back to
//! `Pending` while attempts remain, or to `Failed` once they are exhausted.
//! Starting an attempt consumes it, so `attempts` counts attempts begun and
//! never exceeds `max_attempts`.

use catalog::{DeliveryJob, DeliveryJobUpdate, Factory, NewDeliveryJob, Order};
use chrono::{DateTime, Utc};
use common::{DeliveryJobId, DeliveryJobStatus};

/// Subject line of the message sent to the factory.
pub fn subject_for(order_number: &str) -> String {
    format!("New Order: {order_number}")
}

/// A fresh `Pending` job addressed to the factory's contact email.
pub fn new_job(order: &Order, factory: &Factory, max_attempts: u32) -> NewDeliveryJob {
    NewDeliveryJob {
        id: DeliveryJobId::new(),
        order_id: order.id,
        factory_id: factory.id,
        recipients: vec![factory.contact_email.clone()],
        subject: subject_for(&order.order_number),
        max_attempts: max_attempts.max(1),
    }
}

/// `Pending → Processing`, consuming one attempt.
///
/// Returns `None` if the job cannot start another attempt.
pub fn start_attempt(job: &DeliveryJob) -> Option<DeliveryJobUpdate> {
    if !job.status.can_start_attempt() || job.attempts_remaining() == 0 {
        return None;
    }
    Some(DeliveryJobUpdate {
        status: DeliveryJobStatus::Processing,
        attempts: job.attempts + 1,
        last_error: job.last_error.clone(),
        sent_at: None,
    })
}

/// `Processing → Sent`.
pub fn sent(job: &DeliveryJob, at: DateTime<Utc>) -> DeliveryJobUpdate {
    DeliveryJobUpdate {
        status: DeliveryJobStatus::Sent,
        attempts: job.attempts,
        last_error: None,
        sent_at: Some(at),
    }
}

/// Records a failed attempt: back to `Pending` while attempts remain,
/// otherwise `Failed`. The error is kept either way.
pub fn attempt_failed(job: &DeliveryJob, error: impl Into<String>) -> DeliveryJobUpdate {
    let status = if job.attempts < job.max_attempts {
        DeliveryJobStatus::Pending
    } else {
        DeliveryJobStatus::Failed
    };
    DeliveryJobUpdate {
        status,
        attempts: job.attempts,
        last_error: Some(error.into()),
        sent_at: None,
    }
}

/// Fails the job outright, whatever attempts remain.
pub fn abandon(job: &DeliveryJob, error: impl Into<String>) -> DeliveryJobUpdate {
    DeliveryJobUpdate {
        status: DeliveryJobStatus::Failed,
        attempts: job.attempts,
        last_error: Some(error.into()),
        sent_at: None,
    }
}
