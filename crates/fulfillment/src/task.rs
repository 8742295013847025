//! Fulfillment task payload, scheduling options and outcomes.

use std::time::Duration;

use common::{DeliveryJobId, OrderId};
use serde::{Deserialize, Serialize};

/// Kind of the one task this pipeline schedules.
pub const SEND_ORDER_EMAIL: &str = "send-order-email";

/// Delivery attempts allowed per job unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First retry delay unless configured otherwise.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(5);

const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Payload of a `send-order-email` task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentTask {
    pub order_id: OrderId,
    pub job_id: DeliveryJobId,
}

impl FulfillmentTask {
    pub fn new(order_id: OrderId, job_id: DeliveryJobId) -> Self {
        Self { order_id, job_id }
    }

    /// Queue key. One live task per delivery job.
    pub fn key(&self) -> String {
        format!("{SEND_ORDER_EMAIL}:{}", self.job_id)
    }

    /// Key handed to the notifier so that a redelivered message is
    /// recognised as the same message.
    pub fn idempotency_key(&self) -> String {
        format!("order-email-{}", self.job_id)
    }
}

/// Exponential backoff: `initial × 2^(attempt − 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn exponential(initial: Duration) -> Self {
        Self {
            initial,
            max: DEFAULT_MAX_BACKOFF.max(initial),
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Delay before the retry that follows the given (1-based) attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_INITIAL_BACKOFF)
    }
}

/// Scheduling options passed with every enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl TaskOptions {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, BackoffPolicy::default())
    }
}

/// What the consumer should do with a task after handling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The job was delivered.
    Completed,
    /// The attempt failed and the job has attempts left.
    Retry { after: Duration },
    /// The attempt failed and the job is now `Failed`.
    Exhausted,
    /// Nothing to do, or a fatal condition. Never retried.
    Discarded,
}

impl TaskOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskOutcome::Retry { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_five_seconds() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(20));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(5))
            .with_max(Duration::from_secs(12));
        assert_eq!(policy.delay_for(3), Duration::from_secs(12));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(12));
    }

    #[test]
    fn zero_backoff_stays_zero() {
        let policy = BackoffPolicy::exponential(Duration::ZERO);
        assert_eq!(policy.delay_for(3), Duration::ZERO);
    }

    #[test]
    fn keys_derive_from_job_id() {
        let task = FulfillmentTask::new(OrderId::new(), DeliveryJobId::new());
        assert_eq!(task.key(), format!("send-order-email:{}", task.job_id));
        assert_eq!(
            task.idempotency_key(),
            format!("order-email-{}", task.job_id)
        );
    }

    #[test]
    fn payload_roundtrips_through_json() {
        let task = FulfillmentTask::new(OrderId::new(), DeliveryJobId::new());
        let json = serde_json::to_value(task).unwrap();
        assert!(json.get("order_id").is_some());
        assert_eq!(serde_json::from_value::<FulfillmentTask>(json).unwrap(), task);
    }

    #[test]
    fn options_need_at_least_one_attempt() {
        assert_eq!(TaskOptions::new(0, BackoffPolicy::default()).max_attempts, 1);
        assert_eq!(TaskOptions::default().max_attempts, 3);
    }
}
