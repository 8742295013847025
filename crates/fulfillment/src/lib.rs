//! Order delivery pipeline.
//!
//! Submitting an order records a delivery job and enqueues a
//! `send-order-email` task. Consumers pull tasks and hand them to the
//! [`FulfillmentWorker`], which renders the order document, notifies the
//! factory and retries failed attempts with exponential backoff up to the
//! job's attempt bound. The [`Reconciler`] repairs jobs stranded by crashes.

pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod queue;
pub mod reconciler;
pub mod services;
pub mod task;
pub mod worker;

pub use consumer::{ConsumerConfig, TaskConsumer};
pub use dispatcher::{FulfillmentDispatcher, SubmissionReceipt};
pub use error::{DeliveryError, FulfillmentError, QueueError, RenderError, Result};
pub use queue::{InMemoryTaskQueue, PostgresTaskQueue, QueuedTask, TaskQueue, TaskState};
pub use reconciler::{Reconciler, SweepReport};
pub use services::{
    DocumentRenderer, FileDocumentRenderer, HttpMailNotifier, InMemoryDocumentRenderer,
    InMemoryNotifier, LoggingNotifier, Notifier, OrderMessage,
};
pub use task::{BackoffPolicy, FulfillmentTask, SEND_ORDER_EMAIL, TaskOptions, TaskOutcome};
pub use worker::{FulfillmentWorker, WorkerConfig};
