//! Fulfillment error types.

use std::time::Duration;

use catalog::StoreError;
use common::{DeliveryJobId, OrderId};
use domain::DomainError;
use thiserror::Error;

/// Errors raised by a task queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A task payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The queue no longer holds the task being acknowledged.
    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

/// Errors raised while producing an order document.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rendering did not finish within the hard timeout.
    #[error("Rendering timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rendering failed: {0}")]
    Failed(String),
}

/// Errors raised while delivering a message to a factory.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The relay could not be reached.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with a non-success status.
    #[error("Mail relay rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Delivery did not finish within the hard timeout.
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Errors that can occur during fulfillment operations.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// An order rule was violated or the store failed underneath it.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// An error occurred in the catalog store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An error occurred in the task queue.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// The order a task refers to no longer exists.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The delivery job a task refers to no longer exists.
    #[error("Delivery job not found: {0}")]
    JobNotFound(DeliveryJobId),
}

/// Result type for fulfillment operations.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
