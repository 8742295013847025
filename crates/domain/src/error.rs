//! Domain error types.

use catalog::StoreError;
use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the catalog store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An order rule was violated.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns the order rule violation, if this is one.
    pub fn as_order_error(&self) -> Option<&OrderError> {
        match self {
            DomainError::Order(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
