//! Order creation, lifecycle rules and queries.

mod aggregate;
mod commands;
mod number;
mod service;
mod state;

pub use aggregate::{OrderAggregator, PricedLine, order_total};
pub use commands::{CreateOrder, MarkEmailed, RequestedItem, SubmitOrder};
pub use number::{InvalidOrderNumber, OrderNumber};
pub use service::{OrderDetails, OrderDocument, OrderService};
pub use state::OrderTransition;

use common::{FactoryId, OrderId, OrderStatus, VariantId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// A referenced catalog record does not exist.
    #[error("{entity} not found: {id}")]
    ReferenceNotFound { entity: &'static str, id: String },

    /// No price could be resolved for a variant.
    #[error("No price found for variant {variant_id}")]
    PriceUnavailable { variant_id: VariantId },

    /// Resolved prices disagree on currency.
    #[error("Currency mismatch: order is in {expected}, variant {variant_id} is priced in {found}")]
    CurrencyMismatch {
        variant_id: VariantId,
        expected: String,
        found: String,
    },

    /// Invalid quantity.
    #[error("Invalid quantity for variant {variant_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { variant_id: VariantId, quantity: u32 },

    /// The order is not in a state that allows the requested transition.
    #[error("Invalid state transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Order has no items.
    #[error("Order must have at least one item")]
    EmptyOrder,

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No document has been stored for the order yet.
    #[error("Document not yet generated for order {0}")]
    DocumentNotReady(OrderId),
}

impl OrderError {
    pub(crate) fn factory_not_found(id: FactoryId) -> Self {
        OrderError::ReferenceNotFound {
            entity: "Factory",
            id: id.to_string(),
        }
    }
}
