//! Domain layer for the order platform.
//!
//! This crate provides:
//! - Price resolution against price lists
//! - Order assembly with exact line and order totals
//! - The order lifecycle (Draft → Submitted → Emailed)
//! - The audit recorder
//! - Order queries used by the HTTP layer

pub mod audit;
pub mod error;
pub mod order;
pub mod pricing;

pub use audit::{AuditRecorder, ORDER_ENTITY};
pub use error::{DomainError, Result};
pub use order::{
    CreateOrder, InvalidOrderNumber, MarkEmailed, OrderAggregator, OrderDetails, OrderDocument,
    OrderError, OrderNumber, OrderService, OrderTransition, PricedLine, RequestedItem, SubmitOrder,
    order_total,
};
pub use pricing::{PriceResolver, ResolvedPrice};
