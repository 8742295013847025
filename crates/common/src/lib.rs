//! Shared vocabulary for the order platform: typed identifiers, fixed-point
//! money and the status enums persisted by the catalog store.

mod money;
mod status;
mod types;

pub use money::{DEFAULT_CURRENCY, MINOR_UNIT_SCALE, Money};
pub use status::{AuditAction, DeliveryJobStatus, OrderStatus, UnknownStatus};
pub use types::{
    AuditEntryId, DeliveryJobId, DocumentRef, FactoryId, OrderId, OrderItemId, OrganizationId,
    PriceId, PriceListId, ProductId, UserId, VariantId,
};
