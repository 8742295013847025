//! Records persisted by the catalog store.

use chrono::{DateTime, Utc};
use common::{
    AuditAction, AuditEntryId, DeliveryJobId, DeliveryJobStatus, DocumentRef, FactoryId, Money,
    OrderId, OrderItemId, OrderStatus, OrganizationId, PriceId, PriceListId, ProductId, UserId,
    VariantId,
};
use serde::{Deserialize, Serialize};

/// A wholesale buyer organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub code: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A supplier factory fulfilling orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factory {
    pub id: FactoryId,
    pub name: String,
    pub code: String,
    /// Address the order document is delivered to.
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub factory_id: FactoryId,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A purchasable configuration of a product (e.g. color/size).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceList {
    pub id: PriceListId,
    pub name: String,
    pub organization_id: Option<OrganizationId>,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: PriceId,
    pub price_list_id: PriceListId,
    pub variant_id: VariantId,
    pub amount: Money,
    pub currency: String,
    pub min_qty: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// An order header. Items are stored separately and loaded with
/// [`crate::CatalogStore::get_order_items`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub factory_id: FactoryId,
    pub price_list_id: Option<PriceListId>,
    pub currency: String,
    pub total_amount: Money,
    pub notes: Option<String>,
    pub document_ref: Option<DocumentRef>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub emailed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order. Prices are captured at creation and never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub variant_id: VariantId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub notes: Option<String>,
}

/// Everything needed to insert an order and its items in one write.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub order_number: String,
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub factory_id: FactoryId,
    pub price_list_id: Option<PriceListId>,
    pub currency: String,
    pub total_amount: Money,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub variant_id: VariantId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub notes: Option<String>,
}

/// Fields written by an order status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub emailed_at: Option<DateTime<Utc>>,
    pub document_ref: Option<DocumentRef>,
}

impl OrderStatusUpdate {
    pub fn submitted(at: DateTime<Utc>) -> Self {
        Self {
            status: OrderStatus::Submitted,
            submitted_at: Some(at),
            emailed_at: None,
            document_ref: None,
        }
    }

    pub fn emailed(document: DocumentRef, at: DateTime<Utc>) -> Self {
        Self {
            status: OrderStatus::Emailed,
            submitted_at: None,
            emailed_at: Some(at),
            document_ref: Some(document),
        }
    }
}

/// The tracked unit of work "render and send this order's document".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub id: DeliveryJobId,
    pub order_id: OrderId,
    pub factory_id: FactoryId,
    pub recipients: Vec<String>,
    pub subject: String,
    pub status: DeliveryJobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryJob {
    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}

#[derive(Debug, Clone)]
pub struct NewDeliveryJob {
    pub id: DeliveryJobId,
    pub order_id: OrderId,
    pub factory_id: FactoryId,
    pub recipients: Vec<String>,
    pub subject: String,
    pub max_attempts: u32,
}

/// Fields written by a delivery job transition.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryJobUpdate {
    pub status: DeliveryJobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// One append-only line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: uuid::Uuid,
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub changes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: uuid::Uuid,
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub changes: serde_json::Value,
}

/// An order item joined with its variant and product.
#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    pub item: OrderItem,
    pub variant: ProductVariant,
    pub product: Product,
}

/// A fully-populated order, as handed to the document renderer.
#[derive(Debug, Clone, Serialize)]
pub struct OrderGraph {
    pub order: Order,
    pub organization: Organization,
    pub factory: Factory,
    pub creator: Option<User>,
    pub price_list: Option<PriceList>,
    pub lines: Vec<OrderLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_remaining_saturates() {
        let now = Utc::now();
        let mut job = DeliveryJob {
            id: DeliveryJobId::new(),
            order_id: OrderId::new(),
            factory_id: FactoryId::new(),
            recipients: vec!["orders@factory.test".to_string()],
            subject: "New Order: ORD-2026-00001".to_string(),
            status: DeliveryJobStatus::Pending,
            attempts: 1,
            max_attempts: 3,
            last_error: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(job.attempts_remaining(), 2);
        job.attempts = 5;
        assert_eq!(job.attempts_remaining(), 0);
    }

    #[test]
    fn test_status_update_constructors() {
        let now = Utc::now();
        let submitted = OrderStatusUpdate::submitted(now);
        assert_eq!(submitted.status, OrderStatus::Submitted);
        assert_eq!(submitted.submitted_at, Some(now));
        assert!(submitted.document_ref.is_none());

        let emailed = OrderStatusUpdate::emailed(DocumentRef::new("/tmp/doc.html"), now);
        assert_eq!(emailed.status, OrderStatus::Emailed);
        assert_eq!(emailed.emailed_at, Some(now));
        assert!(emailed.submitted_at.is_none());
    }
}
