//! Typed inputs for order operations.

use common::{DocumentRef, FactoryId, OrderId, OrganizationId, PriceListId, UserId, VariantId};
use serde::Deserialize;

use super::OrderError;

/// One requested line of a new order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestedItem {
    pub variant_id: VariantId,
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RequestedItem {
    pub fn new(variant_id: VariantId, quantity: u32) -> Self {
        Self {
            variant_id,
            quantity,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Checks field-level rules that need no store access.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                variant_id: self.variant_id,
                quantity: self.quantity,
            });
        }
        Ok(())
    }
}

/// Command to create a new draft order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub factory_id: FactoryId,
    pub price_list_id: Option<PriceListId>,
    pub items: Vec<RequestedItem>,
    pub notes: Option<String>,

    /// The user placing the order.
    pub actor_id: UserId,

    /// The buyer organization the order is placed for.
    pub organization_id: OrganizationId,
}

impl CreateOrder {
    pub fn new(factory_id: FactoryId, actor_id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            factory_id,
            price_list_id: None,
            items: Vec::new(),
            notes: None,
            actor_id,
            organization_id,
        }
    }

    pub fn price_list(mut self, price_list_id: PriceListId) -> Self {
        self.price_list_id = Some(price_list_id);
        self
    }

    pub fn item(mut self, item: RequestedItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Validates every requested item. An empty item list is allowed here
    /// and rejected at submission.
    pub fn validate(&self) -> Result<(), OrderError> {
        self.items.iter().try_for_each(RequestedItem::validate)
    }
}

/// Command to submit a draft order.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOrder {
    pub order_id: OrderId,
    pub actor_id: UserId,
}

impl SubmitOrder {
    pub fn new(order_id: OrderId, actor_id: UserId) -> Self {
        Self { order_id, actor_id }
    }
}

/// Command recording that the order document reached the factory.
#[derive(Debug, Clone)]
pub struct MarkEmailed {
    pub order_id: OrderId,
    pub document_ref: DocumentRef,
}

impl MarkEmailed {
    pub fn new(order_id: OrderId, document_ref: DocumentRef) -> Self {
        Self {
            order_id,
            document_ref,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_quantity_is_rejected() {
        let item = RequestedItem::new(VariantId::new(), 0);
        assert!(matches!(
            item.validate(),
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn empty_item_list_passes_validation() {
        let cmd = CreateOrder::new(FactoryId::new(), UserId::new(), OrganizationId::new());
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn builder_collects_items() {
        let variant = VariantId::new();
        let cmd = CreateOrder::new(FactoryId::new(), UserId::new(), OrganizationId::new())
            .item(RequestedItem::new(variant, 3).with_notes("rush"))
            .notes("call on arrival");

        assert_eq!(cmd.items.len(), 1);
        assert_eq!(cmd.items[0].notes.as_deref(), Some("rush"));
        assert_eq!(cmd.notes.as_deref(), Some("call on arrival"));
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn requested_item_deserializes_without_notes() {
        let variant = VariantId::new();
        let json = serde_json::json!({"variant_id": variant, "quantity": 2});
        let item: RequestedItem = serde_json::from_value(json).unwrap();
        assert_eq!(item, RequestedItem::new(variant, 2));
    }
}
