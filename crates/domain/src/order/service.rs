//! Order service: the entry point for order operations and queries.

use catalog::{
    AuditEntry, CatalogStore, DeliveryJob, Order, OrderItem, OrderPage, OrderQuery,
    OrderStatusUpdate,
};
use chrono::Utc;
use common::{AuditAction, DocumentRef, OrderId};
use serde::Serialize;

use crate::audit::AuditRecorder;
use crate::error::{DomainError, Result};

use super::{CreateOrder, MarkEmailed, OrderAggregator, OrderError, OrderTransition, SubmitOrder};

/// An order with its items and delivery jobs.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub jobs: Vec<DeliveryJob>,
}

/// Where the stored document of an order lives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDocument {
    pub order_id: OrderId,
    pub order_number: String,
    pub document_ref: DocumentRef,
}

/// Service for managing orders.
pub struct OrderService<S: CatalogStore> {
    store: S,
    aggregator: OrderAggregator<S>,
    audit: AuditRecorder<S>,
}

impl<S: CatalogStore + Clone> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            aggregator: OrderAggregator::new(store.clone()),
            audit: AuditRecorder::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit(&self) -> &AuditRecorder<S> {
        &self.audit
    }

    /// Creates a draft order with priced items.
    ///
    /// The order and its items are written together; an unresolved price or
    /// missing reference leaves nothing behind.
    #[tracing::instrument(skip(self, cmd), fields(actor_id = %cmd.actor_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<OrderDetails> {
        let new_order = self.aggregator.assemble(&cmd).await?;
        let item_count = new_order.items.len();

        let order = self.store.create_order(new_order).await?;
        let items = self.store.get_order_items(order.id).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "order created"
        );

        self.audit
            .record_order(
                AuditAction::Create,
                order.id,
                cmd.actor_id,
                serde_json::json!({
                    "orderNumber": order.order_number,
                    "totalAmount": order.total_amount.to_string(),
                    "itemsCount": item_count,
                }),
            )
            .await;

        Ok(OrderDetails {
            order,
            items,
            jobs: Vec::new(),
        })
    }

    /// Moves a draft order to `Submitted`.
    ///
    /// Only the status change happens here; creating the delivery job and
    /// scheduling delivery is the dispatcher's part of submission. Two
    /// concurrent submissions cannot both succeed: the second one loses the
    /// conditional update and gets [`OrderError::InvalidTransition`].
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn submit_order(&self, cmd: SubmitOrder) -> Result<Order> {
        let order = self.load(cmd.order_id).await?;
        let items = self.store.get_order_items(order.id).await?;
        OrderTransition::check_submit(order.status, items.len())?;

        let submitted = self
            .transition(
                &order,
                OrderTransition::Submit,
                OrderStatusUpdate::submitted(Utc::now()),
            )
            .await?;

        metrics::counter!("orders_submitted_total").increment(1);
        tracing::info!(order_number = %submitted.order_number, "order submitted");
        Ok(submitted)
    }

    /// Records confirmed delivery: `Submitted → Emailed` with the document
    /// reference of the successful attempt.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn mark_emailed(&self, cmd: MarkEmailed) -> Result<Order> {
        let order = self.load(cmd.order_id).await?;
        OrderTransition::MarkEmailed.apply(order.status)?;

        self.transition(
            &order,
            OrderTransition::MarkEmailed,
            OrderStatusUpdate::emailed(cmd.document_ref, Utc::now()),
        )
        .await
    }

    /// Loads an order with items and jobs. Returns None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderDetails>> {
        let Some(order) = self.store.get_order(order_id).await? else {
            return Ok(None);
        };
        let items = self.store.get_order_items(order_id).await?;
        let jobs = self.store.list_delivery_jobs(order_id).await?;

        Ok(Some(OrderDetails { order, items, jobs }))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        Ok(self.store.list_orders(query).await?)
    }

    /// Returns the stored document of an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_document(&self, order_id: OrderId) -> Result<OrderDocument> {
        let order = self.load(order_id).await?;
        let document_ref = order
            .document_ref
            .ok_or(OrderError::DocumentNotReady(order_id))?;

        Ok(OrderDocument {
            order_id: order.id,
            order_number: order.order_number,
            document_ref,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_jobs(&self, order_id: OrderId) -> Result<Vec<DeliveryJob>> {
        self.load(order_id).await?;
        Ok(self.store.list_delivery_jobs(order_id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn audit_trail(&self, order_id: OrderId) -> Result<Vec<AuditEntry>> {
        self.load(order_id).await?;
        Ok(self.store.list_audit_entries(order_id).await?)
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_id).into())
    }

    /// Applies a conditional status update. A lost race surfaces as
    /// [`OrderError::InvalidTransition`] from the status the winner left.
    async fn transition(
        &self,
        order: &Order,
        transition: OrderTransition,
        update: OrderStatusUpdate,
    ) -> Result<Order> {
        match self
            .store
            .update_order_status(order.id, order.status, update)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(catalog::StoreError::StatusConflict { .. }) => {
                let current = self.load(order.id).await?.status;
                Err(DomainError::Order(OrderError::InvalidTransition {
                    from: current,
                    to: transition.target(),
                }))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use catalog::{
        Factory, InMemoryCatalogStore, Organization, Price, PriceList, Product, ProductVariant,
    };
    use common::{
        FactoryId, Money, OrderStatus, OrganizationId, PriceId, PriceListId, ProductId, UserId,
        VariantId,
    };

    use super::*;
    use crate::order::RequestedItem;

    struct Catalog {
        organization: OrganizationId,
        factory: FactoryId,
        price_list: PriceListId,
        variant: VariantId,
    }

    async fn catalog(store: &InMemoryCatalogStore) -> Catalog {
        let now = Utc::now();
        let c = Catalog {
            organization: OrganizationId::new(),
            factory: FactoryId::new(),
            price_list: PriceListId::new(),
            variant: VariantId::new(),
        };
        let product = ProductId::new();

        store
            .insert_organization(Organization {
                id: c.organization,
                name: "Acme Retail".to_string(),
                code: "ACME".to_string(),
                email: None,
                phone: None,
                address: None,
                is_active: true,
                created_at: now,
            })
            .await
            .unwrap();
        store
            .insert_factory(Factory {
                id: c.factory,
                name: "Northwind".to_string(),
                code: "NW".to_string(),
                contact_email: "orders@northwind.test".to_string(),
                contact_phone: None,
                address: None,
                is_active: true,
                created_at: now,
            })
            .await
            .unwrap();
        store
            .insert_product(Product {
                id: product,
                factory_id: c.factory,
                name: "Shirt".to_string(),
                code: "SH".to_string(),
                description: None,
                created_at: now,
            })
            .await
            .unwrap();
        store
            .insert_variant(ProductVariant {
                id: c.variant,
                product_id: product,
                sku: "SH-M".to_string(),
                name: "M".to_string(),
                attributes: serde_json::json!({}),
                created_at: now,
            })
            .await
            .unwrap();
        store
            .insert_price_list(PriceList {
                id: c.price_list,
                name: "Wholesale".to_string(),
                organization_id: None,
                currency: "USD".to_string(),
                is_active: true,
                created_at: now,
            })
            .await
            .unwrap();
        store
            .insert_price(Price {
                id: PriceId::new(),
                price_list_id: c.price_list,
                variant_id: c.variant,
                amount: Money::from_minor(45000),
                currency: "USD".to_string(),
                min_qty: 1,
                created_at: now,
            })
            .await
            .unwrap();
        c
    }

    fn command(c: &Catalog) -> CreateOrder {
        CreateOrder::new(c.factory, UserId::new(), c.organization).price_list(c.price_list)
    }

    #[tokio::test]
    async fn test_create_order_numbers_and_audits() {
        let store = InMemoryCatalogStore::new();
        let c = catalog(&store).await;
        let service = OrderService::new(store.clone());

        let created = service
            .create_order(command(&c).item(RequestedItem::new(c.variant, 3)))
            .await
            .unwrap();

        assert_eq!(created.order.status, OrderStatus::Draft);
        assert!(created.order.order_number.starts_with("ORD-"));
        assert!(created.order.order_number.ends_with("-00001"));
        assert_eq!(created.order.total_amount, Money::from_minor(135000));
        assert_eq!(created.items.len(), 1);

        let trail = service.audit_trail(created.order.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Create);
        assert_eq!(trail[0].changes["itemsCount"], 1);
        assert_eq!(trail[0].changes["totalAmount"], "1350.00");
    }

    #[tokio::test]
    async fn test_submit_then_resubmit() {
        let store = InMemoryCatalogStore::new();
        let c = catalog(&store).await;
        let service = OrderService::new(store.clone());
        let created = service
            .create_order(command(&c).item(RequestedItem::new(c.variant, 1)))
            .await
            .unwrap();

        let submitted = service
            .submit_order(SubmitOrder::new(created.order.id, UserId::new()))
            .await
            .unwrap();
        assert_eq!(submitted.status, OrderStatus::Submitted);
        assert!(submitted.submitted_at.is_some());

        let again = service
            .submit_order(SubmitOrder::new(created.order.id, UserId::new()))
            .await;
        assert!(matches!(
            again,
            Err(DomainError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Submitted,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_mark_emailed_requires_submitted() {
        let store = InMemoryCatalogStore::new();
        let c = catalog(&store).await;
        let service = OrderService::new(store.clone());
        let created = service
            .create_order(command(&c).item(RequestedItem::new(c.variant, 1)))
            .await
            .unwrap();

        let early = service
            .mark_emailed(MarkEmailed::new(
                created.order.id,
                DocumentRef::new("/tmp/doc.html"),
            ))
            .await;
        assert!(matches!(
            early,
            Err(DomainError::Order(OrderError::InvalidTransition { .. }))
        ));

        service
            .submit_order(SubmitOrder::new(created.order.id, UserId::new()))
            .await
            .unwrap();
        let emailed = service
            .mark_emailed(MarkEmailed::new(
                created.order.id,
                DocumentRef::new("/tmp/doc.html"),
            ))
            .await
            .unwrap();
        assert_eq!(emailed.status, OrderStatus::Emailed);
        assert!(emailed.emailed_at.is_some());
    }

    #[tokio::test]
    async fn test_document_not_ready_until_emailed() {
        let store = InMemoryCatalogStore::new();
        let c = catalog(&store).await;
        let service = OrderService::new(store.clone());
        let created = service
            .create_order(command(&c).item(RequestedItem::new(c.variant, 1)))
            .await
            .unwrap();

        let pending = service.get_document(created.order.id).await;
        assert!(matches!(
            pending,
            Err(DomainError::Order(OrderError::DocumentNotReady(_)))
        ));

        let missing = service.get_document(OrderId::new()).await;
        assert!(matches!(
            missing,
            Err(DomainError::Order(OrderError::OrderNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_queries_on_missing_order() {
        let service = OrderService::new(InMemoryCatalogStore::new());
        let id = OrderId::new();

        assert!(service.get_order(id).await.unwrap().is_none());
        assert!(matches!(
            service.list_jobs(id).await,
            Err(DomainError::Order(OrderError::OrderNotFound(_)))
        ));
        assert!(matches!(
            service.audit_trail(id).await,
            Err(DomainError::Order(OrderError::OrderNotFound(_)))
        ));
    }
}
