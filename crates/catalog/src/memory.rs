use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AuditEntryId, DeliveryJobId, DeliveryJobStatus, FactoryId, OrderId, OrderItemId, OrderStatus,
    OrganizationId, PriceListId, ProductId, UserId, VariantId,
};
use tokio::sync::RwLock;

use crate::{
    AuditEntry, DeliveryJob, DeliveryJobUpdate, Factory, NewAuditEntry, NewDeliveryJob, NewOrder,
    Order, OrderItem, OrderPage, OrderQuery, OrderStatusUpdate, Organization, Price, PriceList,
    Product, ProductVariant, Result, StoreError, User,
    store::{CatalogStore, status_conflict},
};

#[derive(Default)]
struct State {
    organizations: HashMap<OrganizationId, Organization>,
    factories: HashMap<FactoryId, Factory>,
    products: HashMap<ProductId, Product>,
    variants: HashMap<VariantId, ProductVariant>,
    price_lists: HashMap<PriceListId, PriceList>,
    prices: Vec<Price>,
    users: HashMap<UserId, User>,
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    jobs: Vec<DeliveryJob>,
    audit: Vec<AuditEntry>,
    order_sequence: u64,
}

/// In-memory catalog store.
///
/// Holds everything behind one lock so multi-row writes (an order with its
/// items) are atomic, mirroring the transaction used by the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn job_count(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn audit_count(&self) -> usize {
        self.state.read().await.audit.len()
    }

    /// Clears all records and resets the order sequence.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

fn insert_unique<K, V>(map: &mut HashMap<K, V>, key: K, value: V, entity: &'static str) -> Result<()>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
{
    if map.contains_key(&key) {
        return Err(StoreError::Duplicate {
            entity,
            key: key.to_string(),
        });
    }
    map.insert(key, value);
    Ok(())
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert_organization(&self, organization: Organization) -> Result<()> {
        let mut state = self.state.write().await;
        insert_unique(
            &mut state.organizations,
            organization.id,
            organization,
            "organization",
        )
    }

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        Ok(self.state.read().await.organizations.get(&id).cloned())
    }

    async fn insert_factory(&self, factory: Factory) -> Result<()> {
        let mut state = self.state.write().await;
        insert_unique(&mut state.factories, factory.id, factory, "factory")
    }

    async fn get_factory(&self, id: FactoryId) -> Result<Option<Factory>> {
        Ok(self.state.read().await.factories.get(&id).cloned())
    }

    async fn insert_product(&self, product: Product) -> Result<()> {
        let mut state = self.state.write().await;
        insert_unique(&mut state.products, product.id, product, "product")
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn insert_variant(&self, variant: ProductVariant) -> Result<()> {
        let mut state = self.state.write().await;
        insert_unique(&mut state.variants, variant.id, variant, "variant")
    }

    async fn get_variant(&self, id: VariantId) -> Result<Option<ProductVariant>> {
        Ok(self.state.read().await.variants.get(&id).cloned())
    }

    async fn insert_price_list(&self, price_list: PriceList) -> Result<()> {
        let mut state = self.state.write().await;
        insert_unique(&mut state.price_lists, price_list.id, price_list, "price list")
    }

    async fn get_price_list(&self, id: PriceListId) -> Result<Option<PriceList>> {
        Ok(self.state.read().await.price_lists.get(&id).cloned())
    }

    async fn insert_price(&self, price: Price) -> Result<()> {
        let mut state = self.state.write().await;
        if state.prices.iter().any(|p| p.id == price.id) {
            return Err(StoreError::Duplicate {
                entity: "price",
                key: price.id.to_string(),
            });
        }
        state.prices.push(price);
        Ok(())
    }

    async fn find_price(
        &self,
        variant_id: VariantId,
        price_list_id: Option<PriceListId>,
    ) -> Result<Option<Price>> {
        let state = self.state.read().await;
        let price = state.prices.iter().find(|p| {
            p.variant_id == variant_id
                && price_list_id.is_none_or(|list| p.price_list_id == list)
        });
        Ok(price.cloned())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        let mut state = self.state.write().await;
        insert_unique(&mut state.users, user.id, user, "user")
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn next_order_sequence(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        state.order_sequence += 1;
        Ok(state.order_sequence)
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;

        if state.orders.contains_key(&new.id) {
            return Err(StoreError::Duplicate {
                entity: "order",
                key: new.id.to_string(),
            });
        }
        if state
            .orders
            .values()
            .any(|o| o.order_number == new.order_number)
        {
            return Err(StoreError::Duplicate {
                entity: "order number",
                key: new.order_number,
            });
        }

        let order = Order {
            id: new.id,
            order_number: new.order_number,
            status: OrderStatus::Draft,
            organization_id: new.organization_id,
            user_id: new.user_id,
            factory_id: new.factory_id,
            price_list_id: new.price_list_id,
            currency: new.currency,
            total_amount: new.total_amount,
            notes: new.notes,
            document_ref: None,
            created_at: new.created_at,
            submitted_at: None,
            emailed_at: None,
            updated_at: new.created_at,
        };
        let items = new
            .items
            .into_iter()
            .map(|item| OrderItem {
                id: OrderItemId::new(),
                order_id: order.id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
                notes: item.notes,
            })
            .collect();

        state.items.insert(order.id, items);
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let state = self.state.read().await;
        Ok(state.items.get(&order_id).cloned().unwrap_or_default())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let state = self.state.read().await;
        let mut matching: Vec<&Order> = state.orders.values().filter(|o| query.matches(o)).collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });

        let total = matching.len() as u64;
        let orders = matching
            .into_iter()
            .skip(query.skip as usize)
            .take(query.take as usize)
            .cloned()
            .collect();

        Ok(OrderPage { orders, total })
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        update: OrderStatusUpdate,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.orders.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "order",
            id: id.to_string(),
        })?;

        if order.status != expected {
            return Err(status_conflict("order", id, expected, order.status));
        }

        order.status = update.status;
        if update.submitted_at.is_some() {
            order.submitted_at = update.submitted_at;
        }
        if update.emailed_at.is_some() {
            order.emailed_at = update.emailed_at;
        }
        if update.document_ref.is_some() {
            order.document_ref = update.document_ref;
        }
        order.updated_at = Utc::now();

        Ok(order.clone())
    }

    async fn insert_delivery_job(&self, new: NewDeliveryJob) -> Result<DeliveryJob> {
        let mut state = self.state.write().await;
        if state.jobs.iter().any(|j| j.id == new.id) {
            return Err(StoreError::Duplicate {
                entity: "delivery job",
                key: new.id.to_string(),
            });
        }
        if state.jobs.iter().any(|j| j.order_id == new.order_id) {
            return Err(StoreError::Duplicate {
                entity: "delivery job",
                key: new.order_id.to_string(),
            });
        }

        let now = Utc::now();
        let job = DeliveryJob {
            id: new.id,
            order_id: new.order_id,
            factory_id: new.factory_id,
            recipients: new.recipients,
            subject: new.subject,
            status: DeliveryJobStatus::Pending,
            attempts: 0,
            max_attempts: new.max_attempts,
            last_error: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.push(job.clone());
        Ok(job)
    }

    async fn get_delivery_job(&self, id: DeliveryJobId) -> Result<Option<DeliveryJob>> {
        let state = self.state.read().await;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_delivery_jobs(&self, order_id: OrderId) -> Result<Vec<DeliveryJob>> {
        let state = self.state.read().await;
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_delivery_job(
        &self,
        id: DeliveryJobId,
        expected: DeliveryJobStatus,
        update: DeliveryJobUpdate,
    ) -> Result<DeliveryJob> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "delivery job",
                id: id.to_string(),
            })?;

        if job.status != expected {
            return Err(status_conflict("delivery job", id, expected, job.status));
        }

        job.status = update.status;
        job.attempts = update.attempts;
        job.last_error = update.last_error;
        if update.sent_at.is_some() {
            job.sent_at = update.sent_at;
        }
        job.updated_at = Utc::now();

        Ok(job.clone())
    }

    async fn find_stale_jobs(
        &self,
        status: DeliveryJobStatus,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<DeliveryJob>> {
        let state = self.state.read().await;
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.status == status && j.updated_at <= older_than)
            .cloned()
            .collect())
    }

    async fn find_submitted_orders_without_jobs(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::Submitted
                    && o.submitted_at.is_some_and(|at| at <= older_than)
                    && !state.jobs.iter().any(|j| j.order_id == o.id)
            })
            .cloned()
            .collect())
    }

    async fn append_audit_entry(&self, new: NewAuditEntry) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: AuditEntryId::new(),
            action: new.action,
            entity_type: new.entity_type,
            entity_id: new.entity_id,
            user_id: new.user_id,
            order_id: new.order_id,
            changes: new.changes,
            created_at: Utc::now(),
        };
        self.state.write().await.audit.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit_entries(&self, order_id: OrderId) -> Result<Vec<AuditEntry>> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .filter(|e| e.order_id == Some(order_id))
            .cloned()
            .collect())
    }
}
