use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    DeliveryJobId, DeliveryJobStatus, FactoryId, OrderId, OrderStatus, OrganizationId,
    PriceListId, ProductId, UserId, VariantId,
};

use crate::{
    AuditEntry, DeliveryJob, DeliveryJobUpdate, Factory, NewAuditEntry, NewDeliveryJob, NewOrder,
    Order, OrderGraph, OrderItem, OrderLine, OrderPage, OrderQuery, OrderStatusUpdate,
    Organization, Price, PriceList, Product, ProductVariant, Result, StoreError, User,
};

/// Persistent relational store behind the order pipeline.
///
/// Implementations must be thread-safe (Send + Sync). Status updates are
/// conditional: they only apply when the row is still in the status the
/// caller expects, and fail with [`StoreError::StatusConflict`] otherwise.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_organization(&self, organization: Organization) -> Result<()>;

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>>;

    async fn insert_factory(&self, factory: Factory) -> Result<()>;

    async fn get_factory(&self, id: FactoryId) -> Result<Option<Factory>>;

    async fn insert_product(&self, product: Product) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn insert_variant(&self, variant: ProductVariant) -> Result<()>;

    async fn get_variant(&self, id: VariantId) -> Result<Option<ProductVariant>>;

    async fn insert_price_list(&self, price_list: PriceList) -> Result<()>;

    async fn get_price_list(&self, id: PriceListId) -> Result<Option<PriceList>>;

    async fn insert_price(&self, price: Price) -> Result<()>;

    /// Finds the first persisted price for a variant.
    ///
    /// With a price list only prices on that list are eligible. "First" is
    /// creation order.
    async fn find_price(
        &self,
        variant_id: VariantId,
        price_list_id: Option<PriceListId>,
    ) -> Result<Option<Price>>;

    async fn insert_user(&self, user: User) -> Result<()>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Draws the next value of the order number sequence. Values are unique
    /// and increasing; gaps are allowed.
    async fn next_order_sequence(&self) -> Result<u64>;

    /// Inserts an order in `Draft` together with all of its items.
    ///
    /// Either everything is written or nothing is. A taken order number
    /// fails with [`StoreError::Duplicate`].
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Items of an order in insertion order.
    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Lists orders matching the query, newest first.
    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage>;

    /// Moves an order from `expected` to `update.status`.
    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        update: OrderStatusUpdate,
    ) -> Result<Order>;

    /// Inserts a delivery job in `Pending` with zero attempts.
    ///
    /// An order has at most one job: a second insert for the same order
    /// fails with [`StoreError::Duplicate`].
    async fn insert_delivery_job(&self, job: NewDeliveryJob) -> Result<DeliveryJob>;

    async fn get_delivery_job(&self, id: DeliveryJobId) -> Result<Option<DeliveryJob>>;

    /// Delivery jobs of an order, oldest first.
    async fn list_delivery_jobs(&self, order_id: OrderId) -> Result<Vec<DeliveryJob>>;

    /// Applies a job transition if the job is still in `expected`.
    async fn update_delivery_job(
        &self,
        id: DeliveryJobId,
        expected: DeliveryJobStatus,
        update: DeliveryJobUpdate,
    ) -> Result<DeliveryJob>;

    /// Jobs in `status` whose last update is older than `older_than`.
    async fn find_stale_jobs(
        &self,
        status: DeliveryJobStatus,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<DeliveryJob>>;

    /// Submitted orders that never got a delivery job, submitted before
    /// `older_than`.
    async fn find_submitted_orders_without_jobs(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    async fn append_audit_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry>;

    /// Audit entries recorded for an order, oldest first.
    async fn list_audit_entries(&self, order_id: OrderId) -> Result<Vec<AuditEntry>>;
}

/// Extension trait providing traversal helpers on top of [`CatalogStore`].
#[async_trait]
pub trait CatalogStoreExt: CatalogStore {
    async fn order_exists(&self, id: OrderId) -> Result<bool> {
        Ok(self.get_order(id).await?.is_some())
    }

    /// Loads an order with its organization, factory, creator, price list
    /// and items joined to their variant and product.
    ///
    /// Returns `None` if the order does not exist. A dangling reference
    /// from an existing order is reported as [`StoreError::NotFound`].
    async fn load_order_graph(&self, id: OrderId) -> Result<Option<OrderGraph>> {
        let Some(order) = self.get_order(id).await? else {
            return Ok(None);
        };

        let organization = self
            .get_organization(order.organization_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "organization",
                id: order.organization_id.to_string(),
            })?;
        let factory = self
            .get_factory(order.factory_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "factory",
                id: order.factory_id.to_string(),
            })?;
        let creator = self.get_user(order.user_id).await?;
        let price_list = match order.price_list_id {
            Some(price_list_id) => self.get_price_list(price_list_id).await?,
            None => None,
        };

        let items = self.get_order_items(order.id).await?;
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let variant =
                self.get_variant(item.variant_id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "variant",
                        id: item.variant_id.to_string(),
                    })?;
            let product =
                self.get_product(variant.product_id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "product",
                        id: variant.product_id.to_string(),
                    })?;
            lines.push(OrderLine {
                item,
                variant,
                product,
            });
        }

        Ok(Some(OrderGraph {
            order,
            organization,
            factory,
            creator,
            price_list,
            lines,
        }))
    }
}

impl<T: CatalogStore + ?Sized> CatalogStoreExt for T {}

/// Builds the conflict error for a conditional update that found `actual`.
pub(crate) fn status_conflict(
    entity: &'static str,
    id: impl ToString,
    expected: impl ToString,
    actual: impl ToString,
) -> StoreError {
    StoreError::StatusConflict {
        entity,
        id: id.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}
