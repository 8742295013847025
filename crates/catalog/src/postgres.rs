use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AuditAction, AuditEntryId, DeliveryJobId, DeliveryJobStatus, DocumentRef, FactoryId, Money,
    OrderId, OrderItemId, OrderStatus, OrganizationId, PriceId, PriceListId, ProductId, UserId,
    VariantId,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AuditEntry, DeliveryJob, DeliveryJobUpdate, Factory, NewAuditEntry, NewDeliveryJob, NewOrder,
    Order, OrderItem, OrderPage, OrderQuery, OrderStatusUpdate, Organization, Price, PriceList,
    Product, ProductVariant, Result, StoreError, User,
    store::{CatalogStore, status_conflict},
};

const ORDER_COLUMNS: &str = "id, order_number, status, organization_id, user_id, factory_id, \
     price_list_id, currency, total_amount, notes, document_ref, created_at, submitted_at, \
     emailed_at, updated_at";

const JOB_COLUMNS: &str = "id, order_id, factory_id, recipients, subject, status, attempts, \
     max_attempts, last_error, sent_at, created_at, updated_at";

const AUDIT_COLUMNS: &str =
    "id, action, entity_type, entity_id, user_id, order_id, changes, created_at";

/// PostgreSQL-backed catalog store.
#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("catalog migrations applied");
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let document_ref: Option<String> = row.try_get("document_ref")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: row.try_get("order_number")?,
            status: OrderStatus::from_db_str(&status)?,
            organization_id: OrganizationId::from_uuid(row.try_get::<Uuid, _>("organization_id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            factory_id: FactoryId::from_uuid(row.try_get::<Uuid, _>("factory_id")?),
            price_list_id: row
                .try_get::<Option<Uuid>, _>("price_list_id")?
                .map(PriceListId::from_uuid),
            currency: row.try_get("currency")?,
            total_amount: Money::new(row.try_get::<Decimal, _>("total_amount")?),
            notes: row.try_get("notes")?,
            document_ref: document_ref.map(DocumentRef::from),
            created_at: row.try_get("created_at")?,
            submitted_at: row.try_get("submitted_at")?,
            emailed_at: row.try_get("emailed_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
            quantity: to_u32(row.try_get("quantity")?, "quantity")?,
            unit_price: Money::new(row.try_get::<Decimal, _>("unit_price")?),
            line_total: Money::new(row.try_get::<Decimal, _>("line_total")?),
            notes: row.try_get("notes")?,
        })
    }

    fn row_to_job(row: PgRow) -> Result<DeliveryJob> {
        let status: String = row.try_get("status")?;

        Ok(DeliveryJob {
            id: DeliveryJobId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            factory_id: FactoryId::from_uuid(row.try_get::<Uuid, _>("factory_id")?),
            recipients: row.try_get("recipients")?,
            subject: row.try_get("subject")?,
            status: DeliveryJobStatus::from_db_str(&status)?,
            attempts: to_u32(row.try_get("attempts")?, "attempts")?,
            max_attempts: to_u32(row.try_get("max_attempts")?, "max_attempts")?,
            last_error: row.try_get("last_error")?,
            sent_at: row.try_get("sent_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_audit(row: PgRow) -> Result<AuditEntry> {
        let action: String = row.try_get("action")?;

        Ok(AuditEntry {
            id: AuditEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            action: AuditAction::from_db_str(&action)?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            changes: row.try_get("changes")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Reads the current status of a row after a conditional update matched
    /// nothing, to tell a conflict apart from a missing row.
    async fn current_status(&self, table: &str, id: Uuid) -> Result<Option<String>> {
        let sql = format!("SELECT status FROM {table} WHERE id = $1");
        let status = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(status)
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("negative {column}: {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} out of range: {value}")))
}

/// Maps a unique violation on `constraint` to [`StoreError::Duplicate`].
fn map_unique(e: sqlx::Error, constraint: &str, entity: &'static str, key: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some(constraint)
    {
        return StoreError::Duplicate {
            entity,
            key: key.to_string(),
        };
    }
    StoreError::Database(e)
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn insert_organization(&self, organization: Organization) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, code, email, phone, address, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(organization.id.as_uuid())
        .bind(&organization.name)
        .bind(&organization.code)
        .bind(&organization.email)
        .bind(&organization.phone)
        .bind(&organization.address)
        .bind(organization.is_active)
        .bind(organization.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        let row = sqlx::query(
            "SELECT id, name, code, email, phone, address, is_active, created_at FROM organizations WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Organization> {
            Ok(Organization {
                id: OrganizationId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
                code: row.try_get("code")?,
                email: row.try_get("email")?,
                phone: row.try_get("phone")?,
                address: row.try_get("address")?,
                is_active: row.try_get("is_active")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn insert_factory(&self, factory: Factory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO factories (id, name, code, contact_email, contact_phone, address, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(factory.id.as_uuid())
        .bind(&factory.name)
        .bind(&factory.code)
        .bind(&factory.contact_email)
        .bind(&factory.contact_phone)
        .bind(&factory.address)
        .bind(factory.is_active)
        .bind(factory.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_factory(&self, id: FactoryId) -> Result<Option<Factory>> {
        let row = sqlx::query(
            "SELECT id, name, code, contact_email, contact_phone, address, is_active, created_at FROM factories WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Factory> {
            Ok(Factory {
                id: FactoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
                code: row.try_get("code")?,
                contact_email: row.try_get("contact_email")?,
                contact_phone: row.try_get("contact_phone")?,
                address: row.try_get("address")?,
                is_active: row.try_get("is_active")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn insert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, factory_id, name, code, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.factory_id.as_uuid())
        .bind(&product.name)
        .bind(&product.code)
        .bind(&product.description)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, factory_id, name, code, description, created_at FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Product> {
            Ok(Product {
                id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
                factory_id: FactoryId::from_uuid(row.try_get::<Uuid, _>("factory_id")?),
                name: row.try_get("name")?,
                code: row.try_get("code")?,
                description: row.try_get("description")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn insert_variant(&self, variant: ProductVariant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_variants (id, product_id, sku, name, attributes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(variant.id.as_uuid())
        .bind(variant.product_id.as_uuid())
        .bind(&variant.sku)
        .bind(&variant.name)
        .bind(&variant.attributes)
        .bind(variant.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_variant(&self, id: VariantId) -> Result<Option<ProductVariant>> {
        let row = sqlx::query(
            "SELECT id, product_id, sku, name, attributes, created_at FROM product_variants WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<ProductVariant> {
            Ok(ProductVariant {
                id: VariantId::from_uuid(row.try_get::<Uuid, _>("id")?),
                product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                sku: row.try_get("sku")?,
                name: row.try_get("name")?,
                attributes: row.try_get("attributes")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn insert_price_list(&self, price_list: PriceList) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_lists (id, name, organization_id, currency, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(price_list.id.as_uuid())
        .bind(&price_list.name)
        .bind(price_list.organization_id.map(|id| id.as_uuid()))
        .bind(&price_list.currency)
        .bind(price_list.is_active)
        .bind(price_list.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_price_list(&self, id: PriceListId) -> Result<Option<PriceList>> {
        let row = sqlx::query(
            "SELECT id, name, organization_id, currency, is_active, created_at FROM price_lists WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<PriceList> {
            Ok(PriceList {
                id: PriceListId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
                organization_id: row
                    .try_get::<Option<Uuid>, _>("organization_id")?
                    .map(OrganizationId::from_uuid),
                currency: row.try_get("currency")?,
                is_active: row.try_get("is_active")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn insert_price(&self, price: Price) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO prices (id, price_list_id, variant_id, amount, currency, min_qty, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(price.id.as_uuid())
        .bind(price.price_list_id.as_uuid())
        .bind(price.variant_id.as_uuid())
        .bind(price.amount.amount())
        .bind(&price.currency)
        .bind(to_i32(price.min_qty, "min_qty")?)
        .bind(price.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_price(
        &self,
        variant_id: VariantId,
        price_list_id: Option<PriceListId>,
    ) -> Result<Option<Price>> {
        let row = sqlx::query(
            r#"
            SELECT id, price_list_id, variant_id, amount, currency, min_qty, created_at
            FROM prices
            WHERE variant_id = $1 AND ($2::uuid IS NULL OR price_list_id = $2)
            ORDER BY position ASC
            LIMIT 1
            "#,
        )
        .bind(variant_id.as_uuid())
        .bind(price_list_id.map(|id| id.as_uuid()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Price> {
            Ok(Price {
                id: PriceId::from_uuid(row.try_get::<Uuid, _>("id")?),
                price_list_id: PriceListId::from_uuid(row.try_get::<Uuid, _>("price_list_id")?),
                variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
                amount: Money::new(row.try_get::<Decimal, _>("amount")?),
                currency: row.try_get("currency")?,
                min_qty: to_u32(row.try_get("min_qty")?, "min_qty")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, organization_id, email, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.organization_id.map(|id| id.as_uuid()))
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, organization_id, email, first_name, last_name FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<User> {
            Ok(User {
                id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
                organization_id: row
                    .try_get::<Option<Uuid>, _>("organization_id")?
                    .map(OrganizationId::from_uuid),
                email: row.try_get("email")?,
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
            })
        })
        .transpose()
    }

    async fn next_order_sequence(&self) -> Result<u64> {
        let value: i64 = sqlx::query_scalar("SELECT nextval('order_number_seq')")
            .fetch_one(&self.pool)
            .await?;
        u64::try_from(value)
            .map_err(|_| StoreError::InvalidData(format!("negative sequence value: {value}")))
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO orders (id, order_number, status, organization_id, user_id, factory_id,
                                price_list_id, currency, total_amount, notes, created_at, updated_at)
            VALUES ($1, $2, 'DRAFT', $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(new.id.as_uuid())
            .bind(&new.order_number)
            .bind(new.organization_id.as_uuid())
            .bind(new.user_id.as_uuid())
            .bind(new.factory_id.as_uuid())
            .bind(new.price_list_id.map(|id| id.as_uuid()))
            .bind(&new.currency)
            .bind(new.total_amount.amount())
            .bind(&new.notes)
            .bind(new.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_unique(e, "unique_order_number", "order number", &new.order_number))?;
        let order = Self::row_to_order(row)?;

        for item in &new.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, variant_id, quantity, unit_price, line_total, notes)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(OrderItemId::new().as_uuid())
            .bind(order.id.as_uuid())
            .bind(item.variant_id.as_uuid())
            .bind(to_i32(item.quantity, "quantity")?)
            .bind(item.unit_price.amount())
            .bind(item.line_total.amount())
            .bind(&item.notes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = new.items.len(),
            "order inserted"
        );
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, variant_id, quantity, unit_price, line_total, notes
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        const FILTER: &str = "($1::text IS NULL OR status = $1) \
             AND ($2::uuid IS NULL OR user_id = $2) \
             AND ($3::uuid IS NULL OR organization_id = $3)";

        let status = query.status.map(|s| s.as_db_str());
        let user_id = query.user_id.map(|id| id.as_uuid());
        let organization_id = query.organization_id.map(|id| id.as_uuid());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {FILTER}"))
            .bind(status)
            .bind(user_id)
            .bind(organization_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE {FILTER} \
             ORDER BY created_at DESC, order_number DESC LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query(&sql)
            .bind(status)
            .bind(user_id)
            .bind(organization_id)
            .bind(i64::from(query.take))
            .bind(i64::from(query.skip))
            .fetch_all(&self.pool)
            .await?;

        let orders = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderPage {
            orders,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        update: OrderStatusUpdate,
    ) -> Result<Order> {
        let sql = format!(
            r#"
            UPDATE orders
            SET status = $3,
                submitted_at = COALESCE($4, submitted_at),
                emailed_at = COALESCE($5, emailed_at),
                document_ref = COALESCE($6, document_ref),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(expected.as_db_str())
            .bind(update.status.as_db_str())
            .bind(update.submitted_at)
            .bind(update.emailed_at)
            .bind(update.document_ref.as_ref().map(|d| d.as_str()))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => match self.current_status("orders", id.as_uuid()).await? {
                Some(actual) => Err(status_conflict(
                    "order",
                    id,
                    expected,
                    OrderStatus::from_db_str(&actual)?,
                )),
                None => Err(StoreError::NotFound {
                    entity: "order",
                    id: id.to_string(),
                }),
            },
        }
    }

    async fn insert_delivery_job(&self, new: NewDeliveryJob) -> Result<DeliveryJob> {
        let sql = format!(
            r#"
            INSERT INTO delivery_jobs (id, order_id, factory_id, recipients, subject, status,
                                       attempts, max_attempts)
            VALUES ($1, $2, $3, $4, $5, 'PENDING', 0, $6)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(new.id.as_uuid())
            .bind(new.order_id.as_uuid())
            .bind(new.factory_id.as_uuid())
            .bind(&new.recipients)
            .bind(&new.subject)
            .bind(to_i32(new.max_attempts, "max_attempts")?)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_unique(e, "one_job_per_order", "delivery job", &new.order_id.to_string())
            })?;
        Self::row_to_job(row)
    }

    async fn get_delivery_job(&self, id: DeliveryJobId) -> Result<Option<DeliveryJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM delivery_jobs WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_job).transpose()
    }

    async fn list_delivery_jobs(&self, order_id: OrderId) -> Result<Vec<DeliveryJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM delivery_jobs WHERE order_id = $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_job).collect()
    }

    async fn update_delivery_job(
        &self,
        id: DeliveryJobId,
        expected: DeliveryJobStatus,
        update: DeliveryJobUpdate,
    ) -> Result<DeliveryJob> {
        let sql = format!(
            r#"
            UPDATE delivery_jobs
            SET status = $3,
                attempts = $4,
                last_error = $5,
                sent_at = COALESCE($6, sent_at),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(expected.as_db_str())
            .bind(update.status.as_db_str())
            .bind(to_i32(update.attempts, "attempts")?)
            .bind(&update.last_error)
            .bind(update.sent_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_job(row),
            None => match self.current_status("delivery_jobs", id.as_uuid()).await? {
                Some(actual) => Err(status_conflict(
                    "delivery job",
                    id,
                    expected,
                    DeliveryJobStatus::from_db_str(&actual)?,
                )),
                None => Err(StoreError::NotFound {
                    entity: "delivery job",
                    id: id.to_string(),
                }),
            },
        }
    }

    async fn find_stale_jobs(
        &self,
        status: DeliveryJobStatus,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<DeliveryJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM delivery_jobs \
             WHERE status = $1 AND updated_at <= $2 ORDER BY updated_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_db_str())
            .bind(older_than)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_job).collect()
    }

    async fn find_submitted_orders_without_jobs(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders o
            WHERE o.status = 'SUBMITTED'
              AND o.submitted_at <= $1
              AND NOT EXISTS (SELECT 1 FROM delivery_jobs j WHERE j.order_id = o.id)
            ORDER BY o.submitted_at ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(older_than)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn append_audit_entry(&self, new: NewAuditEntry) -> Result<AuditEntry> {
        let sql = format!(
            r#"
            INSERT INTO audit_entries (id, action, entity_type, entity_id, user_id, order_id, changes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {AUDIT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(AuditEntryId::new().as_uuid())
            .bind(new.action.as_str())
            .bind(&new.entity_type)
            .bind(new.entity_id)
            .bind(new.user_id.as_uuid())
            .bind(new.order_id.map(|id| id.as_uuid()))
            .bind(&new.changes)
            .fetch_one(&self.pool)
            .await?;
        Self::row_to_audit(row)
    }

    async fn list_audit_entries(&self, order_id: OrderId) -> Result<Vec<AuditEntry>> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_entries WHERE order_id = $1 ORDER BY position ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_audit).collect()
    }
}
