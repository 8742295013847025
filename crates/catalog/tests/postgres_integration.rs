//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and truncate all tables
//! before each test, so they run serially. Run with:
//!
//! ```bash
//! cargo test -p catalog --test postgres_integration
//! ```

use std::sync::Arc;

use catalog::{
    CatalogStore, CatalogStoreExt, DeliveryJobUpdate, Factory, NewAuditEntry, NewDeliveryJob,
    NewOrder, NewOrderItem, OrderQuery, OrderStatusUpdate, Organization, PostgresCatalogStore,
    Price, PriceList, Product, ProductVariant, StoreError, User,
};
use chrono::Utc;
use common::{
    AuditAction, DeliveryJobId, DeliveryJobStatus, DocumentRef, FactoryId, Money, OrderId,
    OrderStatus, OrganizationId, PriceId, PriceListId, ProductId, UserId, VariantId,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_catalog_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresCatalogStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE audit_entries, delivery_jobs, order_items, orders, prices, price_lists, \
         users, product_variants, products, factories, organizations",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresCatalogStore::new(pool)
}

struct Fixture {
    organization: OrganizationId,
    factory: FactoryId,
    variant: VariantId,
    price_list: PriceListId,
    user: UserId,
}

async fn seed(store: &PostgresCatalogStore) -> Fixture {
    let now = Utc::now();
    let suffix = uuid::Uuid::new_v4().simple().to_string();

    let organization = Organization {
        id: OrganizationId::new(),
        name: "Acme Retail".to_string(),
        code: format!("ACME-{suffix}"),
        email: Some("purchasing@acme.test".to_string()),
        phone: None,
        address: None,
        is_active: true,
        created_at: now,
    };
    let factory = Factory {
        id: FactoryId::new(),
        name: "Northwind Textiles".to_string(),
        code: format!("NWT-{suffix}"),
        contact_email: "orders@northwind.test".to_string(),
        contact_phone: None,
        address: Some("1 Mill Road".to_string()),
        is_active: true,
        created_at: now,
    };
    let product = Product {
        id: ProductId::new(),
        factory_id: factory.id,
        name: "Linen Shirt".to_string(),
        code: "LS-1".to_string(),
        description: None,
        created_at: now,
    };
    let variant = ProductVariant {
        id: VariantId::new(),
        product_id: product.id,
        sku: format!("LS-1-M-{suffix}"),
        name: "M / Blue".to_string(),
        attributes: serde_json::json!({"size": "M"}),
        created_at: now,
    };
    let price_list = PriceList {
        id: PriceListId::new(),
        name: "Wholesale".to_string(),
        organization_id: Some(organization.id),
        currency: "USD".to_string(),
        is_active: true,
        created_at: now,
    };
    let user = User {
        id: UserId::new(),
        organization_id: Some(organization.id),
        email: format!("buyer-{suffix}@acme.test"),
        first_name: "Sam".to_string(),
        last_name: "Buyer".to_string(),
    };

    let fixture = Fixture {
        organization: organization.id,
        factory: factory.id,
        variant: variant.id,
        price_list: price_list.id,
        user: user.id,
    };

    store.insert_organization(organization).await.unwrap();
    store.insert_factory(factory).await.unwrap();
    store.insert_product(product).await.unwrap();
    store.insert_variant(variant).await.unwrap();
    store.insert_price_list(price_list).await.unwrap();
    store.insert_user(user).await.unwrap();
    store
        .insert_price(Price {
            id: PriceId::new(),
            price_list_id: fixture.price_list,
            variant_id: fixture.variant,
            amount: Money::from_minor(45000),
            currency: "USD".to_string(),
            min_qty: 1,
            created_at: now,
        })
        .await
        .unwrap();

    fixture
}

fn new_order(fixture: &Fixture, number: &str) -> NewOrder {
    NewOrder {
        id: OrderId::new(),
        order_number: number.to_string(),
        organization_id: fixture.organization,
        user_id: fixture.user,
        factory_id: fixture.factory,
        price_list_id: Some(fixture.price_list),
        currency: "USD".to_string(),
        total_amount: Money::from_minor(135000),
        notes: Some("deliver to dock 4".to_string()),
        created_at: Utc::now(),
        items: vec![NewOrderItem {
            variant_id: fixture.variant,
            quantity: 3,
            unit_price: Money::from_minor(45000),
            line_total: Money::from_minor(135000),
            notes: None,
        }],
    }
}

#[tokio::test]
#[serial]
async fn price_lookup_by_list() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;

    let price = store
        .find_price(fixture.variant, Some(fixture.price_list))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(price.amount, Money::from_minor(45000));
    assert_eq!(price.amount.to_string(), "450.00");

    let other_list = store
        .find_price(fixture.variant, Some(PriceListId::new()))
        .await
        .unwrap();
    assert!(other_list.is_none());
}

#[tokio::test]
#[serial]
async fn order_sequence_increases() {
    let store = get_test_store().await;
    let first = store.next_order_sequence().await.unwrap();
    let second = store.next_order_sequence().await.unwrap();
    assert!(second > first);
}

#[tokio::test]
#[serial]
async fn create_order_with_items() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;

    let order = store
        .create_order(new_order(&fixture, "ORD-2026-00001"))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Draft);
    assert_eq!(order.total_amount, Money::from_minor(135000));

    let items = store.get_order_items(order.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 3);
    assert_eq!(items[0].line_total, Money::from_minor(135000));
}

#[tokio::test]
#[serial]
async fn duplicate_order_number_rolls_back() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;

    store
        .create_order(new_order(&fixture, "ORD-2026-00001"))
        .await
        .unwrap();
    let duplicate = new_order(&fixture, "ORD-2026-00001");
    let duplicate_id = duplicate.id;
    let result = store.create_order(duplicate).await;

    assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    assert!(store.get_order(duplicate_id).await.unwrap().is_none());
    assert!(store.get_order_items(duplicate_id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn conditional_order_transition() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let order = store
        .create_order(new_order(&fixture, "ORD-2026-00001"))
        .await
        .unwrap();

    store
        .update_order_status(
            order.id,
            OrderStatus::Draft,
            OrderStatusUpdate::submitted(Utc::now()),
        )
        .await
        .unwrap();

    let conflict = store
        .update_order_status(
            order.id,
            OrderStatus::Draft,
            OrderStatusUpdate::submitted(Utc::now()),
        )
        .await;
    match conflict {
        Err(StoreError::StatusConflict { actual, .. }) => assert_eq!(actual, "Submitted"),
        other => panic!("expected status conflict, got {other:?}"),
    }

    let emailed = store
        .update_order_status(
            order.id,
            OrderStatus::Submitted,
            OrderStatusUpdate::emailed(DocumentRef::new("/tmp/order.html"), Utc::now()),
        )
        .await
        .unwrap();
    assert_eq!(emailed.status, OrderStatus::Emailed);
    assert!(emailed.submitted_at.is_some());
    assert_eq!(emailed.document_ref, Some(DocumentRef::new("/tmp/order.html")));

    let missing = store
        .update_order_status(
            OrderId::new(),
            OrderStatus::Draft,
            OrderStatusUpdate::submitted(Utc::now()),
        )
        .await;
    assert!(matches!(missing, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn list_orders_filters_and_pages() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;

    for n in 1..=3 {
        let mut order = new_order(&fixture, &format!("ORD-2026-{n:05}"));
        order.created_at = Utc::now() + chrono::Duration::seconds(n);
        store.create_order(order).await.unwrap();
    }

    let page = store
        .list_orders(OrderQuery::new().take(2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.orders.len(), 2);
    assert_eq!(page.orders[0].order_number, "ORD-2026-00003");

    let by_other_user = store
        .list_orders(OrderQuery::new().created_by(UserId::new()))
        .await
        .unwrap();
    assert_eq!(by_other_user.total, 0);

    let drafts = store
        .list_orders(OrderQuery::new().status(OrderStatus::Draft))
        .await
        .unwrap();
    assert_eq!(drafts.total, 3);
}

#[tokio::test]
#[serial]
async fn delivery_job_conditional_updates() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let order = store
        .create_order(new_order(&fixture, "ORD-2026-00001"))
        .await
        .unwrap();

    let job = store
        .insert_delivery_job(NewDeliveryJob {
            id: DeliveryJobId::new(),
            order_id: order.id,
            factory_id: fixture.factory,
            recipients: vec!["orders@northwind.test".to_string()],
            subject: "New Order: ORD-2026-00001".to_string(),
            max_attempts: 3,
        })
        .await
        .unwrap();
    assert_eq!(job.status, DeliveryJobStatus::Pending);
    assert_eq!(job.recipients, vec!["orders@northwind.test".to_string()]);

    let processing = store
        .update_delivery_job(
            job.id,
            DeliveryJobStatus::Pending,
            DeliveryJobUpdate {
                status: DeliveryJobStatus::Processing,
                attempts: 1,
                last_error: None,
                sent_at: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(processing.attempts, 1);

    let stale = store
        .update_delivery_job(
            job.id,
            DeliveryJobStatus::Pending,
            DeliveryJobUpdate {
                status: DeliveryJobStatus::Processing,
                attempts: 2,
                last_error: None,
                sent_at: None,
            },
        )
        .await;
    assert!(matches!(stale, Err(StoreError::StatusConflict { .. })));

    let jobs = store.list_delivery_jobs(order.id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, DeliveryJobStatus::Processing);

    let found = store
        .find_stale_jobs(DeliveryJobStatus::Processing, Utc::now())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
#[serial]
async fn one_delivery_job_per_order() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let order = store
        .create_order(new_order(&fixture, "ORD-2026-00001"))
        .await
        .unwrap();
    let job_for = |order_id| NewDeliveryJob {
        id: DeliveryJobId::new(),
        order_id,
        factory_id: fixture.factory,
        recipients: vec!["orders@northwind.test".to_string()],
        subject: "New Order: ORD-2026-00001".to_string(),
        max_attempts: 3,
    };

    store.insert_delivery_job(job_for(order.id)).await.unwrap();
    let second = store.insert_delivery_job(job_for(order.id)).await;

    assert!(matches!(second, Err(StoreError::Duplicate { .. })));
    assert_eq!(store.list_delivery_jobs(order.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn graph_and_audit_trail() {
    let store = get_test_store().await;
    let fixture = seed(&store).await;
    let order = store
        .create_order(new_order(&fixture, "ORD-2026-00001"))
        .await
        .unwrap();

    let graph = store.load_order_graph(order.id).await.unwrap().unwrap();
    assert_eq!(graph.organization.name, "Acme Retail");
    assert_eq!(graph.lines.len(), 1);
    assert_eq!(graph.lines[0].variant.name, "M / Blue");

    store
        .append_audit_entry(NewAuditEntry {
            action: AuditAction::Create,
            entity_type: "Order".to_string(),
            entity_id: order.id.as_uuid(),
            user_id: fixture.user,
            order_id: Some(order.id),
            changes: serde_json::json!({"orderNumber": order.order_number}),
        })
        .await
        .unwrap();

    let trail = store.list_audit_entries(order.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, AuditAction::Create);
    assert_eq!(trail[0].changes["orderNumber"], "ORD-2026-00001");
}
