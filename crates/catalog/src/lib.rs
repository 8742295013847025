//! Relational catalog store for the order platform.
//!
//! Organizations, factories, products, variants, price lists, orders,
//! delivery jobs and the audit trail live behind the [`CatalogStore`] trait,
//! with an in-memory implementation for tests and single-process use and a
//! PostgreSQL implementation for deployments.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryCatalogStore;
pub use model::{
    AuditEntry, DeliveryJob, DeliveryJobUpdate, Factory, NewAuditEntry, NewDeliveryJob, NewOrder,
    NewOrderItem, Order, OrderGraph, OrderItem, OrderLine, OrderStatusUpdate, Organization, Price,
    PriceList, Product, ProductVariant, User,
};
pub use postgres::PostgresCatalogStore;
pub use query::{DEFAULT_TAKE, OrderPage, OrderQuery};
pub use store::{CatalogStore, CatalogStoreExt};
