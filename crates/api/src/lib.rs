//! HTTP API server for the order platform.
//!
//! REST endpoints for creating, submitting and inspecting orders, guarded by
//! a capability layer, with structured logging (tracing) and Prometheus
//! metrics. The binary also runs the delivery consumer and the
//! reconciliation sweep.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use catalog::{CatalogStore, InMemoryCatalogStore};
use fulfillment::{InMemoryTaskQueue, TaskOptions, TaskQueue};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::{Capability, authorize};
pub use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
///
/// Every order route runs [`authorize`] with its capability before the
/// handler; `/health` and `/metrics` are open.
pub fn create_app<S, Q>(state: Arc<AppState<S, Q>>, metrics_handle: PrometheusHandle) -> Router
where
    S: CatalogStore + Clone + 'static,
    Q: TaskQueue + 'static,
{
    use routes::orders;

    let create = from_fn_with_state(Capability::CreateOrder, authorize);
    let submit = from_fn_with_state(Capability::SubmitOrder, authorize);
    let view = from_fn_with_state(Capability::ViewOrders, authorize);

    let orders = Router::new()
        .route("/orders", post(orders::create::<S, Q>).route_layer(create))
        .route("/orders", get(orders::list::<S, Q>).route_layer(view.clone()))
        .route("/orders/{id}", get(orders::get::<S, Q>).route_layer(view.clone()))
        .route(
            "/orders/{id}/submit",
            post(orders::submit::<S, Q>).route_layer(submit),
        )
        .route(
            "/orders/{id}/pdf",
            get(orders::document::<S, Q>).route_layer(view.clone()),
        )
        .route(
            "/orders/{id}/jobs",
            get(orders::jobs::<S, Q>).route_layer(view.clone()),
        )
        .route(
            "/orders/{id}/audit",
            get(orders::audit::<S, Q>).route_layer(view),
        )
        .with_state(state);

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(orders)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over an in-memory store and queue.
///
/// The store and queue are returned as well so the caller can seed data and
/// drive a consumer over the same instances.
pub fn create_default_state(
    options: TaskOptions,
) -> (
    Arc<AppState<InMemoryCatalogStore, InMemoryTaskQueue>>,
    InMemoryCatalogStore,
    InMemoryTaskQueue,
) {
    let store = InMemoryCatalogStore::new();
    let queue = InMemoryTaskQueue::new();
    let state = Arc::new(AppState::new(store.clone(), queue.clone(), options));
    (state, store, queue)
}
