//! Order endpoints: creation, submission and queries.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use catalog::{AuditEntry, CatalogStore, DeliveryJob, Order, OrderQuery};
use common::{FactoryId, OrderId, OrderStatus, PriceListId, VariantId};
use domain::{CreateOrder, OrderDetails, OrderDocument, OrderService, RequestedItem};
use fulfillment::{FulfillmentDispatcher, SubmissionReceipt, TaskOptions, TaskQueue};
use serde::{Deserialize, Serialize};

use crate::auth::Actor;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CatalogStore, Q: TaskQueue> {
    pub order_service: OrderService<S>,
    pub dispatcher: FulfillmentDispatcher<S, Q>,
}

impl<S, Q> AppState<S, Q>
where
    S: CatalogStore + Clone,
    Q: TaskQueue,
{
    pub fn new(store: S, queue: Q, options: TaskOptions) -> Self {
        Self {
            order_service: OrderService::new(store.clone()),
            dispatcher: FulfillmentDispatcher::new(store, queue, options),
        }
    }
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub factory_id: FactoryId,
    pub price_list_id: Option<PriceListId>,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub variant_id: VariantId,
    pub quantity: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersParams {
    pub skip: Option<u32>,
    pub take: Option<u32>,
    pub status: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderListResponse {
    pub data: Vec<Order>,
    pub meta: PageMeta,
}

#[derive(Serialize)]
pub struct PageMeta {
    pub total: u64,
    pub skip: u32,
    pub take: u32,
}

// -- Handlers --

/// POST /orders: create a draft order for the caller's organization.
#[tracing::instrument(skip(state, req), fields(user_id = %actor.user_id))]
pub async fn create<S, Q>(
    State(state): State<Arc<AppState<S, Q>>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetails>), ApiError>
where
    S: CatalogStore + Clone + 'static,
    Q: TaskQueue + 'static,
{
    let organization_id = actor.organization_id.ok_or_else(|| {
        ApiError::BadRequest("Caller does not belong to an organization".to_string())
    })?;

    let mut cmd = CreateOrder::new(req.factory_id, actor.user_id, organization_id);
    if let Some(price_list_id) = req.price_list_id {
        cmd = cmd.price_list(price_list_id);
    }
    if let Some(notes) = req.notes {
        cmd = cmd.notes(notes);
    }
    for item in req.items {
        let mut requested = RequestedItem::new(item.variant_id, item.quantity);
        if let Some(notes) = item.notes {
            requested = requested.with_notes(notes);
        }
        cmd = cmd.item(requested);
    }

    let details = state.order_service.create_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /orders: newest first. Sellers only see orders they created.
#[tracing::instrument(skip(state))]
pub async fn list<S, Q>(
    State(state): State<Arc<AppState<S, Q>>>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<OrderListResponse>, ApiError>
where
    S: CatalogStore + Clone + 'static,
    Q: TaskQueue + 'static,
{
    let mut query = OrderQuery::new();
    if let Some(skip) = params.skip {
        query = query.skip(skip);
    }
    if let Some(take) = params.take {
        query = query.take(take);
    }
    if let Some(status) = params.status.as_deref() {
        let status: OrderStatus = status
            .parse()
            .map_err(|e| ApiError::BadRequest(format!("Invalid status filter: {e}")))?;
        query = query.status(status);
    }
    if actor.is_seller() {
        query = query.created_by(actor.user_id);
    }

    let (skip, take) = (query.skip, query.take);
    let page = state.order_service.list_orders(query).await?;

    Ok(Json(OrderListResponse {
        data: page.orders,
        meta: PageMeta {
            total: page.total,
            skip,
            take,
        },
    }))
}

/// GET /orders/{id}: the order with its items and delivery jobs.
#[tracing::instrument(skip(state))]
pub async fn get<S, Q>(
    State(state): State<Arc<AppState<S, Q>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetails>, ApiError>
where
    S: CatalogStore + Clone + 'static,
    Q: TaskQueue + 'static,
{
    let order_id = parse_order_id(&id)?;
    let details = state
        .order_service
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(details))
}

/// POST /orders/{id}/submit: submit a draft and schedule its delivery.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn submit<S, Q>(
    State(state): State<Arc<AppState<S, Q>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<SubmissionReceipt>, ApiError>
where
    S: CatalogStore + Clone + 'static,
    Q: TaskQueue + 'static,
{
    let order_id = parse_order_id(&id)?;
    let receipt = state.dispatcher.submit(order_id, actor.user_id).await?;
    Ok(Json(receipt))
}

/// GET /orders/{id}/pdf: where the delivered order document is stored.
#[tracing::instrument(skip(state))]
pub async fn document<S, Q>(
    State(state): State<Arc<AppState<S, Q>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDocument>, ApiError>
where
    S: CatalogStore + Clone + 'static,
    Q: TaskQueue + 'static,
{
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.order_service.get_document(order_id).await?))
}

/// GET /orders/{id}/jobs
#[tracing::instrument(skip(state))]
pub async fn jobs<S, Q>(
    State(state): State<Arc<AppState<S, Q>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeliveryJob>>, ApiError>
where
    S: CatalogStore + Clone + 'static,
    Q: TaskQueue + 'static,
{
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.order_service.list_jobs(order_id).await?))
}

/// GET /orders/{id}/audit
#[tracing::instrument(skip(state))]
pub async fn audit<S, Q>(
    State(state): State<Arc<AppState<S, Q>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, ApiError>
where
    S: CatalogStore + Clone + 'static,
    Q: TaskQueue + 'static,
{
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.order_service.audit_trail(order_id).await?))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
