//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalog::StoreError;
use domain::{DomainError, OrderError};
use fulfillment::FulfillmentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No usable caller identity on the request.
    Unauthorized(String),
    /// The caller's role lacks the route's capability.
    Forbidden(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Submission or delivery error.
    Fulfillment(FulfillmentError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Domain(err) => (domain_status(&err), err.to_string()),
            ApiError::Fulfillment(err) => (fulfillment_status(&err), err.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Order(order_err) => match order_err {
            OrderError::ReferenceNotFound { .. }
            | OrderError::OrderNotFound(_)
            | OrderError::DocumentNotReady(_) => StatusCode::NOT_FOUND,
            OrderError::PriceUnavailable { .. }
            | OrderError::CurrencyMismatch { .. }
            | OrderError::InvalidQuantity { .. }
            | OrderError::EmptyOrder => StatusCode::BAD_REQUEST,
            OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
        },
        DomainError::Store(store_err) => store_status(store_err),
        DomainError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::StatusConflict { .. } | StoreError::Duplicate { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn fulfillment_status(err: &FulfillmentError) -> StatusCode {
    match err {
        FulfillmentError::Domain(domain_err) => domain_status(domain_err),
        FulfillmentError::Store(store_err) => store_status(store_err),
        FulfillmentError::OrderNotFound(_) | FulfillmentError::JobNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        FulfillmentError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}
