//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::{DomainError, OrderError};
use serde_json::{Map, Value, json};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// Every response body has the shape
/// `{"error": {"code": ..., "message": ..., ...details}}`.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound { code: &'static str, message: String },
    /// Bad request from the client.
    BadRequest { code: &'static str, message: String },
    /// Checkout, payment or refund error.
    Checkout(CheckoutError),
    /// Catalog administration error.
    Store(StoreError),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::NotFound {
            code,
            message: message.into(),
        }
    }
}

/// Status, code, message and extra detail fields of an error response.
type ErrorParts = (StatusCode, &'static str, String, Map<String, Value>);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            ApiError::NotFound { code, message } => {
                (StatusCode::NOT_FOUND, code, message, Map::new())
            }
            ApiError::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, code, message, Map::new())
            }
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
        };

        metrics::counter!("http_errors_total", "code" => code).increment(1);
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }

        let mut error = Map::new();
        error.insert("code".to_string(), json!(code));
        error.insert("message".to_string(), json!(message));
        error.extend(details);

        (status, axum::Json(json!({ "error": error }))).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> ErrorParts {
    let code = err.code();
    let message = err.to_string();
    let mut details = Map::new();

    let status = match &err {
        CheckoutError::Domain(DomainError::Order(order_err)) => {
            order_error_details(order_err, &mut details);
            match order_err {
                OrderError::EmptyOrder
                | OrderError::InvalidQuantity { .. }
                | OrderError::BuyerRequired => StatusCode::BAD_REQUEST,
                OrderError::UnknownTicketType { .. } | OrderError::AmountTooLarge => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                OrderError::NotOrderOwner { .. } => StatusCode::FORBIDDEN,
                OrderError::InsufficientInventory { .. }
                | OrderError::InvalidTransition { .. }
                | OrderError::IneligibleForRefund { .. }
                | OrderError::RefundInProgress { .. } => StatusCode::CONFLICT,
            }
        }
        CheckoutError::Domain(DomainError::OrderNotFound(order_id)) => {
            details.insert("order_id".to_string(), json!(order_id));
            StatusCode::NOT_FOUND
        }
        CheckoutError::Domain(DomainError::EventNotFound(event_id)) => {
            details.insert("event_id".to_string(), json!(event_id));
            StatusCode::NOT_FOUND
        }
        CheckoutError::Domain(DomainError::ConcurrentModification { order_id }) => {
            details.insert("order_id".to_string(), json!(order_id));
            StatusCode::CONFLICT
        }
        CheckoutError::Domain(DomainError::ConsistencyViolation { ticket_type_id, .. }) => {
            details.insert("ticket_type_id".to_string(), json!(ticket_type_id));
            StatusCode::INTERNAL_SERVER_ERROR
        }
        CheckoutError::Domain(DomainError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        CheckoutError::PaymentTimeout { order_id } => {
            details.insert("order_id".to_string(), json!(order_id));
            StatusCode::GATEWAY_TIMEOUT
        }
        CheckoutError::Gateway(_) => StatusCode::BAD_GATEWAY,
    };

    (status, code, message, details)
}

fn order_error_details(err: &OrderError, details: &mut Map<String, Value>) {
    match err {
        OrderError::InvalidQuantity {
            ticket_type_id,
            quantity,
        } => {
            details.insert("ticket_type_id".to_string(), json!(ticket_type_id));
            details.insert("quantity".to_string(), json!(quantity));
        }
        OrderError::UnknownTicketType { ticket_type_id } => {
            details.insert("ticket_type_id".to_string(), json!(ticket_type_id));
        }
        OrderError::InsufficientInventory {
            ticket_type_id,
            requested,
            available,
        } => {
            details.insert("ticket_type_id".to_string(), json!(ticket_type_id));
            details.insert("requested".to_string(), json!(requested));
            details.insert("available".to_string(), json!(available));
        }
        OrderError::InvalidTransition { from, to } => {
            details.insert("from".to_string(), json!(from));
            details.insert("to".to_string(), json!(to));
        }
        OrderError::IneligibleForRefund { reason } => {
            details.insert("reason".to_string(), json!(reason));
        }
        OrderError::NotOrderOwner { order_id } | OrderError::RefundInProgress { order_id } => {
            details.insert("order_id".to_string(), json!(order_id));
        }
        OrderError::EmptyOrder | OrderError::BuyerRequired | OrderError::AmountTooLarge => {}
    }
}

fn store_error_to_response(err: StoreError) -> ErrorParts {
    let message = err.to_string();
    let mut details = Map::new();

    let (status, code) = match &err {
        StoreError::UnknownEvent(event_id) => {
            details.insert("event_id".to_string(), json!(event_id));
            (StatusCode::NOT_FOUND, "event_not_found")
        }
        StoreError::UnknownTicketType(ticket_type_id) => {
            details.insert("ticket_type_id".to_string(), json!(ticket_type_id));
            (StatusCode::NOT_FOUND, "unknown_ticket_type")
        }
        StoreError::Duplicate { kind, id } => {
            details.insert("kind".to_string(), json!(kind));
            details.insert("id".to_string(), json!(id));
            (StatusCode::CONFLICT, "duplicate")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };

    (status, code, message, details)
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
