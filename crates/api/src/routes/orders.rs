//! Checkout, payment and refund endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::PaymentOutcome;
use chrono::{DateTime, Utc};
use common::{BuyerId, OrderStatus};
use domain::{Order, PurchaseRequest};
use serde::{Deserialize, Serialize};
use store::{LineRequest, StatusHistoryRecord, TicketingStore};

use super::parse_order_id;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

/// Any price a client sends along is ignored: prices come from the catalog.
#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub buyer_id: String,
    pub event_id: String,
    #[serde(default)]
    pub lines: Vec<OrderLineRequest>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub ticket_type_id: String,
    pub quantity: u32,
}

fn default_payment_method() -> String {
    "card".to_string()
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub buyer_id: String,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct RefundDecisionRequest {
    pub operator: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer_id: String,
    pub event_id: String,
    pub status: OrderStatus,
    pub payment_method: String,
    pub lines: Vec<OrderLineResponse>,
    pub subtotal_cents: i64,
    pub service_fee_cents: i64,
    pub net_amount_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
    pub refund_reason: Option<String>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub refund_approved_by: Option<String>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub ticket_type_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id().to_string(),
            buyer_id: order.buyer_id().to_string(),
            event_id: order.event_id().to_string(),
            status: order.status(),
            payment_method: order.payment_method().to_string(),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    ticket_type_id: line.ticket_type_id.to_string(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                    line_total_cents: line.line_total().cents(),
                })
                .collect(),
            subtotal_cents: order.subtotal().cents(),
            service_fee_cents: order.service_fee().cents(),
            net_amount_cents: order.net_amount().cents(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
            version: order.version(),
            refund_reason: order.refund_reason().map(str::to_string),
            refund_requested_at: order.refund_requested_at(),
            refund_approved_by: order.refund_approved_by().map(str::to_string),
        }
    }
}

#[derive(Serialize)]
pub struct HistoryEntryResponse {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: String,
    pub changed_at: DateTime<Utc>,
}

impl From<StatusHistoryRecord> for HistoryEntryResponse {
    fn from(entry: StatusHistoryRecord) -> Self {
        Self {
            from: entry.from,
            to: entry.to,
            actor: entry.actor,
            changed_at: entry.changed_at,
        }
    }
}

#[derive(Serialize)]
pub struct BuyerOrdersResponse {
    pub buyer_id: String,
    pub orders: Vec<OrderResponse>,
}

// -- Handlers --

/// POST /orders
#[tracing::instrument(skip(state, req))]
pub async fn create<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let lines = req
        .lines
        .into_iter()
        .map(|line| LineRequest::new(line.ticket_type_id, line.quantity))
        .collect();
    let request = PurchaseRequest::new(req.buyer_id, req.event_id, lines, req.payment_method);

    let order = state.checkout.checkout(request).await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.checkout.get_order(order_id).await?;
    Ok(Json(order.into()))
}

/// GET /orders/{id}/history
#[tracing::instrument(skip(state))]
pub async fn history<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntryResponse>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let entries = state.checkout.history(order_id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// GET /buyers/{id}/orders
#[tracing::instrument(skip(state))]
pub async fn list_for_buyer<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(buyer_id): Path<String>,
) -> Result<Json<BuyerOrdersResponse>, ApiError> {
    let orders = state
        .checkout
        .orders_for_buyer(&BuyerId::new(buyer_id.as_str()))
        .await?;

    Ok(Json(BuyerOrdersResponse {
        buyer_id,
        orders: orders.into_iter().map(Into::into).collect(),
    }))
}

/// POST /orders/{id}/pay
#[tracing::instrument(skip(state))]
pub async fn pay<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.checkout.pay(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/payment-callback
#[tracing::instrument(skip(state, outcome))]
pub async fn payment_callback<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(outcome): Json<PaymentOutcome>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .checkout
        .handle_payment_callback(order_id, outcome)
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/refund
#[tracing::instrument(skip(state, req))]
pub async fn request_refund<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .checkout
        .request_refund(order_id, &BuyerId::new(req.buyer_id), req.reason)
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/refund/approve
#[tracing::instrument(skip(state, req))]
pub async fn approve_refund<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundDecisionRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .checkout
        .approve_refund(order_id, req.operator)
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/refund/reject
#[tracing::instrument(skip(state, req))]
pub async fn reject_refund<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundDecisionRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.checkout.reject_refund(order_id, req.operator).await?;
    Ok(Json(order.into()))
}
