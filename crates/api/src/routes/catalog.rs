//! Catalog administration endpoints.
//!
//! These exist for tooling and tests. They seed events and ticket types and
//! change catalog prices; they never touch existing orders.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{EventId, Money, TicketTypeId};
use serde::{Deserialize, Serialize};
use store::{EventRecord, TicketTypeRecord, TicketingStore};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub id: String,
    pub name: String,
    pub starts_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct CreateTicketTypeRequest {
    pub id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub total_quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdatePriceRequest {
    pub unit_price_cents: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct EventResponse {
    pub id: String,
    pub name: String,
    pub starts_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct TicketTypeResponse {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub total_quantity: u32,
    pub available: u32,
}

impl From<TicketTypeRecord> for TicketTypeResponse {
    fn from(t: TicketTypeRecord) -> Self {
        Self {
            id: t.id.to_string(),
            event_id: t.event_id.to_string(),
            name: t.name,
            unit_price_cents: t.unit_price.cents(),
            total_quantity: t.total_quantity,
            available: t.available,
        }
    }
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub ticket_type_id: String,
    pub available: u32,
}

// -- Handlers --

/// POST /events
#[tracing::instrument(skip(state, req), fields(event_id = %req.id))]
pub async fn create_event<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    let id = EventId::new(req.id);
    if id.is_blank() {
        return Err(ApiError::bad_request("invalid_event", "Event id is required"));
    }

    let event = EventRecord::new(id, req.name, req.starts_at);
    state.store.insert_event(event.clone()).await?;

    Ok((
        StatusCode::CREATED,
        Json(EventResponse {
            id: event.id.to_string(),
            name: event.name,
            starts_at: event.starts_at,
        }),
    ))
}

/// POST /events/{id}/ticket-types
#[tracing::instrument(skip(state, req), fields(ticket_type_id = %req.id))]
pub async fn create_ticket_type<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(event_id): Path<String>,
    Json(req): Json<CreateTicketTypeRequest>,
) -> Result<(StatusCode, Json<TicketTypeResponse>), ApiError> {
    let id = TicketTypeId::new(req.id);
    if id.is_blank() {
        return Err(ApiError::bad_request(
            "invalid_ticket_type",
            "Ticket type id is required",
        ));
    }
    if req.total_quantity == 0 {
        return Err(ApiError::bad_request(
            "invalid_ticket_type",
            "Total quantity must be positive",
        ));
    }
    let unit_price = parse_price(req.unit_price_cents)?;

    let ticket_type = TicketTypeRecord::new(id, event_id, req.name, unit_price, req.total_quantity);
    state.store.insert_ticket_type(ticket_type.clone()).await?;

    Ok((StatusCode::CREATED, Json(ticket_type.into())))
}

/// PUT /ticket-types/{id}/price
#[tracing::instrument(skip(state, req))]
pub async fn update_price<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePriceRequest>,
) -> Result<Json<TicketTypeResponse>, ApiError> {
    let id = TicketTypeId::new(id);
    let unit_price = parse_price(req.unit_price_cents)?;

    state.store.update_unit_price(&id, unit_price).await?;
    let ticket_type = state
        .store
        .get_ticket_type(&id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found("unknown_ticket_type", format!("Unknown ticket type: {id}"))
        })?;

    Ok(Json(ticket_type.into()))
}

/// GET /ticket-types/{id}/availability
#[tracing::instrument(skip(state))]
pub async fn availability<S: TicketingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let id = TicketTypeId::new(id);
    let available = state.checkout.availability(&id).await.map_err(|e| {
        if e.code() == "unknown_ticket_type" {
            ApiError::not_found("unknown_ticket_type", e.to_string())
        } else {
            e.into()
        }
    })?;

    Ok(Json(AvailabilityResponse {
        ticket_type_id: id.to_string(),
        available,
    }))
}

fn parse_price(cents: i64) -> Result<Money, ApiError> {
    if cents < 0 {
        return Err(ApiError::bad_request(
            "invalid_price",
            "Unit price must not be negative",
        ));
    }
    Ok(Money::from_cents(cents))
}
