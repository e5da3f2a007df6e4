//! HTTP API server with observability for the ticketing core.
//!
//! Provides REST endpoints for checkout, payment, refunds and catalog
//! administration, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{CheckoutConfig, CheckoutOrchestrator, InMemoryPaymentGateway, PaymentGateway};
use domain::{Clock, SystemClock};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryTicketingStore, TicketingStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, spawn_sweeper};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: TicketingStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health::<S>))
        .route("/events", post(routes::catalog::create_event::<S>))
        .route(
            "/events/{id}/ticket-types",
            post(routes::catalog::create_ticket_type::<S>),
        )
        .route(
            "/ticket-types/{id}/price",
            put(routes::catalog::update_price::<S>),
        )
        .route(
            "/ticket-types/{id}/availability",
            get(routes::catalog::availability::<S>),
        )
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/history", get(routes::orders::history::<S>))
        .route("/orders/{id}/pay", post(routes::orders::pay::<S>))
        .route(
            "/orders/{id}/payment-callback",
            post(routes::orders::payment_callback::<S>),
        )
        .route("/orders/{id}/refund", post(routes::orders::request_refund::<S>))
        .route(
            "/orders/{id}/refund/approve",
            post(routes::orders::approve_refund::<S>),
        )
        .route(
            "/orders/{id}/refund/reject",
            post(routes::orders::reject_refund::<S>),
        )
        .route("/buyers/{id}/orders", get(routes::orders::list_for_buyer::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over `store`.
pub fn create_state<S: TicketingStore + Clone + 'static>(
    store: S,
    backend: &'static str,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    config: CheckoutConfig,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        checkout: CheckoutOrchestrator::new(store.clone(), gateway, clock, config),
        store,
        backend,
    })
}

/// Creates the default application state with the in-memory store and gateway.
pub fn create_default_state(config: CheckoutConfig) -> Arc<AppState<InMemoryTicketingStore>> {
    create_state(
        InMemoryTicketingStore::new(),
        "memory",
        InMemoryPaymentGateway::shared(),
        Arc::new(SystemClock),
        config,
    )
}
