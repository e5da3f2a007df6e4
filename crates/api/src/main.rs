//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use checkout::InMemoryPaymentGateway;
use domain::SystemClock;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{PostgresTicketingStore, TicketingStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Serves the API over `state` until a shutdown signal arrives.
async fn serve<S: TicketingStore + Clone + 'static>(
    state: Arc<api::AppState<S>>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let sweeper = api::spawn_sweeper(state.clone(), config.sweep_interval());
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper.abort();
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store and serve
    let checkout_config = config.checkout();
    tracing::info!(
        fee_rate = %checkout_config.fee_rate,
        payment_timeout_ms = config.payment_timeout_ms,
        pending_order_ttl_secs = config.pending_order_ttl_secs,
        "checkout configured"
    );

    match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(20)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresTicketingStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");

            let state = api::create_state(
                store,
                "postgres",
                Arc::new(InMemoryPaymentGateway::new()),
                Arc::new(SystemClock),
                checkout_config,
            );
            serve(state, &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            let state = api::create_default_state(checkout_config);
            serve(state, &config, metrics_handle).await;
        }
    }
}
