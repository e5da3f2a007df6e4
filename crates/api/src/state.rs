//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use checkout::CheckoutOrchestrator;
use store::TicketingStore;
use tokio::task::JoinHandle;

/// Shared application state accessible from all handlers.
pub struct AppState<S: TicketingStore> {
    pub checkout: CheckoutOrchestrator<S>,
    /// Catalog administration goes straight to the store.
    pub store: S,
    /// Name of the storage backend, reported by `/health`.
    pub backend: &'static str,
}

/// Runs `expire_stale_orders` every `interval` until the task is aborted.
pub fn spawn_sweeper<S: TicketingStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match state.checkout.expire_stale_orders().await {
                Ok(expired) if !expired.is_empty() => {
                    tracing::info!(count = expired.len(), "sweeper failed stale orders");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "sweeper run failed"),
            }
        }
    })
}
