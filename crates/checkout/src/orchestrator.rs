//! Checkout orchestrator.

use std::sync::Arc;
use std::time::Instant;

use common::{BuyerId, OrderId, OrderStatus, TicketTypeId};
use domain::{
    Actor, Clock, DomainError, InventoryLedger, Order, OrderError, OrderRepository, PricingEngine,
    PurchaseRequest,
};
use store::{StatusHistoryRecord, TicketingStore};

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::gateway::{PaymentGateway, PaymentOutcome};

/// Entry point for purchases and the payment and refund flows that follow.
///
/// A purchase is priced, reserved and persisted as one logical unit: the
/// store inserts the order in the same unit of work as its reservation, so
/// a rejected or failed checkout leaves no inventory held. Payment calls
/// always happen after that unit of work has committed.
pub struct CheckoutOrchestrator<S: TicketingStore> {
    pricing: PricingEngine<S>,
    ledger: InventoryLedger<S>,
    orders: OrderRepository<S>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    config: CheckoutConfig,
}

impl<S: TicketingStore + Clone> CheckoutOrchestrator<S> {
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            pricing: PricingEngine::new(store.clone(), config.fee_rate),
            ledger: InventoryLedger::new(store.clone()),
            orders: OrderRepository::new(store, clock.clone(), config.refund_policy),
            gateway,
            clock,
            config,
        }
    }
}

impl<S: TicketingStore> CheckoutOrchestrator<S> {
    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Prices, reserves and persists a `pending` order.
    ///
    /// Rejections (`EmptyOrder`, `InvalidQuantity`, `BuyerRequired`,
    /// `UnknownTicketType`, `InsufficientInventory`) leave nothing behind
    /// and are safe to retry with corrected input.
    #[tracing::instrument(
        skip(self, request),
        fields(buyer_id = %request.buyer_id, event_id = %request.event_id)
    )]
    pub async fn checkout(&self, request: PurchaseRequest) -> Result<Order> {
        metrics::counter!("checkout_requests_total").increment(1);

        let result = self.place(&request).await;
        if let Err(e) = &result {
            metrics::counter!("checkout_rejections_total", "code" => e.code()).increment(1);
            tracing::info!(code = e.code(), error = %e, "Checkout rejected");
        }
        result
    }

    async fn place(&self, request: &PurchaseRequest) -> Result<Order> {
        request.validate()?;
        let quote = self.pricing.price(&request.event_id, &request.lines).await?;
        let order = self.orders.create(request, quote).await?;
        Ok(order)
    }

    /// Charges a `pending` order synchronously.
    ///
    /// Authorized orders become `paid`. Declines, transport errors and
    /// timeouts fail the order and release its tickets; the failed order is
    /// returned. `PaymentTimeout` is only returned when failing the order
    /// did not succeed either.
    #[tracing::instrument(skip(self))]
    pub async fn pay(&self, order_id: OrderId) -> Result<Order> {
        let order = self.orders.load(order_id).await?;
        if order.status() != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: order.status(),
                to: OrderStatus::Paid,
            }
            .into());
        }

        let start = Instant::now();
        let attempt = tokio::time::timeout(
            self.config.payment_timeout,
            self.gateway.authorize(
                order_id,
                order.buyer_id(),
                order.subtotal(),
                order.payment_method(),
            ),
        )
        .await;
        metrics::histogram!("payment_duration_seconds").record(start.elapsed().as_secs_f64());

        match attempt {
            Ok(Ok(outcome)) => self.apply_outcome(&order, &outcome).await,
            Ok(Err(e)) => {
                tracing::warn!(%order_id, error = %e, "Payment gateway failed");
                self.compensate(order_id).await
            }
            Err(_) => {
                metrics::counter!("payment_timeouts_total").increment(1);
                tracing::warn!(
                    %order_id,
                    timeout_ms = self.config.payment_timeout.as_millis() as u64,
                    "Payment timed out"
                );
                self.compensate(order_id).await
            }
        }
    }

    /// Applies an asynchronously delivered payment outcome.
    ///
    /// Only a `pending` order moves. A callback whose outcome the order
    /// already reflects returns it unchanged, including an authorization for
    /// an order that has since entered the refund flow. Any other outcome
    /// for a settled order fails with `InvalidTransition`.
    #[tracing::instrument(skip(self))]
    pub async fn handle_payment_callback(
        &self,
        order_id: OrderId,
        outcome: PaymentOutcome,
    ) -> Result<Order> {
        let order = self.orders.load(order_id).await?;
        self.apply_outcome(&order, &outcome).await
    }

    /// Fails every `pending` order older than the pending TTL, releasing
    /// its tickets. Returns the ids of the orders it failed.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale_orders(&self) -> Result<Vec<OrderId>> {
        let now = self.clock.now();
        let Some(cutoff) = chrono::Duration::from_std(self.config.pending_ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return Ok(Vec::new());
        };

        let stale = self.orders.find_pending_created_before(cutoff).await?;
        let mut expired = Vec::with_capacity(stale.len());

        for order in stale {
            match self
                .orders
                .transition_status(order.id(), OrderStatus::Failed, Actor::System)
                .await
            {
                Ok(_) => expired.push(order.id()),
                // Paid or failed by someone else since it was read.
                Err(DomainError::ConcurrentModification { .. })
                | Err(DomainError::Order(OrderError::InvalidTransition { .. })) => {
                    tracing::debug!(order_id = %order.id(), "Stale order already settled");
                }
                Err(e) => {
                    tracing::error!(order_id = %order.id(), error = %e, "Failed to expire order");
                }
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired stale pending orders");
        }
        Ok(expired)
    }

    /// Moves a paid order to `refund_pending` for its buyer.
    #[tracing::instrument(skip(self, reason))]
    pub async fn request_refund(
        &self,
        order_id: OrderId,
        buyer_id: &BuyerId,
        reason: Option<String>,
    ) -> Result<Order> {
        Ok(self.orders.request_refund(order_id, buyer_id, reason).await?)
    }

    /// Returns the buyer's money, then moves the order to `refunded` and
    /// releases its tickets.
    ///
    /// The order is claimed for `operator` before the gateway is called, so
    /// a concurrent approval or rejection fails with `RefundInProgress` or
    /// `ConcurrentModification` and never reaches the gateway. If the
    /// gateway refund fails the claim is withdrawn and the order stays
    /// `refund_pending`.
    #[tracing::instrument(skip(self))]
    pub async fn approve_refund(&self, order_id: OrderId, operator: String) -> Result<Order> {
        let claimed = self.orders.approve_refund(order_id, &operator).await?;

        if let Err(e) = self.gateway.refund(order_id, claimed.subtotal()).await {
            tracing::warn!(%order_id, error = %e, "Refund payout failed");
            if let Err(withdraw) = self.orders.withdraw_refund_approval(&claimed).await {
                tracing::error!(
                    %order_id,
                    error = %withdraw,
                    "Could not withdraw refund approval after payout failure"
                );
            }
            return Err(e.into());
        }

        // TODO: an approved order whose move to `refunded` fails here stays
        // claimed; a reconciliation job should finish it without paying twice.
        Ok(self
            .orders
            .transition_from(&claimed, OrderStatus::Refunded, Actor::Operator(operator))
            .await?)
    }

    /// Reverts a `refund_pending` order to `paid`.
    ///
    /// Fails with `RefundInProgress` once the refund has been approved.
    #[tracing::instrument(skip(self))]
    pub async fn reject_refund(&self, order_id: OrderId, operator: String) -> Result<Order> {
        let order = self.orders.load(order_id).await?;
        if order.status() != OrderStatus::RefundPending {
            return Err(OrderError::InvalidTransition {
                from: order.status(),
                to: OrderStatus::Paid,
            }
            .into());
        }

        Ok(self
            .orders
            .transition_from(&order, OrderStatus::Paid, Actor::Operator(operator))
            .await?)
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.orders.load(order_id).await?)
    }

    pub async fn orders_for_buyer(&self, buyer_id: &BuyerId) -> Result<Vec<Order>> {
        Ok(self.orders.find_by_buyer(buyer_id).await?)
    }

    pub async fn history(&self, order_id: OrderId) -> Result<Vec<StatusHistoryRecord>> {
        Ok(self.orders.history(order_id).await?)
    }

    pub async fn availability(&self, ticket_type_id: &TicketTypeId) -> Result<u32> {
        Ok(self.ledger.availability(ticket_type_id).await?)
    }

    /// Applies `outcome` to `order` as it was read.
    async fn apply_outcome(&self, order: &Order, outcome: &PaymentOutcome) -> Result<Order> {
        let order_id = order.id();
        let target = match outcome {
            PaymentOutcome::Authorized { .. } => OrderStatus::Paid,
            PaymentOutcome::Declined { reason } => {
                tracing::info!(%order_id, reason = reason.as_str(), "Payment declined");
                OrderStatus::Failed
            }
        };

        match self.orders.record_payment_outcome(order, target).await {
            Ok(order) => Ok(order),
            Err(DomainError::ConcurrentModification { .. }) => {
                // Another delivery of the same outcome may have won the race.
                let current = self.orders.load(order_id).await?;
                match current.plan_payment_outcome(target, self.clock.now())? {
                    None => Ok(current),
                    Some(_) => Err(DomainError::ConcurrentModification { order_id }.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fails a `pending` order after an unsuccessful payment attempt.
    async fn compensate(&self, order_id: OrderId) -> Result<Order> {
        match self
            .orders
            .transition_status(order_id, OrderStatus::Failed, Actor::System)
            .await
        {
            Ok(order) => Ok(order),
            Err(e) => {
                // A callback may have settled the order meanwhile.
                if let Ok(current) = self.orders.load(order_id).await
                    && current.status() != OrderStatus::Pending
                {
                    return Ok(current);
                }
                tracing::error!(%order_id, error = %e, "Could not fail order after payment error");
                Err(CheckoutError::PaymentTimeout { order_id })
            }
        }
    }
}
