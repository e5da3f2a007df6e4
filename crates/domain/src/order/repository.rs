//! Order repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{BuyerId, OrderId, OrderStatus};
use store::{
    OrderRecord, PlaceOrderOutcome, RefundApproval, StatusChange, StatusHistoryRecord,
    TicketingStore,
};

use super::{Actor, Order, PurchaseRequest};
use crate::clock::Clock;
use crate::error::{DomainError, OrderError};
use crate::pricing::Quote;
use crate::refund::RefundPolicy;

/// Creates, transitions and reads orders.
///
/// Creation and inventory-releasing transitions are single store units of
/// work, so an order's status and its inventory effect are always recorded
/// together.
#[derive(Clone)]
pub struct OrderRepository<S: TicketingStore> {
    store: S,
    clock: Arc<dyn Clock>,
    refund_policy: RefundPolicy,
}

impl<S: TicketingStore> OrderRepository<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, refund_policy: RefundPolicy) -> Self {
        Self {
            store,
            clock,
            refund_policy,
        }
    }

    pub fn refund_policy(&self) -> &RefundPolicy {
        &self.refund_policy
    }

    /// Reserves the quote's lines and persists a `pending` order with the
    /// quoted prices, or does neither.
    #[tracing::instrument(
        skip(self, request, quote),
        fields(buyer_id = %request.buyer_id, event_id = %request.event_id)
    )]
    pub async fn create(
        &self,
        request: &PurchaseRequest,
        quote: Quote,
    ) -> Result<Order, DomainError> {
        let now = self.clock.now();
        let record = OrderRecord {
            id: OrderId::new(),
            buyer_id: request.buyer_id.clone(),
            event_id: request.event_id.clone(),
            lines: quote.lines.iter().map(Into::into).collect(),
            subtotal: quote.subtotal,
            service_fee: quote.service_fee,
            net_amount: quote.net_amount,
            status: OrderStatus::Pending,
            payment_method: request.payment_method.clone(),
            created_at: now,
            updated_at: now,
            version: 1,
            refund_reason: None,
            refund_requested_at: None,
            refund_approved_by: None,
        };

        match self.store.place_order(record).await? {
            PlaceOrderOutcome::Placed(record) => {
                for line in &record.lines {
                    metrics::counter!("inventory_units_reserved_total")
                        .increment(u64::from(line.quantity));
                }
                tracing::info!(order_id = %record.id, "Order placed");
                Ok(record.into())
            }
            PlaceOrderOutcome::Rejected(shortfall) => Err(OrderError::InsufficientInventory {
                ticket_type_id: shortfall.ticket_type_id,
                requested: shortfall.requested,
                available: shortfall.available,
            }
            .into()),
        }
    }

    /// Moves an order to `target`, releasing its tickets when the transition
    /// requires it.
    ///
    /// A move to `refund_pending` must come from the order's buyer and is
    /// checked against the refund policy.
    #[tracing::instrument(skip(self))]
    pub async fn transition_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<Order, DomainError> {
        if target == OrderStatus::RefundPending {
            return match actor {
                Actor::Buyer(buyer_id) => self.request_refund(order_id, &buyer_id, None).await,
                _ => Err(OrderError::NotOrderOwner { order_id }.into()),
            };
        }

        let order = self.load(order_id).await?;
        self.transition_from(&order, target, actor).await
    }

    /// Moves `order` to `target` only if it is still at the version it was
    /// read at; otherwise fails with `ConcurrentModification`.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub async fn transition_from(
        &self,
        order: &Order,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<Order, DomainError> {
        let change = order.plan_transition(target, &actor, self.clock.now())?;
        self.apply(change).await
    }

    /// Applies a payment outcome to `order`, which must still be at the
    /// version it was read at.
    ///
    /// An outcome the order already reflects returns it unchanged.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub async fn record_payment_outcome(
        &self,
        order: &Order,
        target: OrderStatus,
    ) -> Result<Order, DomainError> {
        match order.plan_payment_outcome(target, self.clock.now())? {
            Some(change) => self.apply(change).await,
            None => {
                tracing::debug!(status = %order.status(), "Payment outcome already applied");
                Ok(order.clone())
            }
        }
    }

    /// Claims a `refund_pending` order for `operator` so that no other
    /// approval or rejection can act on it while its money is returned.
    #[tracing::instrument(skip(self))]
    pub async fn approve_refund(
        &self,
        order_id: OrderId,
        operator: &str,
    ) -> Result<Order, DomainError> {
        let order = self.load(order_id).await?;
        let approval = order.plan_refund_approval(operator, self.clock.now())?;
        self.set_approval(approval).await
    }

    /// Withdraws the approval on `order` after its refund could not be paid.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub async fn withdraw_refund_approval(&self, order: &Order) -> Result<Order, DomainError> {
        let approval = order.plan_approval_withdrawal(self.clock.now());
        self.set_approval(approval).await
    }

    /// Moves a paid order to `refund_pending` on its buyer's behalf.
    #[tracing::instrument(skip(self, reason))]
    pub async fn request_refund(
        &self,
        order_id: OrderId,
        buyer_id: &BuyerId,
        reason: Option<String>,
    ) -> Result<Order, DomainError> {
        let order = self.load(order_id).await?;
        let event = self
            .store
            .get_event(order.event_id())
            .await?
            .ok_or_else(|| DomainError::EventNotFound(order.event_id().clone()))?;

        let change = order.plan_refund_request(
            buyer_id,
            reason,
            event.starts_at,
            &self.refund_policy,
            self.clock.now(),
        )?;
        self.apply(change).await
    }

    pub async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.store.get_order(order_id).await?.map(Order::from))
    }

    /// A buyer's orders, newest first.
    pub async fn find_by_buyer(&self, buyer_id: &BuyerId) -> Result<Vec<Order>, DomainError> {
        let records = self.store.get_orders_by_buyer(buyer_id).await?;
        Ok(records.into_iter().map(Order::from).collect())
    }

    /// `pending` orders created before `cutoff`, oldest first.
    pub async fn find_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, DomainError> {
        let records = self.store.get_pending_orders_created_before(cutoff).await?;
        Ok(records.into_iter().map(Order::from).collect())
    }

    /// The order's status changes in the order they happened.
    pub async fn history(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<StatusHistoryRecord>, DomainError> {
        self.load(order_id).await?;
        Ok(self.store.get_status_history(order_id).await?)
    }

    /// Loads an order or fails with `OrderNotFound`.
    pub async fn load(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.find_by_id(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    async fn set_approval(&self, approval: RefundApproval) -> Result<Order, DomainError> {
        let order_id = approval.order_id;
        let approved = approval.approved_by.is_some();

        match self.store.set_refund_approval(approval).await {
            Ok(record) => {
                tracing::info!(%order_id, approved, "Refund approval updated");
                Ok(record.into())
            }
            Err(e) => {
                let err = DomainError::from(e);
                if let DomainError::ConcurrentModification { .. } = err {
                    tracing::warn!(%order_id, approved, "Order changed concurrently");
                }
                Err(err)
            }
        }
    }

    async fn apply(&self, change: StatusChange) -> Result<Order, DomainError> {
        let order_id = change.order_id;
        let from = change.from;
        let to = change.to;
        let releases = change.releases_inventory();

        match self.store.transition_order(change).await {
            Ok(record) => {
                metrics::counter!("order_transitions_total", "to" => to.as_str()).increment(1);
                if releases {
                    for line in &record.lines {
                        metrics::counter!("inventory_units_released_total")
                            .increment(u64::from(line.quantity));
                    }
                }
                tracing::info!(%order_id, %from, %to, released = releases, "Order transitioned");
                Ok(record.into())
            }
            Err(e) => {
                let err = DomainError::from(e);
                match &err {
                    DomainError::ConsistencyViolation {
                        ticket_type_id,
                        available,
                        total,
                        quantity,
                    } => {
                        tracing::error!(
                            %order_id,
                            %from,
                            %to,
                            %ticket_type_id,
                            available,
                            total,
                            quantity,
                            "Releasing order inventory would exceed total"
                        );
                        metrics::counter!("inventory_consistency_violations_total").increment(1);
                    }
                    DomainError::ConcurrentModification { .. } => {
                        tracing::warn!(%order_id, %from, %to, "Order changed concurrently");
                    }
                    _ => {}
                }
                Err(err)
            }
        }
    }
}
