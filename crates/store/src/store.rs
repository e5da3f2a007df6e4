use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerId, EventId, Money, OrderId, TicketTypeId};

use crate::{
    EventRecord, LineRequest, OrderRecord, PlaceOrderOutcome, RefundApproval,
    ReservationOutcome, Result, StatusChange, StatusHistoryRecord, TicketTypeRecord,
};

/// Core trait for ticketing persistence.
///
/// All implementations must be thread-safe (Send + Sync) and must make every
/// method that touches `available` atomic with respect to concurrent callers.
#[async_trait]
pub trait TicketingStore: Send + Sync {
    /// Inserts a catalog event.
    async fn insert_event(&self, event: EventRecord) -> Result<()>;

    /// Retrieves a catalog event.
    async fn get_event(&self, id: &EventId) -> Result<Option<EventRecord>>;

    /// Inserts a ticket type. Its event must exist.
    async fn insert_ticket_type(&self, ticket_type: TicketTypeRecord) -> Result<()>;

    /// Retrieves a ticket type with its current availability.
    async fn get_ticket_type(&self, id: &TicketTypeId) -> Result<Option<TicketTypeRecord>>;

    /// Changes the catalog price of a ticket type.
    ///
    /// Existing orders keep the price they were placed at.
    async fn update_unit_price(&self, id: &TicketTypeId, unit_price: Money) -> Result<()>;

    /// Atomically checks `available >= quantity` and decrements.
    async fn reserve(&self, id: &TicketTypeId, quantity: u32) -> Result<ReservationOutcome> {
        self.reserve_all(&[LineRequest::new(id.clone(), quantity)])
            .await
    }

    /// Reserves every line or nothing.
    ///
    /// Lines are merged and locked in ascending ticket type id order. Fails
    /// with `UnknownTicketType` if a line names a missing ticket type.
    async fn reserve_all(&self, lines: &[LineRequest]) -> Result<ReservationOutcome>;

    /// Atomically gives `quantity` units back.
    ///
    /// Returns the new availability. Fails with `ConsistencyViolation`, and
    /// changes nothing, if the result would exceed the total quantity.
    async fn release(&self, id: &TicketTypeId, quantity: u32) -> Result<u32>;

    /// Reserves the order's lines and inserts the order in one unit of work.
    ///
    /// On `Rejected` neither the reservation nor the order survives.
    async fn place_order(&self, order: OrderRecord) -> Result<PlaceOrderOutcome>;

    /// Applies a guarded status change and appends it to the audit trail.
    ///
    /// When the change releases inventory, every line is released in the
    /// same unit of work. Fails with `ConcurrentModification` if the order
    /// is no longer at the expected version and status.
    async fn transition_order(&self, change: StatusChange) -> Result<OrderRecord>;

    /// Records or withdraws an operator's refund approval without changing
    /// the status.
    ///
    /// Bumps the version, so a change planned against the earlier version
    /// fails. Fails with `ConcurrentModification` if the order is no longer
    /// `refund_pending` at the expected version.
    async fn set_refund_approval(&self, approval: RefundApproval) -> Result<OrderRecord>;

    /// Retrieves an order with its lines exactly as persisted.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Retrieves a buyer's orders, newest first.
    async fn get_orders_by_buyer(&self, buyer_id: &BuyerId) -> Result<Vec<OrderRecord>>;

    /// Retrieves `pending` orders created strictly before `cutoff`, oldest first.
    async fn get_pending_orders_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>>;

    /// Retrieves an order's status history in the order it happened.
    async fn get_status_history(&self, id: OrderId) -> Result<Vec<StatusHistoryRecord>>;
}

/// Extension trait providing convenience methods for ticketing stores.
#[async_trait]
pub trait TicketingStoreExt: TicketingStore {
    /// Read-only projection of a ticket type's availability.
    async fn get_availability(&self, id: &TicketTypeId) -> Result<Option<u32>> {
        Ok(self.get_ticket_type(id).await?.map(|t| t.available))
    }

    /// Checks if an order exists.
    async fn order_exists(&self, id: OrderId) -> Result<bool> {
        Ok(self.get_order(id).await?.is_some())
    }
}

// Blanket implementation for all TicketingStore implementations
impl<T: TicketingStore + ?Sized> TicketingStoreExt for T {}
