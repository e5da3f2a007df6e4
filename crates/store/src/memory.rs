use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerId, EventId, Money, OrderId, OrderStatus, TicketTypeId};
use tokio::sync::RwLock;

use crate::{
    EventRecord, Grant, LineRequest, OrderRecord, PlaceOrderOutcome, RefundApproval,
    ReservationOutcome, Result, Shortfall, StatusChange, StatusHistoryRecord, StoreError,
    TicketTypeRecord, lock_order, store::TicketingStore,
};

#[derive(Default)]
struct MemoryState {
    events: HashMap<EventId, EventRecord>,
    ticket_types: BTreeMap<TicketTypeId, TicketTypeRecord>,
    orders: HashMap<OrderId, OrderRecord>,
    history: Vec<StatusHistoryRecord>,
    fail_next_order_write: bool,
}

impl MemoryState {
    /// Reserves lines in lock order, undoing earlier grants if a later line fails.
    fn reserve_lines(&mut self, lines: &[LineRequest]) -> Result<ReservationOutcome> {
        let mut grants: Vec<Grant> = Vec::new();

        for line in lock_order(lines) {
            let Some(ticket_type) = self.ticket_types.get_mut(&line.ticket_type_id) else {
                self.undo(&grants);
                return Err(StoreError::UnknownTicketType(line.ticket_type_id));
            };

            if ticket_type.available < line.quantity {
                let shortfall = Shortfall {
                    ticket_type_id: line.ticket_type_id,
                    requested: line.quantity,
                    available: ticket_type.available,
                };
                self.undo(&grants);
                return Ok(ReservationOutcome::Rejected(shortfall));
            }

            ticket_type.available -= line.quantity;
            grants.push(Grant {
                ticket_type_id: line.ticket_type_id,
                quantity: line.quantity,
                remaining: ticket_type.available,
            });
        }

        Ok(ReservationOutcome::Granted(grants))
    }

    fn undo(&mut self, grants: &[Grant]) {
        for grant in grants {
            if let Some(ticket_type) = self.ticket_types.get_mut(&grant.ticket_type_id) {
                ticket_type.available += grant.quantity;
            }
        }
    }

    /// Checks that every line can be released, then releases all of them.
    fn release_lines(&mut self, lines: &[LineRequest]) -> Result<()> {
        let lines = lock_order(lines);

        for line in &lines {
            let ticket_type = self
                .ticket_types
                .get(&line.ticket_type_id)
                .ok_or_else(|| StoreError::UnknownTicketType(line.ticket_type_id.clone()))?;
            check_release(ticket_type, line.quantity)?;
        }

        for line in &lines {
            if let Some(ticket_type) = self.ticket_types.get_mut(&line.ticket_type_id) {
                ticket_type.available += line.quantity;
            }
        }

        Ok(())
    }
}

fn check_release(ticket_type: &TicketTypeRecord, quantity: u32) -> Result<()> {
    let within_total = ticket_type
        .available
        .checked_add(quantity)
        .is_some_and(|next| next <= ticket_type.total_quantity);

    if within_total {
        Ok(())
    } else {
        Err(StoreError::ConsistencyViolation {
            ticket_type_id: ticket_type.id.clone(),
            available: ticket_type.available,
            total: ticket_type.total_quantity,
            quantity,
        })
    }
}

/// In-memory ticketing store for tests and local development.
///
/// A single lock guards all state, so every operation is trivially atomic
/// and serializable.
#[derive(Clone, Default)]
pub struct InMemoryTicketingStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryTicketingStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next order insert, status change or refund approval fail
    /// with `Unavailable`.
    ///
    /// An insert fails after its reservation was taken and rolls it back.
    pub async fn fail_next_order_write(&self) {
        self.state.write().await.fail_next_order_write = true;
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl TicketingStore for InMemoryTicketingStore {
    async fn insert_event(&self, event: EventRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if state.events.contains_key(&event.id) {
            return Err(StoreError::Duplicate {
                kind: "event",
                id: event.id.to_string(),
            });
        }
        state.events.insert(event.id.clone(), event);
        Ok(())
    }

    async fn get_event(&self, id: &EventId) -> Result<Option<EventRecord>> {
        Ok(self.state.read().await.events.get(id).cloned())
    }

    async fn insert_ticket_type(&self, ticket_type: TicketTypeRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.events.contains_key(&ticket_type.event_id) {
            return Err(StoreError::UnknownEvent(ticket_type.event_id));
        }
        if state.ticket_types.contains_key(&ticket_type.id) {
            return Err(StoreError::Duplicate {
                kind: "ticket type",
                id: ticket_type.id.to_string(),
            });
        }
        state
            .ticket_types
            .insert(ticket_type.id.clone(), ticket_type);
        Ok(())
    }

    async fn get_ticket_type(&self, id: &TicketTypeId) -> Result<Option<TicketTypeRecord>> {
        Ok(self.state.read().await.ticket_types.get(id).cloned())
    }

    async fn update_unit_price(&self, id: &TicketTypeId, unit_price: Money) -> Result<()> {
        let mut state = self.state.write().await;
        let ticket_type = state
            .ticket_types
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownTicketType(id.clone()))?;
        ticket_type.unit_price = unit_price;
        Ok(())
    }

    async fn reserve_all(&self, lines: &[LineRequest]) -> Result<ReservationOutcome> {
        self.state.write().await.reserve_lines(lines)
    }

    async fn release(&self, id: &TicketTypeId, quantity: u32) -> Result<u32> {
        let mut state = self.state.write().await;
        let ticket_type = state
            .ticket_types
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownTicketType(id.clone()))?;
        check_release(ticket_type, quantity)?;
        ticket_type.available += quantity;
        Ok(ticket_type.available)
    }

    async fn place_order(&self, order: OrderRecord) -> Result<PlaceOrderOutcome> {
        let mut state = self.state.write().await;

        if !state.events.contains_key(&order.event_id) {
            return Err(StoreError::UnknownEvent(order.event_id));
        }
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                kind: "order",
                id: order.id.to_string(),
            });
        }

        let requests: Vec<LineRequest> = order
            .lines
            .iter()
            .map(|l| LineRequest::new(l.ticket_type_id.clone(), l.quantity))
            .collect();

        let grants = match state.reserve_lines(&requests)? {
            ReservationOutcome::Granted(grants) => grants,
            ReservationOutcome::Rejected(shortfall) => {
                return Ok(PlaceOrderOutcome::Rejected(shortfall));
            }
        };

        if state.fail_next_order_write {
            // Roll back as a database transaction would.
            state.fail_next_order_write = false;
            state.undo(&grants);
            return Err(StoreError::Unavailable("order insert failed".to_string()));
        }

        state.orders.insert(order.id, order.clone());
        Ok(PlaceOrderOutcome::Placed(order))
    }

    async fn transition_order(&self, change: StatusChange) -> Result<OrderRecord> {
        let mut state = self.state.write().await;

        if state.fail_next_order_write {
            state.fail_next_order_write = false;
            return Err(StoreError::Unavailable("order update failed".to_string()));
        }

        let current = state
            .orders
            .get(&change.order_id)
            .ok_or(StoreError::OrderNotFound(change.order_id))?;

        if current.version != change.expected_version || current.status != change.from {
            return Err(StoreError::ConcurrentModification {
                order_id: change.order_id,
                expected: change.expected_version,
                actual: current.version,
            });
        }

        if change.releases_inventory() {
            let lines: Vec<LineRequest> = current
                .lines
                .iter()
                .map(|l| LineRequest::new(l.ticket_type_id.clone(), l.quantity))
                .collect();
            state.release_lines(&lines)?;
        }

        let order = state
            .orders
            .get_mut(&change.order_id)
            .ok_or(StoreError::OrderNotFound(change.order_id))?;
        order.status = change.to;
        order.version += 1;
        order.updated_at = change.at;
        if change.refund_reason.is_some() {
            order.refund_reason = change.refund_reason.clone();
        }
        if change.refund_requested_at.is_some() {
            order.refund_requested_at = change.refund_requested_at;
        }
        let updated = order.clone();

        state.history.push(StatusHistoryRecord::from_change(&change));
        Ok(updated)
    }

    async fn set_refund_approval(&self, approval: RefundApproval) -> Result<OrderRecord> {
        let mut state = self.state.write().await;

        if state.fail_next_order_write {
            state.fail_next_order_write = false;
            return Err(StoreError::Unavailable("order update failed".to_string()));
        }

        let order = state
            .orders
            .get_mut(&approval.order_id)
            .ok_or(StoreError::OrderNotFound(approval.order_id))?;

        if order.version != approval.expected_version
            || order.status != OrderStatus::RefundPending
        {
            return Err(StoreError::ConcurrentModification {
                order_id: approval.order_id,
                expected: approval.expected_version,
                actual: order.version,
            });
        }

        order.refund_approved_by = approval.approved_by;
        order.version += 1;
        order.updated_at = approval.at;
        Ok(order.clone())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn get_orders_by_buyer(&self, buyer_id: &BuyerId) -> Result<Vec<OrderRecord>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| &o.buyer_id == buyer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn get_pending_orders_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn get_status_history(&self, id: OrderId) -> Result<Vec<StatusHistoryRecord>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.order_id == id)
            .cloned()
            .collect())
    }
}
