//! Persisted record types.

use chrono::{DateTime, Utc};
use common::{BuyerId, EventId, Money, OrderId, OrderStatus, TicketTypeId};
use serde::{Deserialize, Serialize};

/// A catalog event tickets are sold for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub name: String,
    pub starts_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(id: impl Into<EventId>, name: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            starts_at,
        }
    }
}

/// A ticket type and its inventory counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTypeRecord {
    pub id: TicketTypeId,
    pub event_id: EventId,
    pub name: String,
    pub unit_price: Money,
    pub total_quantity: u32,
    /// Units still sellable, always within `[0, total_quantity]`.
    pub available: u32,
}

impl TicketTypeRecord {
    /// Creates a ticket type with its full capacity available.
    pub fn new(
        id: impl Into<TicketTypeId>,
        event_id: impl Into<EventId>,
        name: impl Into<String>,
        unit_price: Money,
        total_quantity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            event_id: event_id.into(),
            name: name.into(),
            unit_price,
            total_quantity,
            available: total_quantity,
        }
    }

    /// Units currently held by orders.
    pub fn reserved(&self) -> u32 {
        self.total_quantity - self.available
    }
}

/// One ticket-type line of an order, with its price frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRecord {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// An order header with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub buyer_id: BuyerId,
    pub event_id: EventId,
    pub lines: Vec<OrderLineRecord>,
    pub subtotal: Money,
    pub service_fee: Money,
    pub net_amount: Money,
    pub status: OrderStatus,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every status change, starts at 1.
    pub version: i64,
    pub refund_reason: Option<String>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    /// Operator whose approval is paying the refund out. Only set while
    /// `refund_pending` or after `refunded`.
    pub refund_approved_by: Option<String>,
}

/// Sets or clears the refund approval of a `refund_pending` order, applied
/// only if the order is still at `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundApproval {
    pub order_id: OrderId,
    pub expected_version: i64,
    pub approved_by: Option<String>,
    pub at: DateTime<Utc>,
}

/// A requested status change, applied only if the order is still at
/// `expected_version` and in status `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub expected_version: i64,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub refund_reason: Option<String>,
    pub refund_requested_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    /// True when the change must give the order's tickets back.
    pub fn releases_inventory(&self) -> bool {
        self.from.releases_inventory(self.to)
    }
}

/// An entry of an order's status audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryRecord {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: String,
    pub changed_at: DateTime<Utc>,
}

impl StatusHistoryRecord {
    pub fn from_change(change: &StatusChange) -> Self {
        Self {
            order_id: change.order_id,
            from: change.from,
            to: change.to,
            actor: change.actor.clone(),
            changed_at: change.at,
        }
    }
}
