//! Domain error types.

use common::{EventId, OrderId, OrderStatus, TicketTypeId};
use store::StoreError;
use thiserror::Error;

use crate::refund::RefundIneligibility;

/// Business-rule rejections.
///
/// Every variant is caller-facing and carries enough detail to drive a
/// precise retry or message without inspecting internal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The purchase request has no lines.
    #[error("Order must contain at least one line")]
    EmptyOrder,

    /// A line asks for zero units.
    #[error("Invalid quantity {quantity} for ticket type {ticket_type_id}")]
    InvalidQuantity {
        ticket_type_id: TicketTypeId,
        quantity: u32,
    },

    /// The request carries no buyer identity.
    #[error("Buyer identity is required")]
    BuyerRequired,

    /// The ticket type does not exist or belongs to another event.
    #[error("Unknown ticket type: {ticket_type_id}")]
    UnknownTicketType { ticket_type_id: TicketTypeId },

    /// A ticket type could not cover the requested quantity.
    #[error(
        "Insufficient inventory for ticket type {ticket_type_id}: requested {requested}, available {available}"
    )]
    InsufficientInventory {
        ticket_type_id: TicketTypeId,
        requested: u32,
        available: u32,
    },

    /// The transition is not in the order state machine.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The refund request falls outside the refund policy.
    #[error("Order is not eligible for refund: {reason}")]
    IneligibleForRefund { reason: RefundIneligibility },

    /// Only the buyer who placed the order may request its refund.
    #[error("Order {order_id} does not belong to the requesting buyer")]
    NotOrderOwner { order_id: OrderId },

    /// The order total does not fit in the money representation.
    #[error("Order total is too large")]
    AmountTooLarge,

    /// An operator has already approved the refund and it is being paid out.
    #[error("Refund for order {order_id} is already being processed")]
    RefundInProgress { order_id: OrderId },
}

impl OrderError {
    /// Machine-readable rejection code.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::EmptyOrder => "empty_order",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::BuyerRequired => "buyer_required",
            OrderError::UnknownTicketType { .. } => "unknown_ticket_type",
            OrderError::InsufficientInventory { .. } => "insufficient_inventory",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::IneligibleForRefund { .. } => "ineligible_for_refund",
            OrderError::NotOrderOwner { .. } => "not_order_owner",
            OrderError::AmountTooLarge => "amount_too_large",
            OrderError::RefundInProgress { .. } => "refund_in_progress",
        }
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A business rule rejected the operation.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The event does not exist.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// The order changed between read and write. Safe to retry after re-reading.
    #[error("Order {order_id} was modified concurrently")]
    ConcurrentModification { order_id: OrderId },

    /// Inventory would leave `[0, total]`. Fatal for the operation.
    #[error(
        "Consistency violation on ticket type {ticket_type_id}: releasing {quantity} with {available} of {total} available"
    )]
    ConsistencyViolation {
        ticket_type_id: TicketTypeId,
        available: u32,
        total: u32,
        quantity: u32,
    },

    /// The store failed.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Order(e) => e.code(),
            DomainError::OrderNotFound(_) => "order_not_found",
            DomainError::EventNotFound(_) => "event_not_found",
            DomainError::ConcurrentModification { .. } => "concurrent_modification",
            DomainError::ConsistencyViolation { .. } => "consistency_violation",
            DomainError::Store(_) => "internal_error",
        }
    }

    /// Returns the business rejection, if this is one.
    pub fn as_order_error(&self) -> Option<&OrderError> {
        match self {
            DomainError::Order(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownTicketType(ticket_type_id) => {
                DomainError::Order(OrderError::UnknownTicketType { ticket_type_id })
            }
            StoreError::UnknownEvent(event_id) => DomainError::EventNotFound(event_id),
            StoreError::OrderNotFound(order_id) => DomainError::OrderNotFound(order_id),
            StoreError::ConcurrentModification { order_id, .. } => {
                DomainError::ConcurrentModification { order_id }
            }
            StoreError::ConsistencyViolation {
                ticket_type_id,
                available,
                total,
                quantity,
            } => DomainError::ConsistencyViolation {
                ticket_type_id,
                available,
                total,
                quantity,
            },
            other => DomainError::Store(other),
        }
    }
}
