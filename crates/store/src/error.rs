use common::{EventId, OrderId, TicketTypeId};
use thiserror::Error;

/// Errors that can occur when interacting with the ticketing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The ticket type does not exist.
    #[error("Unknown ticket type: {0}")]
    UnknownTicketType(TicketTypeId),

    /// The event does not exist.
    #[error("Unknown event: {0}")]
    UnknownEvent(EventId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order changed between read and write.
    #[error(
        "Concurrent modification of order {order_id}: expected version {expected}, found {actual}"
    )]
    ConcurrentModification {
        order_id: OrderId,
        expected: i64,
        actual: i64,
    },

    /// A release would push `available` outside `[0, total]`.
    ///
    /// This indicates a broken invariant upstream and is never retried.
    #[error(
        "Consistency violation on ticket type {ticket_type_id}: releasing {quantity} with {available} of {total} available"
    )]
    ConsistencyViolation {
        ticket_type_id: TicketTypeId,
        available: u32,
        total: u32,
        quantity: u32,
    },

    /// A record with the same identifier already exists.
    #[error("Duplicate {kind}: {id}")]
    Duplicate { kind: &'static str, id: String },

    /// The backing storage refused the write.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A persisted row could not be mapped back to a record.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
