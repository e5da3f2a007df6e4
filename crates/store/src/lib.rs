//! Persistence for ticket inventory and orders.
//!
//! The [`TicketingStore`] trait is the only place where the per-ticket-type
//! `available` counter is written. Every implementation guarantees that:
//! - a reservation checks and decrements availability as one indivisible step,
//! - multi-line reservations lock ticket types in ascending id order and are
//!   all-or-nothing,
//! - an order is inserted in the same unit of work as its reservation, and
//! - an inventory-releasing status change is recorded together with the release.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use ledger::{Grant, LineRequest, PlaceOrderOutcome, ReservationOutcome, Shortfall, lock_order};
pub use memory::InMemoryTicketingStore;
pub use postgres::PostgresTicketingStore;
pub use records::{
    EventRecord, OrderLineRecord, OrderRecord, RefundApproval, StatusChange,
    StatusHistoryRecord, TicketTypeRecord,
};
pub use store::{TicketingStore, TicketingStoreExt};
