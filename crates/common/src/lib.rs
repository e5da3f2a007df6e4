//! Shared types for the ticketing order core.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{OrderStatus, UnknownStatus};
pub use types::{BuyerId, EventId, OrderId, TicketTypeId};
