//! Domain layer of the ticketing core.
//!
//! This crate provides:
//! - the Pricing Engine, which prices requests from server-held unit prices
//! - the Inventory Ledger, the only writer of ticket availability
//! - the Order aggregate with its status state machine and repository
//! - the refund eligibility policy and a clock abstraction

pub mod clock;
pub mod error;
pub mod ledger;
pub mod order;
pub mod pricing;
pub mod refund;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, OrderError};
pub use ledger::InventoryLedger;
pub use order::{Actor, Order, OrderLine, OrderRepository, PurchaseRequest};
pub use pricing::{FeeRate, PricingEngine, Quote};
pub use refund::{RefundIneligibility, RefundPolicy};
