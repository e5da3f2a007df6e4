//! Checkout orchestration for the ticketing core.
//!
//! The [`CheckoutOrchestrator`] composes the Pricing Engine, the Inventory
//! Ledger and the Order Repository into the purchase flow, and drives the
//! payment and refund flows that follow it:
//! 1. Validate, price, reserve and persist a `pending` order
//! 2. Authorize payment synchronously under a timeout, or accept a callback
//! 3. Fail stale `pending` orders and release their tickets
//! 4. Request, approve or reject refunds

pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;

pub use config::CheckoutConfig;
pub use error::{CheckoutError, Result};
pub use gateway::{GatewayError, InMemoryPaymentGateway, PaymentGateway, PaymentOutcome};
pub use orchestrator::CheckoutOrchestrator;
