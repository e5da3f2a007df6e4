//! Checkout error types.

use common::OrderId;
use domain::{DomainError, OrderError};
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors that can occur during checkout, payment and refund flows.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A domain rule or the store rejected the operation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The gateway did not answer in time and the order could not be failed.
    ///
    /// Only surfaced when compensation itself fails. A timeout whose
    /// compensation succeeds returns the failed order instead.
    #[error("Payment for order {order_id} timed out and the order could not be failed")]
    PaymentTimeout { order_id: OrderId },

    /// The gateway failed outside of an authorization attempt.
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl CheckoutError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::Domain(e) => e.code(),
            CheckoutError::PaymentTimeout { .. } => "payment_timeout",
            CheckoutError::Gateway(_) => "payment_gateway_error",
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(e: OrderError) -> Self {
        CheckoutError::Domain(DomainError::Order(e))
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
