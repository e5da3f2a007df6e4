//! Checkout configuration.

use std::time::Duration;

use domain::{FeeRate, RefundPolicy};

/// Tunables resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Service fee applied when an order is priced.
    pub fee_rate: FeeRate,
    /// Rules for entering `refund_pending`.
    pub refund_policy: RefundPolicy,
    /// How long to wait for the gateway before failing the order.
    pub payment_timeout: Duration,
    /// How long an order may stay `pending` before the sweeper fails it.
    pub pending_ttl: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            fee_rate: FeeRate::default(),
            refund_policy: RefundPolicy::default(),
            payment_timeout: Duration::from_secs(30),
            pending_ttl: Duration::from_secs(15 * 60),
        }
    }
}
