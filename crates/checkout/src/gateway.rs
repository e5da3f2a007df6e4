//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{BuyerId, Money, OrderId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// The gateway's answer to an authorization, delivered either as the return
/// value of [`PaymentGateway::authorize`] or through a payment callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Authorized {
        #[serde(default)]
        transaction_id: String,
    },
    Declined {
        #[serde(default)]
        reason: String,
    },
}

impl PaymentOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, PaymentOutcome::Authorized { .. })
    }
}

/// Transport-level gateway failures. A decline is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway could not be reached.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway refused the request.
    #[error("Gateway rejected the request: {0}")]
    Rejected(String),
}

/// Trait for payment processing.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorizes and captures `amount` for an order.
    async fn authorize(
        &self,
        order_id: OrderId,
        buyer_id: &BuyerId,
        amount: Money,
        payment_method: &str,
    ) -> Result<PaymentOutcome, GatewayError>;

    /// Returns `amount` to the buyer of an order.
    ///
    /// The order may have been paid through either integration style, so
    /// the refund is keyed on the order id rather than on a charge made
    /// through [`PaymentGateway::authorize`]. The order id is also the
    /// idempotency key: a repeated refund for an order pays nothing more.
    async fn refund(&self, order_id: OrderId, amount: Money) -> Result<(), GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    charges: HashMap<OrderId, Money>,
    refunds: HashMap<OrderId, Money>,
    next_id: u32,
    decline: bool,
    fail: bool,
    fail_refund: bool,
    delay: Option<Duration>,
}

/// In-memory payment gateway for development and testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }

    /// Declines every authorization while set.
    pub async fn set_decline(&self, decline: bool) {
        self.state.write().await.decline = decline;
    }

    /// Fails every call with `Unavailable` while set.
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    /// Fails refunds with `Unavailable` while set.
    pub async fn set_fail_refund(&self, fail: bool) {
        self.state.write().await.fail_refund = fail;
    }

    /// Delays every authorization, to exercise timeouts.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    pub async fn charge_count(&self) -> usize {
        self.state.read().await.charges.len()
    }

    pub async fn refunded(&self, order_id: OrderId) -> Option<Money> {
        self.state.read().await.refunds.get(&order_id).copied()
    }

    /// Number of refunds actually paid out.
    pub async fn refund_count(&self) -> usize {
        self.state.read().await.refunds.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authorize(
        &self,
        order_id: OrderId,
        buyer_id: &BuyerId,
        amount: Money,
        payment_method: &str,
    ) -> Result<PaymentOutcome, GatewayError> {
        let delay = self.state.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.fail {
            return Err(GatewayError::Unavailable("simulated outage".to_string()));
        }
        if state.decline {
            return Ok(PaymentOutcome::Declined {
                reason: "card declined".to_string(),
            });
        }

        state.next_id += 1;
        let transaction_id = format!("txn-{:04}-{}", state.next_id, uuid::Uuid::new_v4());
        state.charges.insert(order_id, amount);

        tracing::debug!(
            %order_id,
            %buyer_id,
            amount = amount.cents(),
            payment_method,
            %transaction_id,
            "Payment authorized"
        );
        Ok(PaymentOutcome::Authorized { transaction_id })
    }

    async fn refund(&self, order_id: OrderId, amount: Money) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        if state.fail || state.fail_refund {
            return Err(GatewayError::Unavailable("simulated outage".to_string()));
        }
        if let Some(charged) = state.charges.get(&order_id)
            && amount > *charged
        {
            return Err(GatewayError::Rejected(format!(
                "refund of {amount} exceeds charge of {charged} for order {order_id}"
            )));
        }
        if let Some(previous) = state.refunds.get(&order_id) {
            tracing::debug!(%order_id, amount = previous.cents(), "Refund already paid");
            return Ok(());
        }

        state.refunds.insert(order_id, amount);
        tracing::debug!(%order_id, amount = amount.cents(), "Refund paid");
        Ok(())
    }
}
