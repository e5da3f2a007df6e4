//! Order status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of an order in its payment/refund lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Paid ◄──────────┐
///           │     │              │ (rejected)
///           │     ▼              │
///           │   RefundPending ───┴──► Refunded
///           └──► Failed
/// ```
///
/// `Pending → Failed` and `RefundPending → Refunded` give the order's
/// tickets back to the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Inventory reserved, awaiting the payment outcome.
    #[default]
    Pending,

    /// Payment authorized.
    Paid,

    /// Payment declined or timed out (terminal).
    Failed,

    /// Buyer asked for a refund, awaiting an operator decision.
    RefundPending,

    /// Refund completed (terminal).
    Refunded,
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Failed,
        OrderStatus::RefundPending,
        OrderStatus::Refunded,
    ];

    /// Returns true if `self → target` is in the transition table.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (Pending, Paid)
                | (Pending, Failed)
                | (Paid, RefundPending)
                | (RefundPending, Refunded)
                | (RefundPending, Paid)
        )
    }

    /// Returns true if entering `target` from `self` returns the order's
    /// tickets to inventory.
    pub fn releases_inventory(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!((self, target), (Pending, Failed) | (RefundPending, Refunded))
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Refunded)
    }

    /// Returns true if the order still holds reserved inventory.
    pub fn holds_inventory(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns the persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::RefundPending => "refund_pending",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), Pending);
    }

    #[test]
    fn test_transition_table() {
        let allowed = [
            (Pending, Paid),
            (Pending, Failed),
            (Paid, RefundPending),
            (RefundPending, Refunded),
            (RefundPending, Paid),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_releasing_transitions() {
        assert!(Pending.releases_inventory(Failed));
        assert!(RefundPending.releases_inventory(Refunded));
        assert!(!Pending.releases_inventory(Paid));
        assert!(!RefundPending.releases_inventory(Paid));
    }

    #[test]
    fn test_terminal_states() {
        assert!(Failed.is_terminal());
        assert!(Refunded.is_terminal());
        assert!(!Paid.is_terminal());
        assert!(Paid.holds_inventory());
    }

    #[test]
    fn test_parse_roundtrips_names() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&RefundPending).unwrap();
        assert_eq!(json, "\"refund_pending\"");
    }
}
