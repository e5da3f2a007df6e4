use std::fmt;

use common::BuyerId;
use serde::{Deserialize, Serialize};

/// Who caused a status change. Recorded in the order's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Buyer(BuyerId),
    PaymentGateway,
    Operator(String),
    /// Timeouts and background sweeps.
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Buyer(id) => write!(f, "buyer:{id}"),
            Actor::PaymentGateway => write!(f, "payment_gateway"),
            Actor::Operator(name) => write!(f, "operator:{name}"),
            Actor::System => write!(f, "system"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable_for_audit_records() {
        assert_eq!(Actor::Buyer(BuyerId::new("b-1")).to_string(), "buyer:b-1");
        assert_eq!(Actor::PaymentGateway.to_string(), "payment_gateway");
        assert_eq!(Actor::Operator("ana".into()).to_string(), "operator:ana");
        assert_eq!(Actor::System.to_string(), "system");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(Actor::Operator("ana".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "operator", "id": "ana"}));
    }
}
