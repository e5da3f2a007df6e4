use common::{BuyerId, EventId};
use serde::{Deserialize, Serialize};
use store::LineRequest;

use crate::error::OrderError;
use crate::ledger::check_quantities;

/// A buyer's request to purchase tickets for one event.
///
/// Carries quantities only. Prices always come from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub buyer_id: BuyerId,
    pub event_id: EventId,
    pub lines: Vec<LineRequest>,
    pub payment_method: String,
}

impl PurchaseRequest {
    pub fn new(
        buyer_id: impl Into<BuyerId>,
        event_id: impl Into<EventId>,
        lines: Vec<LineRequest>,
        payment_method: impl Into<String>,
    ) -> Self {
        Self {
            buyer_id: buyer_id.into(),
            event_id: event_id.into(),
            lines,
            payment_method: payment_method.into(),
        }
    }

    /// Checks the request shape: a buyer, at least one line, no zero quantities.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.buyer_id.is_blank() {
            return Err(OrderError::BuyerRequired);
        }
        check_quantities(&self.lines)
    }
}
