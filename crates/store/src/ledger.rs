//! Reservation request and outcome types shared by every store implementation.

use std::collections::BTreeMap;

use common::TicketTypeId;
use serde::{Deserialize, Serialize};

use crate::OrderRecord;

/// A request for `quantity` units of one ticket type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(ticket_type_id: impl Into<TicketTypeId>, quantity: u32) -> Self {
        Self {
            ticket_type_id: ticket_type_id.into(),
            quantity,
        }
    }
}

/// Units granted for one ticket type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    /// Availability left right after this grant.
    pub remaining: u32,
}

/// The ticket type that could not cover its requested quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub ticket_type_id: TicketTypeId,
    pub requested: u32,
    pub available: u32,
}

/// Result of a reservation attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Every line was granted.
    Granted(Vec<Grant>),
    /// Nothing was reserved; names the first ticket type (in lock order) that lacked stock.
    Rejected(Shortfall),
}

impl ReservationOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, ReservationOutcome::Granted(_))
    }
}

/// Result of inserting an order together with its reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceOrderOutcome {
    Placed(OrderRecord),
    Rejected(Shortfall),
}

/// Merges duplicate ticket types and sorts lines in the global lock order
/// (ascending ticket type id).
pub fn lock_order(lines: &[LineRequest]) -> Vec<LineRequest> {
    let mut merged: BTreeMap<&TicketTypeId, u32> = BTreeMap::new();
    for line in lines {
        let entry = merged.entry(&line.ticket_type_id).or_insert(0);
        *entry = entry.saturating_add(line.quantity);
    }

    merged
        .into_iter()
        .map(|(ticket_type_id, quantity)| LineRequest {
            ticket_type_id: ticket_type_id.clone(),
            quantity,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_order_sorts_ascending() {
        let lines = vec![
            LineRequest::new("vip", 1),
            LineRequest::new("camarote", 2),
            LineRequest::new("pista", 3),
        ];

        let ordered: Vec<_> = lock_order(&lines)
            .into_iter()
            .map(|l| l.ticket_type_id.to_string())
            .collect();
        assert_eq!(ordered, vec!["camarote", "pista", "vip"]);
    }

    #[test]
    fn lock_order_merges_duplicates() {
        let lines = vec![
            LineRequest::new("pista", 2),
            LineRequest::new("vip", 1),
            LineRequest::new("pista", 3),
        ];

        let ordered = lock_order(&lines);
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0], LineRequest::new("pista", 5));
        assert_eq!(ordered[1], LineRequest::new("vip", 1));
    }
}
