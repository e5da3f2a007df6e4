//! Inventory Ledger.
//!
//! The only code path that changes a ticket type's `available` counter.
//! Every operation delegates to a single atomic store primitive, so no
//! caller ever reads availability and then writes it back.

use common::TicketTypeId;
use store::{LineRequest, ReservationOutcome, TicketingStore, TicketingStoreExt};

use crate::error::{DomainError, OrderError};

/// Atomic reserve and release of ticket inventory.
#[derive(Clone)]
pub struct InventoryLedger<S: TicketingStore> {
    store: S,
}

impl<S: TicketingStore> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Reserves `quantity` units of one ticket type, or nothing.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        ticket_type_id: &TicketTypeId,
        quantity: u32,
    ) -> Result<ReservationOutcome, DomainError> {
        self.reserve_all(&[LineRequest::new(ticket_type_id.clone(), quantity)])
            .await
    }

    /// Reserves every line or nothing.
    ///
    /// Duplicate ticket types are merged and rows are taken in ascending id
    /// order, so overlapping multi-line reservations cannot deadlock.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn reserve_all(
        &self,
        lines: &[LineRequest],
    ) -> Result<ReservationOutcome, DomainError> {
        check_quantities(lines)?;

        let outcome = self.store.reserve_all(lines).await?;
        match &outcome {
            ReservationOutcome::Granted(grants) => {
                for grant in grants {
                    metrics::counter!("inventory_units_reserved_total")
                        .increment(u64::from(grant.quantity));
                }
            }
            ReservationOutcome::Rejected(shortfall) => {
                tracing::info!(
                    ticket_type_id = %shortfall.ticket_type_id,
                    requested = shortfall.requested,
                    available = shortfall.available,
                    "Reservation rejected"
                );
            }
        }
        Ok(outcome)
    }

    /// Gives `quantity` units back and returns the new availability.
    ///
    /// A release that would exceed the ticket type's total is a
    /// `ConsistencyViolation`: it is logged and nothing is applied.
    #[tracing::instrument(skip(self))]
    pub async fn release(
        &self,
        ticket_type_id: &TicketTypeId,
        quantity: u32,
    ) -> Result<u32, DomainError> {
        check_quantities(&[LineRequest::new(ticket_type_id.clone(), quantity)])?;

        match self.store.release(ticket_type_id, quantity).await {
            Ok(available) => {
                metrics::counter!("inventory_units_released_total")
                    .increment(u64::from(quantity));
                Ok(available)
            }
            Err(e) => {
                let err = DomainError::from(e);
                if let DomainError::ConsistencyViolation {
                    ticket_type_id,
                    available,
                    total,
                    quantity,
                } = &err
                {
                    tracing::error!(
                        %ticket_type_id,
                        available,
                        total,
                        quantity,
                        "Release would exceed total inventory"
                    );
                    metrics::counter!("inventory_consistency_violations_total").increment(1);
                }
                Err(err)
            }
        }
    }

    /// Read-only projection of the ledger for one ticket type.
    pub async fn availability(&self, ticket_type_id: &TicketTypeId) -> Result<u32, DomainError> {
        self.store
            .get_availability(ticket_type_id)
            .await?
            .ok_or_else(|| {
                OrderError::UnknownTicketType {
                    ticket_type_id: ticket_type_id.clone(),
                }
                .into()
            })
    }
}

/// Rejects zero-unit lines.
pub(crate) fn check_quantities(lines: &[LineRequest]) -> Result<(), OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }
    match lines.iter().find(|l| l.quantity == 0) {
        Some(line) => Err(OrderError::InvalidQuantity {
            ticket_type_id: line.ticket_type_id.clone(),
            quantity: line.quantity,
        }),
        None => Ok(()),
    }
}
