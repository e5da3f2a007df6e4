//! Pricing Engine.
//!
//! Turns requested `(ticket type, quantity)` lines into authoritative
//! monetary figures using server-held unit prices. Any price the caller may
//! have sent is never consulted.

use std::fmt;

use common::{EventId, Money};
use serde::{Deserialize, Serialize};
use store::{LineRequest, TicketingStore, lock_order};

use crate::error::{DomainError, OrderError};
use crate::order::OrderLine;

/// Service fee rate in basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRate(u32);

impl FeeRate {
    /// 100% expressed in basis points.
    pub const MAX_BPS: u32 = 10_000;

    /// Returns `None` for rates above 100%.
    pub fn from_bps(bps: u32) -> Option<Self> {
        (bps <= Self::MAX_BPS).then_some(Self(bps))
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    /// Fee owed on `subtotal`, rounded half-up to the nearest cent.
    pub fn fee_on(&self, subtotal: Money) -> Money {
        subtotal.percentage_bps(self.0)
    }
}

impl Default for FeeRate {
    /// 10%.
    fn default() -> Self {
        Self(1_000)
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// The priced form of a purchase request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// One line per ticket type, in lock order.
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub service_fee: Money,
    pub net_amount: Money,
    pub fee_rate: FeeRate,
}

impl Quote {
    /// Computes totals for lines whose unit prices are already known.
    ///
    /// Fails with `AmountTooLarge` if a line total or the subtotal overflows.
    pub fn from_lines(lines: Vec<OrderLine>, fee_rate: FeeRate) -> Result<Self, OrderError> {
        let totals = lines
            .iter()
            .map(OrderLine::checked_line_total)
            .collect::<Option<Vec<_>>>()
            .ok_or(OrderError::AmountTooLarge)?;
        let subtotal = Money::checked_sum(totals).ok_or(OrderError::AmountTooLarge)?;
        // fee <= subtotal for rates up to 100%, so the difference cannot overflow
        let service_fee = fee_rate.fee_on(subtotal);
        Ok(Self {
            lines,
            subtotal,
            service_fee,
            net_amount: subtotal - service_fee,
            fee_rate,
        })
    }

    pub fn line_requests(&self) -> Vec<LineRequest> {
        self.lines
            .iter()
            .map(|l| LineRequest::new(l.ticket_type_id.clone(), l.quantity))
            .collect()
    }
}

/// Prices purchase requests from the catalog.
///
/// Pure read-and-compute: no side effects, safe to retry.
#[derive(Clone)]
pub struct PricingEngine<S: TicketingStore> {
    store: S,
    fee_rate: FeeRate,
}

impl<S: TicketingStore> PricingEngine<S> {
    pub fn new(store: S, fee_rate: FeeRate) -> Self {
        Self { store, fee_rate }
    }

    pub fn fee_rate(&self) -> FeeRate {
        self.fee_rate
    }

    /// Prices `lines` for `event_id`.
    ///
    /// Duplicate ticket types are merged. Fails with `UnknownTicketType` if a
    /// ticket type is missing or belongs to another event.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn price(
        &self,
        event_id: &EventId,
        lines: &[LineRequest],
    ) -> Result<Quote, DomainError> {
        let mut priced = Vec::with_capacity(lines.len());

        for line in lock_order(lines) {
            let ticket_type = self
                .store
                .get_ticket_type(&line.ticket_type_id)
                .await?
                .filter(|t| &t.event_id == event_id)
                .ok_or_else(|| OrderError::UnknownTicketType {
                    ticket_type_id: line.ticket_type_id.clone(),
                })?;

            priced.push(OrderLine::new(
                line.ticket_type_id,
                line.quantity,
                ticket_type.unit_price,
            ));
        }

        let quote = Quote::from_lines(priced, self.fee_rate)?;
        tracing::debug!(
            subtotal = quote.subtotal.cents(),
            service_fee = quote.service_fee.cents(),
            "Priced request"
        );
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_is_ten_percent() {
        assert_eq!(FeeRate::default().bps(), 1_000);
        assert_eq!(FeeRate::default().to_string(), "10.00%");
    }

    #[test]
    fn rejects_rates_above_one_hundred_percent() {
        assert!(FeeRate::from_bps(10_000).is_some());
        assert!(FeeRate::from_bps(10_001).is_none());
    }

    #[test]
    fn quote_for_pista_and_vip() {
        let lines = vec![
            OrderLine::new("pista", 2, Money::from_major(100)),
            OrderLine::new("vip", 1, Money::from_major(300)),
        ];

        let quote = Quote::from_lines(lines, FeeRate::default()).unwrap();

        assert_eq!(quote.subtotal, Money::from_major(500));
        assert_eq!(quote.service_fee, Money::from_major(50));
        assert_eq!(quote.net_amount, Money::from_major(450));
    }

    #[test]
    fn fractional_fee_rounds_half_up() {
        // 10% of 0.05 is half a cent
        let quote = Quote::from_lines(
            vec![OrderLine::new("a", 1, Money::from_cents(5))],
            FeeRate::default(),
        )
        .unwrap();
        assert_eq!(quote.service_fee, Money::from_cents(1));
        assert_eq!(quote.net_amount, Money::from_cents(4));

        let quote = Quote::from_lines(
            vec![OrderLine::new("a", 1, Money::from_cents(4))],
            FeeRate::default(),
        )
        .unwrap();
        assert_eq!(quote.service_fee, Money::zero());
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let huge = Money::from_cents(i64::MAX / 2);

        let result = Quote::from_lines(vec![OrderLine::new("a", 3, huge)], FeeRate::default());
        assert_eq!(result, Err(OrderError::AmountTooLarge));

        let result = Quote::from_lines(
            vec![OrderLine::new("a", 2, huge), OrderLine::new("b", 1, huge)],
            FeeRate::default(),
        );
        assert_eq!(result, Err(OrderError::AmountTooLarge));
    }
}
