//! Order aggregate.

use chrono::{DateTime, Utc};
use common::{BuyerId, EventId, Money, OrderId, OrderStatus, TicketTypeId};
use serde::{Deserialize, Serialize};
use store::{OrderLineRecord, OrderRecord, RefundApproval, StatusChange};

use super::Actor;
use crate::error::OrderError;
use crate::refund::RefundPolicy;

/// One ticket-type line with its price frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn new(ticket_type_id: impl Into<TicketTypeId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            ticket_type_id: ticket_type_id.into(),
            quantity,
            unit_price,
        }
    }

    /// `unit_price * quantity`.
    ///
    /// Lines of a persisted order were priced with
    /// [`OrderLine::checked_line_total`], so this cannot overflow for them.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// `unit_price * quantity`, or `None` on overflow.
    pub fn checked_line_total(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

impl From<OrderLineRecord> for OrderLine {
    fn from(r: OrderLineRecord) -> Self {
        Self {
            ticket_type_id: r.ticket_type_id,
            quantity: r.quantity,
            unit_price: r.unit_price,
        }
    }
}

impl From<&OrderLine> for OrderLineRecord {
    fn from(l: &OrderLine) -> Self {
        Self {
            ticket_type_id: l.ticket_type_id.clone(),
            quantity: l.quantity,
            unit_price: l.unit_price,
        }
    }
}

/// The purchase header.
///
/// Totals are computed once at creation and read back exactly as persisted;
/// later catalog price changes never touch them. Status changes only through
/// [`Order::plan_transition`] and [`Order::plan_refund_request`], which check
/// the state machine. Payment outcomes only ever move an order out of
/// `pending` ([`Order::plan_payment_outcome`]), and an approved refund can no
/// longer be rejected:
///
/// ```text
/// Pending ──┬──► Paid ◄──────────┐
///           │     │              │ (rejected)
///           │     ▼              │
///           │   RefundPending ───┴──► Refunded
///           │
///           └──► Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    buyer_id: BuyerId,
    event_id: EventId,
    lines: Vec<OrderLine>,
    subtotal: Money,
    service_fee: Money,
    net_amount: Money,
    status: OrderStatus,
    payment_method: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    refund_reason: Option<String>,
    refund_requested_at: Option<DateTime<Utc>>,
    refund_approved_by: Option<String>,
}

impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn buyer_id(&self) -> &BuyerId {
        &self.buyer_id
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn service_fee(&self) -> Money {
        self.service_fee
    }

    pub fn net_amount(&self) -> Money {
        self.net_amount
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn refund_reason(&self) -> Option<&str> {
        self.refund_reason.as_deref()
    }

    pub fn refund_requested_at(&self) -> Option<DateTime<Utc>> {
        self.refund_requested_at
    }

    /// Operator who approved the refund, once an approval is paying it out.
    pub fn refund_approved_by(&self) -> Option<&str> {
        self.refund_approved_by.as_deref()
    }

    /// Total number of tickets across all lines.
    pub fn ticket_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn is_owned_by(&self, buyer_id: &BuyerId) -> bool {
        &self.buyer_id == buyer_id
    }

    /// Builds the guarded change that moves this order to `to`.
    ///
    /// Does not check refund ownership or eligibility; refund requests go
    /// through [`Order::plan_refund_request`].
    pub fn plan_transition(
        &self,
        to: OrderStatus,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<StatusChange, OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        if self.status == OrderStatus::RefundPending
            && to == OrderStatus::Paid
            && self.refund_approved_by.is_some()
        {
            return Err(OrderError::RefundInProgress { order_id: self.id });
        }
        Ok(self.change(to, actor, at))
    }

    /// Builds the change a payment outcome asks for, moving a `pending`
    /// order to `to` (`paid` or `failed`).
    ///
    /// Returns `None` when the order already left `pending` in agreement
    /// with the outcome: `failed` for a decline, or `paid` or any later
    /// refund status for an authorization.
    pub fn plan_payment_outcome(
        &self,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusChange>, OrderError> {
        if self.status == OrderStatus::Pending {
            return self
                .plan_transition(to, &Actor::PaymentGateway, at)
                .map(Some);
        }

        let settled = match to {
            OrderStatus::Paid => matches!(
                self.status,
                OrderStatus::Paid | OrderStatus::RefundPending | OrderStatus::Refunded
            ),
            _ => self.status == to,
        };
        if settled {
            Ok(None)
        } else {
            Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    /// Builds the approval that claims a `refund_pending` order for
    /// `operator` before its money is returned.
    pub fn plan_refund_approval(
        &self,
        operator: &str,
        at: DateTime<Utc>,
    ) -> Result<RefundApproval, OrderError> {
        if self.status != OrderStatus::RefundPending {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Refunded,
            });
        }
        if self.refund_approved_by.is_some() {
            return Err(OrderError::RefundInProgress { order_id: self.id });
        }
        Ok(RefundApproval {
            order_id: self.id,
            expected_version: self.version,
            approved_by: Some(operator.to_string()),
            at,
        })
    }

    /// Builds the change that withdraws this order's refund approval.
    pub fn plan_approval_withdrawal(&self, at: DateTime<Utc>) -> RefundApproval {
        RefundApproval {
            order_id: self.id,
            expected_version: self.version,
            approved_by: None,
            at,
        }
    }

    /// Builds the change for a buyer's refund request.
    pub fn plan_refund_request(
        &self,
        buyer_id: &BuyerId,
        reason: Option<String>,
        event_starts_at: DateTime<Utc>,
        policy: &RefundPolicy,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, OrderError> {
        if !self.is_owned_by(buyer_id) {
            return Err(OrderError::NotOrderOwner { order_id: self.id });
        }
        if !self.status.can_transition_to(OrderStatus::RefundPending) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::RefundPending,
            });
        }
        policy
            .check(self.created_at, event_starts_at, now)
            .map_err(|reason| OrderError::IneligibleForRefund { reason })?;

        let mut change = self.change(
            OrderStatus::RefundPending,
            &Actor::Buyer(buyer_id.clone()),
            now,
        );
        change.refund_reason = reason;
        change.refund_requested_at = Some(now);
        Ok(change)
    }

    fn change(&self, to: OrderStatus, actor: &Actor, at: DateTime<Utc>) -> StatusChange {
        StatusChange {
            order_id: self.id,
            expected_version: self.version,
            from: self.status,
            to,
            actor: actor.to_string(),
            at,
            refund_reason: None,
            refund_requested_at: None,
        }
    }
}

impl From<OrderRecord> for Order {
    fn from(r: OrderRecord) -> Self {
        Self {
            id: r.id,
            buyer_id: r.buyer_id,
            event_id: r.event_id,
            lines: r.lines.into_iter().map(OrderLine::from).collect(),
            subtotal: r.subtotal,
            service_fee: r.service_fee,
            net_amount: r.net_amount,
            status: r.status,
            payment_method: r.payment_method,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
            refund_reason: r.refund_reason,
            refund_requested_at: r.refund_requested_at,
            refund_approved_by: r.refund_approved_by,
        }
    }
}
