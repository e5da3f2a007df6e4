//! Integration tests for pricing, the inventory ledger and the order repository.
//!
//! These run against the in-memory store and exercise the full order
//! lifecycle including inventory effects.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{BuyerId, EventId, Money, OrderStatus, TicketTypeId};
use domain::{
    Actor, Clock, DomainError, FeeRate, InventoryLedger, ManualClock, Order, OrderError,
    OrderRepository, PricingEngine, PurchaseRequest, RefundIneligibility, RefundPolicy,
};
use store::{
    EventRecord, InMemoryTicketingStore, LineRequest, ReservationOutcome, TicketTypeRecord,
    TicketingStore,
};

struct TestHarness {
    store: InMemoryTicketingStore,
    clock: ManualClock,
    pricing: PricingEngine<InMemoryTicketingStore>,
    ledger: InventoryLedger<InMemoryTicketingStore>,
    orders: OrderRepository<InMemoryTicketingStore>,
}

impl TestHarness {
    /// Festival in 30 days with "pista" (100.00 x 10) and "vip" (300.00 x 1).
    async fn new() -> Self {
        let store = InMemoryTicketingStore::new();
        let clock = ManualClock::new(Utc::now());

        store
            .insert_event(EventRecord::new(
                "festival",
                "Summer Festival",
                clock.now() + Duration::days(30),
            ))
            .await
            .unwrap();
        store
            .insert_ticket_type(TicketTypeRecord::new(
                "pista",
                "festival",
                "Pista",
                Money::from_major(100),
                10,
            ))
            .await
            .unwrap();
        store
            .insert_ticket_type(TicketTypeRecord::new(
                "vip",
                "festival",
                "VIP",
                Money::from_major(300),
                1,
            ))
            .await
            .unwrap();

        Self {
            pricing: PricingEngine::new(store.clone(), FeeRate::default()),
            ledger: InventoryLedger::new(store.clone()),
            orders: OrderRepository::new(
                store.clone(),
                Arc::new(clock.clone()),
                RefundPolicy::default(),
            ),
            store,
            clock,
        }
    }

    async fn place(&self, lines: Vec<LineRequest>) -> Result<Order, DomainError> {
        let request = PurchaseRequest::new("buyer-1", "festival", lines, "card");
        let quote = self.pricing.price(&request.event_id, &request.lines).await?;
        self.orders.create(&request, quote).await
    }

    async fn available(&self, id: &str) -> u32 {
        self.ledger
            .availability(&TicketTypeId::new(id))
            .await
            .unwrap()
    }

    async fn paid_order(&self) -> Order {
        let order = self
            .place(vec![LineRequest::new("pista", 2)])
            .await
            .unwrap();
        self.orders
            .transition_status(order.id(), OrderStatus::Paid, Actor::PaymentGateway)
            .await
            .unwrap()
    }
}

mod pricing {
    use super::*;

    #[tokio::test]
    async fn prices_from_catalog() {
        let h = TestHarness::new().await;

        let quote = h
            .pricing
            .price(
                &EventId::new("festival"),
                &[LineRequest::new("vip", 1), LineRequest::new("pista", 2)],
            )
            .await
            .unwrap();

        assert_eq!(quote.subtotal, Money::from_major(500));
        assert_eq!(quote.service_fee, Money::from_major(50));
        assert_eq!(quote.net_amount, Money::from_major(450));
        assert_eq!(quote.lines[0].ticket_type_id, TicketTypeId::new("pista"));
    }

    #[tokio::test]
    async fn merges_duplicate_lines() {
        let h = TestHarness::new().await;

        let quote = h
            .pricing
            .price(
                &EventId::new("festival"),
                &[LineRequest::new("pista", 1), LineRequest::new("pista", 2)],
            )
            .await
            .unwrap();

        assert_eq!(quote.lines.len(), 1);
        assert_eq!(quote.lines[0].quantity, 3);
        assert_eq!(quote.subtotal, Money::from_major(300));
    }

    #[tokio::test]
    async fn ticket_type_of_another_event_is_unknown() {
        let h = TestHarness::new().await;
        h.store
            .insert_event(EventRecord::new("other", "Other", Utc::now()))
            .await
            .unwrap();

        let err = h
            .pricing
            .price(&EventId::new("other"), &[LineRequest::new("vip", 1)])
            .await
            .unwrap_err();

        assert_eq!(err.code(), "unknown_ticket_type");
    }

    #[tokio::test]
    async fn configured_fee_rate_is_applied() {
        let h = TestHarness::new().await;
        let pricing = PricingEngine::new(h.store.clone(), FeeRate::from_bps(250).unwrap());

        let quote = pricing
            .price(&EventId::new("festival"), &[LineRequest::new("vip", 1)])
            .await
            .unwrap();

        assert_eq!(quote.service_fee, Money::from_cents(750));
        assert_eq!(quote.net_amount, Money::from_cents(29_250));
    }
}

mod ledger {
    use super::*;

    #[tokio::test]
    async fn reserve_decrements_and_release_restores() {
        let h = TestHarness::new().await;
        let pista = TicketTypeId::new("pista");

        let outcome = h.ledger.reserve(&pista, 4).await.unwrap();
        assert!(outcome.is_granted());
        assert_eq!(h.available("pista").await, 6);

        let available = h.ledger.release(&pista, 4).await.unwrap();
        assert_eq!(available, 10);
    }

    #[tokio::test]
    async fn multi_line_reservation_rolls_back_completely() {
        let h = TestHarness::new().await;
        h.ledger
            .reserve(&TicketTypeId::new("vip"), 1)
            .await
            .unwrap();

        let outcome = h
            .ledger
            .reserve_all(&[LineRequest::new("pista", 3), LineRequest::new("vip", 1)])
            .await
            .unwrap();

        match outcome {
            ReservationOutcome::Rejected(shortfall) => {
                assert_eq!(shortfall.ticket_type_id, TicketTypeId::new("vip"));
                assert_eq!(shortfall.available, 0);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(h.available("pista").await, 10);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let h = TestHarness::new().await;

        let err = h
            .ledger
            .reserve(&TicketTypeId::new("pista"), 0)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "invalid_quantity");
    }

    #[tokio::test]
    async fn unknown_ticket_type_is_not_insufficient_inventory() {
        let h = TestHarness::new().await;

        let err = h
            .ledger
            .reserve(&TicketTypeId::new("balcony"), 1)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "unknown_ticket_type");
    }

    #[tokio::test]
    async fn release_beyond_total_is_fatal_and_applies_nothing() {
        let h = TestHarness::new().await;
        let pista = TicketTypeId::new("pista");
        h.ledger.reserve(&pista, 2).await.unwrap();

        let err = h.ledger.release(&pista, 3).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::ConsistencyViolation {
                available: 8,
                total: 10,
                quantity: 3,
                ..
            }
        ));
        assert_eq!(h.available("pista").await, 8);
    }
}

mod repository {
    use super::*;

    #[tokio::test]
    async fn create_persists_pending_order_with_frozen_totals() {
        let h = TestHarness::new().await;

        let order = h
            .place(vec![LineRequest::new("pista", 2), LineRequest::new("vip", 1)])
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.version(), 1);
        assert_eq!(order.ticket_count(), 3);
        assert_eq!(order.subtotal(), Money::from_major(500));
        assert_eq!(h.available("pista").await, 8);
        assert_eq!(h.available("vip").await, 0);
    }

    #[tokio::test]
    async fn insufficient_inventory_creates_no_order() {
        let h = TestHarness::new().await;

        let err = h
            .place(vec![LineRequest::new("pista", 1), LineRequest::new("vip", 2)])
            .await
            .unwrap_err();

        assert_eq!(
            err.as_order_error(),
            Some(&OrderError::InsufficientInventory {
                ticket_type_id: TicketTypeId::new("vip"),
                requested: 2,
                available: 1,
            })
        );
        assert_eq!(h.store.order_count().await, 0);
        assert_eq!(h.available("pista").await, 10);
    }

    #[tokio::test]
    async fn price_change_does_not_touch_existing_orders() {
        let h = TestHarness::new().await;
        let order = h
            .place(vec![LineRequest::new("pista", 2)])
            .await
            .unwrap();

        h.store
            .update_unit_price(&TicketTypeId::new("pista"), Money::from_major(999))
            .await
            .unwrap();

        let reread = h.orders.load(order.id()).await.unwrap();
        assert_eq!(reread.subtotal(), Money::from_major(200));
        assert_eq!(reread.net_amount(), Money::from_major(180));
        assert_eq!(reread.lines()[0].unit_price, Money::from_major(100));
    }

    #[tokio::test]
    async fn failing_a_pending_order_releases_its_tickets() {
        let h = TestHarness::new().await;
        let order = h
            .place(vec![LineRequest::new("pista", 3), LineRequest::new("vip", 1)])
            .await
            .unwrap();

        let failed = h
            .orders
            .transition_status(order.id(), OrderStatus::Failed, Actor::System)
            .await
            .unwrap();

        assert_eq!(failed.status(), OrderStatus::Failed);
        assert_eq!(failed.version(), 2);
        assert_eq!(h.available("pista").await, 10);
        assert_eq!(h.available("vip").await, 1);
    }

    #[tokio::test]
    async fn retried_failure_releases_nothing_twice() {
        let h = TestHarness::new().await;
        let order = h
            .place(vec![LineRequest::new("pista", 3)])
            .await
            .unwrap();
        h.orders
            .transition_status(order.id(), OrderStatus::Failed, Actor::System)
            .await
            .unwrap();

        let retry = h
            .orders
            .transition_status(order.id(), OrderStatus::Failed, Actor::System)
            .await;

        assert!(matches!(
            retry,
            Err(DomainError::Order(OrderError::InvalidTransition { .. }))
        ));
        assert_eq!(h.available("pista").await, 10);
    }

    #[tokio::test]
    async fn transitions_outside_the_table_leave_status_unchanged() {
        let h = TestHarness::new().await;
        let order = h
            .place(vec![LineRequest::new("pista", 1)])
            .await
            .unwrap();
        h.orders
            .transition_status(order.id(), OrderStatus::Failed, Actor::System)
            .await
            .unwrap();

        for target in [OrderStatus::Paid, OrderStatus::Refunded, OrderStatus::Pending] {
            let err = h
                .orders
                .transition_status(order.id(), target, Actor::Operator("ana".into()))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "invalid_transition");
        }

        let reread = h.orders.load(order.id()).await.unwrap();
        assert_eq!(reread.status(), OrderStatus::Failed);
    }

    #[tokio::test]
    async fn full_refund_flow_restores_inventory() {
        let h = TestHarness::new().await;
        let order = h.paid_order().await;
        assert_eq!(h.available("pista").await, 8);

        h.clock.advance(Duration::days(2));
        let pending = h
            .orders
            .request_refund(order.id(), &BuyerId::new("buyer-1"), Some("sick".into()))
            .await
            .unwrap();
        assert_eq!(pending.status(), OrderStatus::RefundPending);
        assert_eq!(pending.refund_reason(), Some("sick"));
        assert!(pending.refund_requested_at().is_some());
        assert_eq!(h.available("pista").await, 8);

        let refunded = h
            .orders
            .transition_status(
                order.id(),
                OrderStatus::Refunded,
                Actor::Operator("ana".into()),
            )
            .await
            .unwrap();
        assert_eq!(refunded.status(), OrderStatus::Refunded);
        assert_eq!(h.available("pista").await, 10);

        let history = h.orders.history(order.id()).await.unwrap();
        let steps: Vec<_> = history.iter().map(|e| (e.from, e.to)).collect();
        assert_eq!(
            steps,
            vec![
                (OrderStatus::Pending, OrderStatus::Paid),
                (OrderStatus::Paid, OrderStatus::RefundPending),
                (OrderStatus::RefundPending, OrderStatus::Refunded),
            ]
        );
        assert_eq!(history[1].actor, "buyer:buyer-1");
    }

    #[tokio::test]
    async fn rejected_refund_reverts_to_paid() {
        let h = TestHarness::new().await;
        let order = h.paid_order().await;
        h.orders
            .request_refund(order.id(), &BuyerId::new("buyer-1"), None)
            .await
            .unwrap();

        let reverted = h
            .orders
            .transition_status(order.id(), OrderStatus::Paid, Actor::Operator("ana".into()))
            .await
            .unwrap();

        assert_eq!(reverted.status(), OrderStatus::Paid);
        assert_eq!(h.available("pista").await, 8);
    }

    #[tokio::test]
    async fn refund_after_window_is_ineligible() {
        let h = TestHarness::new().await;
        let order = h.paid_order().await;

        h.clock.advance(Duration::days(8));
        let err = h
            .orders
            .request_refund(order.id(), &BuyerId::new("buyer-1"), None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "ineligible_for_refund");
        let reread = h.orders.load(order.id()).await.unwrap();
        assert_eq!(reread.status(), OrderStatus::Paid);
    }

    #[tokio::test]
    async fn refund_close_to_event_is_ineligible() {
        let h = TestHarness::new().await;
        h.clock.advance(Duration::days(27));
        let order = h.paid_order().await;

        h.clock.advance(Duration::hours(25));
        let err = h
            .orders
            .request_refund(order.id(), &BuyerId::new("buyer-1"), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::IneligibleForRefund {
                reason: RefundIneligibility::TooCloseToEvent { .. }
            })
        ));
    }

    #[tokio::test]
    async fn refund_pending_through_transition_requires_buyer() {
        let h = TestHarness::new().await;
        let order = h.paid_order().await;

        let err = h
            .orders
            .transition_status(order.id(), OrderStatus::RefundPending, Actor::System)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_order_owner");

        let ok = h
            .orders
            .transition_status(
                order.id(),
                OrderStatus::RefundPending,
                Actor::Buyer(BuyerId::new("buyer-1")),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), OrderStatus::RefundPending);
    }

    #[tokio::test]
    async fn find_by_buyer_returns_newest_first() {
        let h = TestHarness::new().await;
        let first = h
            .place(vec![LineRequest::new("pista", 1)])
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(1));
        let second = h
            .place(vec![LineRequest::new("pista", 1)])
            .await
            .unwrap();

        let orders = h.orders.find_by_buyer(&BuyerId::new("buyer-1")).await.unwrap();
        let ids: Vec<_> = orders.iter().map(Order::id).collect();
        assert_eq!(ids, vec![second.id(), first.id()]);

        let none = h.orders.find_by_buyer(&BuyerId::new("nobody")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn pending_orders_before_cutoff() {
        let h = TestHarness::new().await;
        let stale = h
            .place(vec![LineRequest::new("pista", 1)])
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(30));
        h.place(vec![LineRequest::new("pista", 1)])
            .await
            .unwrap();

        let cutoff = h.clock.now() - Duration::minutes(15);
        let found = h.orders.find_pending_created_before(cutoff).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), stale.id());
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let h = TestHarness::new().await;
        let id = common::OrderId::new();

        let err = h
            .orders
            .transition_status(id, OrderStatus::Paid, Actor::PaymentGateway)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::OrderNotFound(found) if found == id));
        assert!(h.orders.history(id).await.is_err());
    }
}
