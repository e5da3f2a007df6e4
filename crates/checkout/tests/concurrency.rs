//! Concurrency properties of checkout on a multi-threaded runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use checkout::{
    CheckoutConfig, CheckoutError, CheckoutOrchestrator, GatewayError, InMemoryPaymentGateway,
    PaymentGateway, PaymentOutcome,
};
use common::{BuyerId, Money, OrderId, OrderStatus, TicketTypeId};
use domain::{DomainError, Order, OrderError, PurchaseRequest, SystemClock};
use store::{EventRecord, InMemoryTicketingStore, LineRequest, TicketTypeRecord, TicketingStore};

/// Counts every refund call that reaches the gateway, and holds each one
/// long enough for competing requests to overlap it.
#[derive(Default)]
struct CountingGateway {
    inner: InMemoryPaymentGateway,
    refund_calls: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for CountingGateway {
    async fn authorize(
        &self,
        order_id: OrderId,
        buyer_id: &BuyerId,
        amount: Money,
        payment_method: &str,
    ) -> Result<PaymentOutcome, GatewayError> {
        self.inner
            .authorize(order_id, buyer_id, amount, payment_method)
            .await
    }

    async fn refund(&self, order_id: OrderId, amount: Money) -> Result<(), GatewayError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        self.inner.refund(order_id, amount).await
    }
}

async fn orchestrator(
    ticket_types: &[(&str, u32)],
) -> Arc<CheckoutOrchestrator<InMemoryTicketingStore>> {
    orchestrator_with(ticket_types, InMemoryPaymentGateway::shared()).await
}

async fn orchestrator_with(
    ticket_types: &[(&str, u32)],
    gateway: Arc<dyn PaymentGateway>,
) -> Arc<CheckoutOrchestrator<InMemoryTicketingStore>> {
    let store = InMemoryTicketingStore::new();
    store
        .insert_event(EventRecord::new(
            "festival",
            "Festival",
            Utc::now() + Duration::days(30),
        ))
        .await
        .unwrap();
    for (id, total) in ticket_types {
        store
            .insert_ticket_type(TicketTypeRecord::new(
                *id,
                "festival",
                *id,
                Money::from_major(100),
                *total,
            ))
            .await
            .unwrap();
    }

    Arc::new(CheckoutOrchestrator::new(
        store,
        gateway,
        Arc::new(SystemClock),
        CheckoutConfig::default(),
    ))
}

fn request(buyer: usize, lines: Vec<LineRequest>) -> PurchaseRequest {
    PurchaseRequest::new(format!("buyer-{buyer}"), "festival", lines, "card")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_buyers_race_for_the_last_vip_ticket() {
    let checkout = orchestrator(&[("VIP", 1)]).await;

    let a = tokio::spawn({
        let checkout = checkout.clone();
        async move {
            checkout
                .checkout(request(1, vec![LineRequest::new("VIP", 1)]))
                .await
        }
    });
    let b = tokio::spawn({
        let checkout = checkout.clone();
        async move {
            checkout
                .checkout(request(2, vec![LineRequest::new("VIP", 1)]))
                .await
        }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].status(), OrderStatus::Pending);
    assert_eq!(winners[0].lines()[0].ticket_type_id, TicketTypeId::new("VIP"));

    let loser = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one checkout must be rejected");
    match loser {
        CheckoutError::Domain(DomainError::Order(
            OrderError::InsufficientInventory { ticket_type_id, .. },
        )) => assert_eq!(ticket_type_id, &TicketTypeId::new("VIP")),
        other => panic!("expected insufficient inventory, got {other:?}"),
    }

    assert_eq!(
        checkout.availability(&TicketTypeId::new("VIP")).await.unwrap(),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn heavy_contention_never_oversells() {
    const CAPACITY: u32 = 50;
    let checkout = orchestrator(&[("pista", CAPACITY), ("platea", CAPACITY)]).await;

    let mut handles = Vec::new();
    for i in 0..200 {
        let checkout = checkout.clone();
        handles.push(tokio::spawn(async move {
            let quantity = 1 + (i % 3) as u32;
            // Alternate line order so overlapping multi-line checkouts contend.
            let lines = if i % 2 == 0 {
                vec![LineRequest::new("pista", quantity), LineRequest::new("platea", 1)]
            } else {
                vec![LineRequest::new("platea", 1), LineRequest::new("pista", quantity)]
            };
            checkout.checkout(request(i, lines)).await
        }));
    }

    let mut sold_pista = 0;
    let mut sold_platea = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => {
                for line in order.lines() {
                    if line.ticket_type_id.as_str() == "pista" {
                        sold_pista += line.quantity;
                    } else {
                        sold_platea += line.quantity;
                    }
                }
            }
            Err(e) => assert_eq!(e.code(), "insufficient_inventory"),
        }
    }

    let pista_left = checkout
        .availability(&TicketTypeId::new("pista"))
        .await
        .unwrap();
    let platea_left = checkout
        .availability(&TicketTypeId::new("platea"))
        .await
        .unwrap();

    assert!(sold_pista <= CAPACITY);
    assert!(sold_platea <= CAPACITY);
    assert_eq!(sold_pista + pista_left, CAPACITY);
    assert_eq!(sold_platea + platea_left, CAPACITY);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_compensation_releases_once() {
    let checkout = orchestrator(&[("pista", 10)]).await;
    let order_id = checkout
        .checkout(request(1, vec![LineRequest::new("pista", 6)]))
        .await
        .unwrap()
        .id();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let checkout = checkout.clone();
        handles.push(tokio::spawn(async move {
            checkout
                .handle_payment_callback(
                    order_id,
                    PaymentOutcome::Declined {
                        reason: "declined".into(),
                    },
                )
                .await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap();
        if let Ok(order) = result {
            assert_eq!(order.status(), OrderStatus::Failed);
        }
    }

    assert_eq!(
        checkout.availability(&TicketTypeId::new("pista")).await.unwrap(),
        10
    );
    assert_eq!(checkout.history(order_id).await.unwrap().len(), 1);
}

async fn refund_pending_order(
    checkout: &CheckoutOrchestrator<InMemoryTicketingStore>,
) -> Order {
    let order = checkout
        .checkout(request(1, vec![LineRequest::new("pista", 4)]))
        .await
        .unwrap();
    checkout.pay(order.id()).await.unwrap();
    checkout
        .request_refund(order.id(), &BuyerId::new("buyer-1"), None)
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_refund_once() {
    let gateway = Arc::new(CountingGateway::default());
    let checkout = orchestrator_with(&[("pista", 10)], gateway.clone()).await;
    let order_id = refund_pending_order(&checkout).await.id();

    let approvals: Vec<_> = ["ana", "bo"]
        .into_iter()
        .map(|operator| {
            let checkout = checkout.clone();
            tokio::spawn(async move { checkout.approve_refund(order_id, operator.into()).await })
        })
        .collect();
    let mut results = Vec::new();
    for approval in approvals {
        results.push(approval.await.unwrap());
    }

    let refunded: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(refunded.len(), 1);
    assert_eq!(refunded[0].status(), OrderStatus::Refunded);
    let loser = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one approval must lose");
    assert!(
        matches!(loser.code(), "refund_in_progress" | "concurrent_modification"),
        "unexpected error {loser:?}"
    );

    assert_eq!(gateway.refund_calls.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.inner.refund_count().await, 1);
    assert_eq!(
        checkout.availability(&TicketTypeId::new("pista")).await.unwrap(),
        10
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approval_racing_rejection_settles_one_way() {
    let gateway = Arc::new(CountingGateway::default());
    let checkout = orchestrator_with(&[("pista", 10)], gateway.clone()).await;
    let order_id = refund_pending_order(&checkout).await.id();

    let approve = tokio::spawn({
        let checkout = checkout.clone();
        async move { checkout.approve_refund(order_id, "ana".into()).await }
    });
    let reject = tokio::spawn({
        let checkout = checkout.clone();
        async move { checkout.reject_refund(order_id, "bo".into()).await }
    });
    let (approved, rejected) = (approve.await.unwrap(), reject.await.unwrap());

    let settled = checkout.get_order(order_id).await.unwrap();
    let refunds = gateway.refund_calls.load(Ordering::SeqCst);
    match (approved, rejected) {
        (Ok(_), Err(_)) => {
            assert_eq!(settled.status(), OrderStatus::Refunded);
            assert_eq!(refunds, 1);
        }
        (Err(_), Ok(_)) => {
            assert_eq!(settled.status(), OrderStatus::Paid);
            assert_eq!(refunds, 0);
        }
        other => panic!("expected exactly one operator to win, got {other:?}"),
    }
}
