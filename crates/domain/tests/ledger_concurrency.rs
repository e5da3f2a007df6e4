//! Concurrency properties of the inventory ledger.

use common::{Money, TicketTypeId};
use domain::InventoryLedger;
use store::{
    EventRecord, InMemoryTicketingStore, LineRequest, ReservationOutcome, TicketTypeRecord,
    TicketingStore,
};

async fn seeded_ledger() -> InventoryLedger<InMemoryTicketingStore> {
    let store = InMemoryTicketingStore::new();
    store
        .insert_event(EventRecord::new("festival", "Festival", chrono::Utc::now()))
        .await
        .unwrap();
    for (id, total) in [("a", 25), ("b", 25), ("c", 7)] {
        store
            .insert_ticket_type(TicketTypeRecord::new(
                id,
                "festival",
                id,
                Money::from_major(10),
                total,
            ))
            .await
            .unwrap();
    }
    InventoryLedger::new(store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_reservations_never_exceed_capacity() {
    let ledger = seeded_ledger().await;
    let c = TicketTypeId::new("c");

    let mut handles = Vec::new();
    for i in 0..40u32 {
        let ledger = ledger.clone();
        let c = c.clone();
        handles.push(tokio::spawn(async move {
            ledger.reserve(&c, 1 + i % 3).await.unwrap()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if let ReservationOutcome::Granted(grants) = handle.await.unwrap() {
            granted += grants.iter().map(|g| g.quantity).sum::<u32>();
        }
    }

    let left = ledger.availability(&c).await.unwrap();
    assert!(granted <= 7);
    assert_eq!(granted + left, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn opposite_line_orders_do_not_deadlock() {
    let ledger = seeded_ledger().await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let ledger = ledger.clone();
        let lines = if i % 2 == 0 {
            vec![LineRequest::new("a", 1), LineRequest::new("b", 1)]
        } else {
            vec![LineRequest::new("b", 1), LineRequest::new("a", 1)]
        };
        handles.push(tokio::spawn(async move {
            ledger.reserve_all(&lines).await.unwrap()
        }));
    }

    let results = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_granted() {
                granted += 1;
            }
        }
        granted
    })
    .await
    .expect("reservations deadlocked");

    assert_eq!(results, 25);
    assert_eq!(ledger.availability(&TicketTypeId::new("a")).await.unwrap(), 0);
    assert_eq!(ledger.availability(&TicketTypeId::new("b")).await.unwrap(), 0);
}
