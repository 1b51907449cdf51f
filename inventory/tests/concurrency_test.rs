//! Concurrent hold requests against a shared store.
//!
//! Run with: `cargo test --test concurrency_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use boxoffice_inventory::{
    ConflictPolicy, HoldType, TransactionFilter, TransactionType, service::CreateHoldRequest,
};
use common::{admin, buyer, harness_with_policy};

/// 100 buyers race for 10 tickets, one ticket each.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_tickets_are_never_granted_twice() {
    let h = harness_with_policy(ConflictPolicy::DenyRequest);
    let (event_id, ticket_type_id) = h.seed(10).await;

    let mut handles = Vec::with_capacity(100);
    for i in 0..100 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .create_hold(
                    &buyer(&format!("buyer-{i}")),
                    CreateHoldRequest {
                        event_id,
                        ticket_type_id,
                        quantity: 1,
                        session_id: None,
                        hold_type: HoldType::Checkout,
                        duration_minutes: None,
                    },
                )
                .await
                .unwrap()
        }));
    }

    let mut granted = 0;
    let mut declined = 0;
    for handle in handles {
        let update = handle.await.unwrap();
        if update.success {
            granted += update.hold.unwrap().quantity;
        } else {
            assert!(update.hold.is_none());
            declined += 1;
        }
    }

    assert_eq!(granted, 10);
    assert_eq!(declined, 90);
    assert_eq!(h.stored(event_id, ticket_type_id).await, (10, 0, 10));
    assert_eq!(h.available(event_id, ticket_type_id).await, 0);
    assert!(h.consistent().await);

    let creates = h
        .service
        .transactions(&admin(), TransactionFilter::default())
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.transaction_type == TransactionType::HoldCreate)
        .count();
    assert_eq!(creates, 10);
}

/// Partial fulfillment under contention still never oversells.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partial_grants_add_up_to_the_total() {
    let h = harness_with_policy(ConflictPolicy::PartialFulfill);
    let (event_id, ticket_type_id) = h.seed(25).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .create_hold(
                    &buyer(&format!("buyer-{i}")),
                    CreateHoldRequest {
                        event_id,
                        ticket_type_id,
                        quantity: 3,
                        session_id: None,
                        hold_type: HoldType::Checkout,
                        duration_minutes: None,
                    },
                )
                .await
                .unwrap()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if let Some(hold) = handle.await.unwrap().hold {
            granted += hold.quantity;
        }
    }

    assert_eq!(granted, 25);
    assert_eq!(h.stored(event_id, ticket_type_id).await, (25, 0, 25));
    assert!(h.consistent().await);
}

/// Concurrent releases of the same hold return its units once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_releases_are_idempotent() {
    let h = harness_with_policy(ConflictPolicy::PartialFulfill);
    let (event_id, ticket_type_id) = h.seed(10).await;
    let owner = buyer("owner");

    let hold = h
        .service
        .create_hold(
            &owner,
            CreateHoldRequest {
                event_id,
                ticket_type_id,
                quantity: 4,
                session_id: None,
                hold_type: HoldType::Checkout,
                duration_minutes: None,
            },
        )
        .await
        .unwrap()
        .hold
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = h.service.clone();
        let owner = owner.clone();
        handles.push(tokio::spawn(async move {
            service.release_hold(&owner, hold.id, None).await.unwrap()
        }));
    }

    let mut with_entry = 0;
    for handle in handles {
        let update = handle.await.unwrap();
        assert!(update.success);
        if update.transaction.is_some() {
            with_entry += 1;
        }
    }

    assert_eq!(with_entry, 1);
    assert_eq!(h.stored(event_id, ticket_type_id).await, (10, 0, 0));
    assert!(h.consistent().await);
}
