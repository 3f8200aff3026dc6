//! Contention tests for the in-memory optimistic ledger.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use futures::future::join_all;
use rsvp_core::{
    Capacity, EventId, LedgerStore, RegistrationOutcome, RejectionReason, UnregistrationOutcome,
    UserId,
};
use rsvp_testing::{in_memory_ledger, init_test_tracing};
use std::collections::HashSet;
use std::sync::Arc;

async fn open(ledger: &Arc<dyn LedgerStore>, capacity: Capacity) -> EventId {
    let event = EventId::new();
    ledger
        .open_event(event, UserId::new(), capacity)
        .await
        .unwrap();
    event
}

/// Fire every `(event, user)` registration from its own task at once.
async fn register_all(
    ledger: &Arc<dyn LedgerStore>,
    event: EventId,
    users: &[UserId],
) -> Vec<RegistrationOutcome> {
    let handles: Vec<_> = users
        .iter()
        .map(|&user| {
            let ledger = Arc::clone(ledger);
            tokio::spawn(async move { ledger.register(event, user).await })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").unwrap())
        .collect()
}

fn count(outcomes: &[RegistrationOutcome], reason: Option<RejectionReason>) -> usize {
    outcomes.iter().filter(|o| o.reason() == reason).count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_seats_three_users() {
    init_test_tracing();
    let ledger = in_memory_ledger();
    let event = open(&ledger, Capacity::bounded(2)).await;
    let users = [UserId::new(), UserId::new(), UserId::new()];

    let outcomes = register_all(&ledger, event, &users).await;

    assert_eq!(count(&outcomes, None), 2);
    assert_eq!(count(&outcomes, Some(RejectionReason::Full)), 1);
    let attendance = ledger.attendance(event).await.unwrap().unwrap();
    assert_eq!(attendance.count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_seat_same_user_twice() {
    let ledger = in_memory_ledger();
    let event = open(&ledger, Capacity::bounded(1)).await;
    let user = UserId::new();

    let outcomes = register_all(&ledger, event, &[user, user]).await;

    assert_eq!(count(&outcomes, None), 1);
    let loser = outcomes
        .iter()
        .find(|o| !o.is_registered())
        .expect("one call must lose");
    assert!(matches!(
        loser.reason(),
        Some(RejectionReason::Duplicate | RejectionReason::Full)
    ));
    let attendance = ledger.attendance(event).await.unwrap().unwrap();
    assert_eq!(attendance.attendees(), &[user]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn hundred_users_one_seat() {
    let ledger = in_memory_ledger();
    let event = open(&ledger, Capacity::bounded(1)).await;
    let users: Vec<UserId> = (0..100).map(|_| UserId::new()).collect();

    let outcomes = register_all(&ledger, event, &users).await;

    assert_eq!(count(&outcomes, None), 1);
    assert_eq!(count(&outcomes, Some(RejectionReason::Full)), 99);
    assert_eq!(ledger.attendance(event).await.unwrap().unwrap().count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn final_count_is_min_of_capacity_and_distinct_users() {
    let ledger = in_memory_ledger();

    for (capacity, distinct) in [(5_u32, 3_usize), (5, 5), (5, 40), (0, 10)] {
        let event = open(&ledger, Capacity::bounded(capacity)).await;
        let pool: Vec<UserId> = (0..distinct).map(|_| UserId::new()).collect();
        // Every user tries twice.
        let attempts: Vec<UserId> = pool.iter().chain(pool.iter()).copied().collect();

        let outcomes = register_all(&ledger, event, &attempts).await;

        let expected = capacity.min(u32::try_from(distinct).unwrap());
        let attendance = ledger.attendance(event).await.unwrap().unwrap();
        assert_eq!(attendance.count(), expected);
        assert_eq!(count(&outcomes, None), expected as usize);

        let unique: HashSet<_> = attendance.attendees().iter().collect();
        assert_eq!(unique.len(), attendance.attendees().len());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unbounded_event_admits_every_distinct_user() {
    let ledger = in_memory_ledger();
    let event = open(&ledger, Capacity::Unbounded).await;
    let users: Vec<UserId> = (0..64).map(|_| UserId::new()).collect();

    let outcomes = register_all(&ledger, event, &users).await;

    assert_eq!(count(&outcomes, None), 64);
    assert_eq!(ledger.attendance(event).await.unwrap().unwrap().count(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn events_do_not_interfere() {
    let ledger = in_memory_ledger();
    let first = open(&ledger, Capacity::bounded(3)).await;
    let second = open(&ledger, Capacity::bounded(3)).await;
    let users: Vec<UserId> = (0..10).map(|_| UserId::new()).collect();

    let (a, b) = tokio::join!(
        register_all(&ledger, first, &users),
        register_all(&ledger, second, &users)
    );

    assert_eq!(count(&a, None), 3);
    assert_eq!(count(&b, None), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn churn_never_overbooks() {
    let ledger = in_memory_ledger();
    let event = open(&ledger, Capacity::bounded(4)).await;
    let users: Vec<UserId> = (0..12).map(|_| UserId::new()).collect();

    let handles: Vec<_> = users
        .iter()
        .map(|&user| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                for _ in 0..20 {
                    if ledger.register(event, user).await.unwrap().is_registered() {
                        let attendance = ledger.attendance(event).await.unwrap().unwrap();
                        assert!(attendance.count() <= 4);
                        ledger.unregister(event, user).await.unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in join_all(handles).await {
        handle.expect("task panicked");
    }
    assert_eq!(ledger.attendance(event).await.unwrap().unwrap().count(), 0);
}

#[tokio::test]
async fn register_unregister_register_succeeds_each_time() {
    let ledger = in_memory_ledger();
    let event = open(&ledger, Capacity::bounded(1)).await;
    let user = UserId::new();

    for _ in 0..3 {
        assert!(ledger.register(event, user).await.unwrap().is_registered());
        assert_eq!(
            ledger.unregister(event, user).await.unwrap(),
            UnregistrationOutcome::Unregistered { attendees_count: 0 }
        );
    }
}

#[tokio::test]
async fn repeated_unregister_is_idempotent() {
    let ledger = in_memory_ledger();
    let event = open(&ledger, Capacity::bounded(3)).await;
    let (stays, leaves) = (UserId::new(), UserId::new());
    ledger.register(event, stays).await.unwrap();
    ledger.register(event, leaves).await.unwrap();

    assert_eq!(
        ledger.unregister(event, leaves).await.unwrap(),
        UnregistrationOutcome::Unregistered { attendees_count: 1 }
    );
    for _ in 0..3 {
        assert_eq!(
            ledger.unregister(event, leaves).await.unwrap(),
            UnregistrationOutcome::NotRegistered { attendees_count: 1 }
        );
    }
}

#[tokio::test]
async fn never_registered_user_unregister_is_noop() {
    let ledger = in_memory_ledger();
    let event = open(&ledger, Capacity::bounded(3)).await;

    let outcome = ledger.unregister(event, UserId::new()).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.attendees_count(), 0);
}

#[tokio::test]
async fn register_on_unknown_event_creates_nothing() {
    let ledger = in_memory_ledger();
    let event = EventId::new();

    let outcome = ledger.register(event, UserId::new()).await.unwrap();

    assert_eq!(outcome, RegistrationOutcome::NOT_FOUND);
    assert!(ledger.attendance(event).await.unwrap().is_none());
    assert_eq!(
        ledger.unregister(event, UserId::new()).await.unwrap(),
        UnregistrationOutcome::NotFound
    );
}
