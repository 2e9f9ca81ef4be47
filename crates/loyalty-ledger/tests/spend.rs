//! Manual spend and balance query.

use std::sync::Arc;

use chrono::{Duration, Utc};
use loyalty_ledger::{Ledger, SpendError};
use loyalty_testing::{fixtures, FailPoint, LineBuilder, MemoryLedgerStore};
use uuid::Uuid;

fn setup() -> (MemoryLedgerStore, Ledger) {
    let store = MemoryLedgerStore::new();
    let ledger = Ledger::new(Arc::new(store.clone()));
    (store, ledger)
}

#[tokio::test]
async fn spend_drains_earliest_expiring_line_first() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    let later = LineBuilder::new(customer)
        .points(10)
        .expires_in(Duration::days(5))
        .build();
    let sooner = LineBuilder::new(customer)
        .points(10)
        .expires_in(Duration::days(1))
        .build();
    store.seed_line(later.clone());
    store.seed_line(sooner.clone());

    let remaining = ledger.spend(customer, 15).await.unwrap();

    assert_eq!(remaining, 5);
    assert_eq!(store.line(sooner.id).unwrap().available_points, 0);
    assert_eq!(store.line(later.id).unwrap().available_points, 5);
    assert_eq!(ledger.balance(customer).await.unwrap(), 5);
}

#[tokio::test]
async fn spend_of_entire_balance_leaves_zero() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    store.seed_line(LineBuilder::new(customer).points(1).build());

    assert_eq!(ledger.spend(customer, 1).await.unwrap(), 0);
    assert_eq!(ledger.balance(customer).await.unwrap(), 0);
}

#[tokio::test]
async fn insufficient_balance_changes_nothing() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    let line = LineBuilder::new(customer).points(10).build();
    store.seed_line(line.clone());

    let err = ledger.spend(customer, 20).await.unwrap_err();

    assert!(matches!(
        err,
        SpendError::InsufficientBalance {
            requested: 20,
            available: 10
        }
    ));
    assert!(err.is_client_error());
    assert_eq!(store.line(line.id).unwrap().available_points, 10);
    assert_eq!(ledger.balance(customer).await.unwrap(), 10);
}

#[tokio::test]
async fn customer_without_active_lines_is_not_found() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    store.seed_line(
        LineBuilder::new(customer)
            .expires_in(Duration::days(-1))
            .build(),
    );
    store.seed_line(LineBuilder::new(customer).cancelled().build());

    let err = ledger.spend(customer, 1).await.unwrap_err();

    assert!(matches!(err, SpendError::CustomerNotFound(id) if id == customer));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn lines_with_nothing_left_still_count_as_a_known_customer() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    store.seed_line(LineBuilder::new(customer).points(5).available(0).build());

    let err = ledger.spend(customer, 1).await.unwrap_err();

    assert!(matches!(
        err,
        SpendError::InsufficientBalance { available: 0, .. }
    ));
}

#[tokio::test]
async fn non_positive_amount_is_rejected_before_touching_the_store() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    store.seed_line(LineBuilder::new(customer).build());

    for points in [0, -3] {
        let err = ledger.spend(customer, points).await.unwrap_err();
        assert!(matches!(err, SpendError::InvalidAmount(p) if p == points));
    }
}

#[tokio::test]
async fn spend_ignores_debt() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    store.seed_line(LineBuilder::new(customer).points(10).build());
    store.seed_debt(customer, 4);

    assert_eq!(ledger.spend(customer, 8).await.unwrap(), 2);
    assert_eq!(ledger.balance(customer).await.unwrap(), -2);
}

#[tokio::test]
async fn storage_failure_rolls_back_spend() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    let line = LineBuilder::new(customer).points(10).build();
    store.seed_line(line.clone());

    store.fail_on(FailPoint::Commit);
    let err = ledger.spend(customer, 4).await.unwrap_err();

    assert!(matches!(err, SpendError::Ledger(_)));
    assert_eq!(store.line(line.id).unwrap().available_points, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_spends_serialize() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    store.seed_line(LineBuilder::new(customer).points(10).build());

    let (first, second) = futures::join!(ledger.spend(customer, 6), ledger.spend(customer, 6));

    let (ok, err) = match (first, second) {
        (Ok(remaining), Err(err)) | (Err(err), Ok(remaining)) => (remaining, err),
        other => panic!("exactly one spend should succeed: {other:?}"),
    };
    assert_eq!(ok, 4);
    assert!(matches!(
        err,
        SpendError::InsufficientBalance {
            requested: 6,
            available: 4
        }
    ));
    assert_eq!(ledger.balance(customer).await.unwrap(), 4);
}

#[tokio::test]
async fn balance_is_available_minus_debt_over_active_lines() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    store.seed_line(LineBuilder::new(customer).points(7).build());
    store.seed_line(LineBuilder::new(customer).points(5).available(1).build());
    store.seed_line(
        LineBuilder::new(customer)
            .points(100)
            .expires_in(Duration::days(-2))
            .build(),
    );
    store.seed_line(LineBuilder::new(customer).points(100).cancelled().build());
    store.seed_debt(customer, 3);

    assert_eq!(ledger.balance(customer).await.unwrap(), 5);
}

#[tokio::test]
async fn balance_at_honours_expiry_boundary() {
    let (store, ledger) = setup();
    let customer = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::days(1);
    store.seed_line(LineBuilder::new(customer).points(4).expires_at(expires_at).build());

    assert_eq!(ledger.balance_at(customer, expires_at).await.unwrap(), 4);
    assert_eq!(
        ledger
            .balance_at(customer, expires_at + Duration::seconds(1))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn unknown_customer_has_zero_balance() {
    let (_, ledger) = setup();
    assert_eq!(ledger.balance(Uuid::new_v4()).await.unwrap(), 0);
}

#[tokio::test]
async fn accrued_points_can_be_spent() {
    let (_, ledger) = setup();
    let (customer, order) = (Uuid::new_v4(), Uuid::new_v4());

    ledger
        .apply(&fixtures::order_placed(1, Utc::now(), customer, order, 1000))
        .await
        .unwrap();

    assert_eq!(ledger.spend(customer, 15).await.unwrap(), 5);
}
