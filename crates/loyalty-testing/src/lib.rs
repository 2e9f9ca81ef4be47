//! Testing utilities for the loyalty ledger.
//!
//! - [`MemoryLedgerStore`]: a transactional in-memory store with failure injection
//! - [`fixtures`]: event constructors and a [`LineBuilder`] for seeding state
//!
//! ```ignore
//! use std::sync::Arc;
//! use loyalty_ledger::Ledger;
//! use loyalty_testing::{fixtures, LineBuilder, MemoryLedgerStore};
//!
//! let store = MemoryLedgerStore::new();
//! store.seed_line(LineBuilder::new(customer).points(10).available(2).build());
//! let ledger = Ledger::new(Arc::new(store.clone()));
//!
//! ledger.apply(&fixtures::order_canceled(1, Utc::now(), order)).await?;
//! assert_eq!(store.debt_for(customer), Some(6));
//! ```

pub mod fixtures;
mod memory;

pub use fixtures::LineBuilder;
pub use memory::{FailPoint, MemoryLedgerStore};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use loyalty_ledger::{EventHash, EventKind, LedgerStore, LedgerTx, RecordOutcome};
    use uuid::Uuid;

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryLedgerStore::new();
        let customer = Uuid::new_v4();

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_customer(customer).await.unwrap();
            tx.increment_debt(customer, 5).await.unwrap();
        }

        assert_eq!(store.debt_for(customer), None);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryLedgerStore::new();
        let customer = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.lock_customer(customer).await.unwrap();
        assert_eq!(tx.increment_debt(customer, 5).await.unwrap(), 5);
        assert_eq!(tx.increment_debt(customer, 2).await.unwrap(), 7);
        tx.commit().await.unwrap();

        assert_eq!(store.debt_for(customer), Some(7));
    }

    #[tokio::test]
    async fn event_record_conflicts_only_after_commit_or_within_tx() {
        let store = MemoryLedgerStore::new();
        let hash = EventHash::compute(EventKind::OrderPlaced, 1);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.insert_event_record_or_conflict(&hash).await.unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            tx.insert_event_record_or_conflict(&hash).await.unwrap(),
            RecordOutcome::Conflict
        );
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.insert_event_record_or_conflict(&hash).await.unwrap(),
            RecordOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn active_lines_are_ordered_by_expiry_and_exclude_cancelled() {
        let store = MemoryLedgerStore::new();
        let customer = Uuid::new_v4();
        let late = LineBuilder::new(customer).expires_in(chrono::Duration::days(9)).build();
        let early = LineBuilder::new(customer).expires_in(chrono::Duration::days(1)).build();
        let expired = LineBuilder::new(customer).expires_in(chrono::Duration::days(-1)).build();
        let cancelled = LineBuilder::new(customer).cancelled().build();
        for line in [late.clone(), early.clone(), expired, cancelled] {
            store.seed_line(line);
        }

        let mut tx = store.begin().await.unwrap();
        tx.lock_customer(customer).await.unwrap();
        let ids: Vec<Uuid> = tx
            .lock_active_lines(customer, Utc::now())
            .await
            .unwrap()
            .into_iter()
            .map(|line| line.id)
            .collect();

        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[tokio::test]
    async fn row_access_requires_customer_lock() {
        let store = MemoryLedgerStore::new();
        let customer = Uuid::new_v4();
        let line = LineBuilder::new(customer).build();
        store.seed_line(line.clone());

        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_debt(customer).await.is_err());
        assert!(tx.delete_all_lines_for_customer(customer).await.is_err());
        assert!(tx.mark_cancelled(line.id).await.is_err());
        // The unlocked peek stays allowed.
        assert!(tx.find_line_by_order_id(line.order_id).await.unwrap().is_some());

        tx.lock_customer(customer).await.unwrap();
        assert!(tx.lock_debt(customer).await.unwrap().is_none());
        assert!(tx.mark_cancelled(line.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fail_point_fires_once() {
        let store = MemoryLedgerStore::new();
        store.fail_on(FailPoint::Commit);

        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_err());

        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }
}
