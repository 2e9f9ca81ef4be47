//! Storage interfaces the ledger depends on.
//!
//! These are policy-free: the ledger decides what to read, lock and write,
//! a store only provides the primitives inside one atomic transaction.
//!
//! # Locking
//!
//! Every mutating operation starts with [`LedgerTx::lock_customer`], which
//! serializes all writers of one customer whether or not any of its rows
//! exist yet. Row locks follow in one fixed order: the debt row, then ledger
//! line rows in `lock_active_lines` order (`expires_at`, `created_at`, `id`).
//! Implementations must take
//! the locks the method names say they take (`lock_*`, `mark_cancelled`) and
//! hold them until commit or rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::idempotency::EventHash;
use crate::types::{BalanceSnapshot, DebtBalance, LedgerLine, NewLedgerLine, Points};

/// Result of writing an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// A record with the same hash already exists (or is being committed
    /// concurrently). The transaction itself is still usable.
    Conflict,
}

/// Entry point to a ledger store.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a transaction. Dropping it without commit rolls it back.
    async fn begin(&self) -> anyhow::Result<Box<dyn LedgerTx>>;

    /// Committed totals for `customer_id`, without taking locks.
    ///
    /// Lines count when not cancelled and `expires_at >= as_of`.
    async fn balance_snapshot(
        &self,
        customer_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> anyhow::Result<BalanceSnapshot>;
}

/// Operations inside one atomic transaction.
#[async_trait]
pub trait LedgerTx: Send {
    async fn insert_event_record_or_conflict(
        &mut self,
        hash: &EventHash,
    ) -> anyhow::Result<RecordOutcome>;

    /// Take the customer's transaction-scoped writer lock, waiting for any
    /// other transaction holding it. Released on commit or rollback.
    async fn lock_customer(&mut self, customer_id: Uuid) -> anyhow::Result<()>;

    /// Read and write-lock the customer's debt row, if any.
    async fn lock_debt(&mut self, customer_id: Uuid) -> anyhow::Result<Option<DebtBalance>>;

    /// Set the debt to exactly `points`, creating the row if needed.
    async fn upsert_debt(&mut self, customer_id: Uuid, points: Points) -> anyhow::Result<()>;

    /// Add `points` to the debt, creating the row if needed. Returns the new total.
    async fn increment_debt(&mut self, customer_id: Uuid, points: Points)
        -> anyhow::Result<Points>;

    /// Returns whether a row was removed.
    async fn delete_debt(&mut self, customer_id: Uuid) -> anyhow::Result<bool>;

    async fn insert_line(&mut self, line: NewLedgerLine) -> anyhow::Result<LedgerLine>;

    /// Read and write-lock the customer's active lines, ordered by
    /// `expires_at` ascending, then `created_at`, then `id`.
    async fn lock_active_lines(
        &mut self,
        customer_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> anyhow::Result<Vec<LedgerLine>>;

    /// Unlocked read of the line created for `order_id`.
    async fn find_line_by_order_id(&mut self, order_id: Uuid)
        -> anyhow::Result<Option<LedgerLine>>;

    /// Flip `is_cancelled` under a row lock and return the fresh row.
    ///
    /// Returns `None` when the line is missing or already cancelled.
    async fn mark_cancelled(&mut self, line_id: Uuid) -> anyhow::Result<Option<LedgerLine>>;

    /// Persist `available_points` for every line in the batch.
    async fn update_available_points(&mut self, lines: &[LedgerLine]) -> anyhow::Result<()>;

    /// Returns the number of lines removed.
    async fn delete_all_lines_for_customer(&mut self, customer_id: Uuid) -> anyhow::Result<u64>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;

    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}
