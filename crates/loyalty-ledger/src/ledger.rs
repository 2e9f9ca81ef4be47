//! The [`Ledger`] handle: event application, manual spend and balance query.

use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::consumption::consume;
use crate::error::{LedgerError, SpendError};
use crate::event::LedgerEvent;
use crate::handlers;
use crate::idempotency::{mark_processed, ApplyOutcome};
use crate::store::{LedgerStore, LedgerTx};
use crate::types::{total_available, Points};

/// Handle to the ledger. Build once at startup and share by reference or clone.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Apply one event exactly once.
    ///
    /// The idempotency record and every domain write share one transaction.
    /// A duplicate rolls back and returns [`ApplyOutcome::Duplicate`]; an
    /// error rolls back and leaves committed state untouched, so redelivery
    /// is always safe.
    #[instrument(skip_all, fields(event = %event.kind(), sequence = event.sequence))]
    pub async fn apply(&self, event: &LedgerEvent) -> Result<ApplyOutcome, LedgerError> {
        let kind = event.kind();
        if !kind.is_recorded() {
            debug!("acknowledged without ledger effect");
            return Ok(ApplyOutcome::Applied);
        }

        let mut tx = self.store.begin().await?;

        if mark_processed(&mut *tx, kind, event.sequence).await? == ApplyOutcome::Duplicate {
            tx.rollback().await?;
            info!("duplicate event skipped");
            return Ok(ApplyOutcome::Duplicate);
        }

        let result = handlers::handle(&mut *tx, event).await;
        settle(tx, result).await?;

        info!("event applied");
        Ok(ApplyOutcome::Applied)
    }

    /// Spend `points` for `customer_id` against lines active right now.
    pub async fn spend(&self, customer_id: Uuid, points: Points) -> Result<Points, SpendError> {
        self.spend_at(customer_id, points, Utc::now()).await
    }

    /// Spend `points`, earliest-expiring first, and return the remaining
    /// spendable points. Nothing is written unless the full amount is covered.
    #[instrument(skip(self))]
    pub async fn spend_at(
        &self,
        customer_id: Uuid,
        points: Points,
        as_of: DateTime<Utc>,
    ) -> Result<Points, SpendError> {
        if points <= 0 {
            return Err(SpendError::InvalidAmount(points));
        }

        let mut tx = self.store.begin().await?;
        let result = spend_locked(&mut *tx, customer_id, points, as_of).await;
        let remaining = settle(tx, result).await?;

        info!(%customer_id, points, remaining, "points spent");
        Ok(remaining)
    }

    /// Spendable points minus debt as of now. May be negative.
    pub async fn balance(&self, customer_id: Uuid) -> Result<Points, LedgerError> {
        self.balance_at(customer_id, Utc::now()).await
    }

    /// Lock-free read of committed state.
    ///
    /// Never blocks on, and never observes, in-flight transactions; a spend or
    /// event committing concurrently may or may not be reflected.
    pub async fn balance_at(
        &self,
        customer_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Points, LedgerError> {
        let snapshot = self.store.balance_snapshot(customer_id, as_of).await?;
        Ok(snapshot.points())
    }
}

async fn spend_locked(
    tx: &mut dyn LedgerTx,
    customer_id: Uuid,
    points: Points,
    as_of: DateTime<Utc>,
) -> Result<Points, SpendError> {
    tx.lock_customer(customer_id).await?;
    let mut lines = tx.lock_active_lines(customer_id, as_of).await?;
    if lines.is_empty() {
        return Err(SpendError::CustomerNotFound(customer_id));
    }

    let available = total_available(&lines);
    if available < points {
        return Err(SpendError::InsufficientBalance {
            requested: points,
            available,
        });
    }

    let remainder = consume(&mut lines, points);
    if remainder != 0 {
        return Err(LedgerError::invariant(format!(
            "{remainder} points left unconsumed after balance check"
        ))
        .into());
    }

    tx.update_available_points(&lines).await?;
    Ok(available - points)
}

/// Commit on success, roll back on failure.
///
/// A failed rollback is logged and the original error returned.
async fn settle<T, E>(tx: Box<dyn LedgerTx>, result: Result<T, E>) -> Result<T, E>
where
    E: From<anyhow::Error> + Display,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %err, rollback_error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
