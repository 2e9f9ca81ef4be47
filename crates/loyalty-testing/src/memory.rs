//! In-memory [`LedgerStore`] with real transaction semantics.
//!
//! A transaction holds the single writer lock for its whole life and works on
//! a private copy of the committed state. Commit swaps the copy in, rollback
//! or drop discards it. Holding the writer lock is a coarser version of the
//! row locks a database takes: concurrent writers serialize, and the loser
//! re-reads fresh state once it gets the lock. Balance snapshots read the
//! committed state without the writer lock.
//!
//! Because the writer lock already serializes everything, a transaction also
//! tracks which customers it has called `lock_customer` for and rejects any
//! row access for a customer it has not locked. A handler that forgets the
//! customer lock fails here instead of only racing on a real database.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_ledger::{
    BalanceSnapshot, DebtBalance, EventHash, EventKind, LedgerLine, LedgerStore, LedgerTx,
    NewLedgerLine, Points, RecordOutcome,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Store operation at which [`MemoryLedgerStore::fail_on`] injects an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertLine,
    IncrementDebt,
    UpdateAvailablePoints,
    DeleteLines,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct State {
    lines: Vec<LedgerLine>,
    debts: HashMap<Uuid, Points>,
    event_hashes: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    committed: Arc<Mutex<State>>,
    writer: Arc<AsyncMutex<()>>,
    fail_point: Arc<Mutex<Option<FailPoint>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `point` fail with a storage error. One-shot.
    pub fn fail_on(&self, point: FailPoint) {
        *self.fail_point.lock().unwrap_or_else(PoisonError::into_inner) = Some(point);
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn seed_line(&self, line: LedgerLine) {
        self.with_committed(|state| state.lines.push(line));
    }

    pub fn seed_debt(&self, customer_id: Uuid, points: Points) {
        self.with_committed(|state| {
            state.debts.insert(customer_id, points);
        });
    }

    /// Pretend `(kind, sequence)` was already processed.
    pub fn seed_event_record(&self, kind: EventKind, sequence: u64) {
        let hash = EventHash::compute(kind, sequence);
        self.with_committed(|state| {
            state.event_hashes.insert(hash.as_str().to_string());
        });
    }

    // ------------------------------------------------------------------
    // Inspection (committed state only)
    // ------------------------------------------------------------------

    /// All lines for the customer, cancelled and expired included, in insertion order.
    pub fn lines_for(&self, customer_id: Uuid) -> Vec<LedgerLine> {
        self.with_committed(|state| {
            state
                .lines
                .iter()
                .filter(|line| line.customer_id == customer_id)
                .cloned()
                .collect()
        })
    }

    pub fn line(&self, line_id: Uuid) -> Option<LedgerLine> {
        self.with_committed(|state| state.lines.iter().find(|l| l.id == line_id).cloned())
    }

    pub fn line_for_order(&self, order_id: Uuid) -> Option<LedgerLine> {
        self.with_committed(|state| {
            state
                .lines
                .iter()
                .find(|line| line.order_id == order_id)
                .cloned()
        })
    }

    pub fn debt_for(&self, customer_id: Uuid) -> Option<Points> {
        self.with_committed(|state| state.debts.get(&customer_id).copied())
    }

    pub fn event_record_count(&self) -> usize {
        self.with_committed(|state| state.event_hashes.len())
    }

    pub fn has_event_record(&self, kind: EventKind, sequence: u64) -> bool {
        let hash = EventHash::compute(kind, sequence);
        self.with_committed(|state| state.event_hashes.contains(hash.as_str()))
    }

    fn with_committed<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn LedgerTx>> {
        let writer = self.writer.clone().lock_owned().await;
        let working = self.with_committed(|state| state.clone());

        Ok(Box::new(MemoryTx {
            _writer: writer,
            committed: self.committed.clone(),
            fail_point: self.fail_point.clone(),
            working,
            locked: HashSet::new(),
        }))
    }

    async fn balance_snapshot(
        &self,
        customer_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> anyhow::Result<BalanceSnapshot> {
        Ok(self.with_committed(|state| BalanceSnapshot {
            available: state
                .lines
                .iter()
                .filter(|line| line.customer_id == customer_id && line.is_active_at(as_of))
                .map(|line| line.available_points)
                .sum(),
            debt: state.debts.get(&customer_id).copied().unwrap_or(0),
        }))
    }
}

struct MemoryTx {
    _writer: OwnedMutexGuard<()>,
    committed: Arc<Mutex<State>>,
    fail_point: Arc<Mutex<Option<FailPoint>>>,
    working: State,
    locked: HashSet<Uuid>,
}

impl MemoryTx {
    fn check(&self, point: FailPoint) -> anyhow::Result<()> {
        let mut armed = self.fail_point.lock().unwrap_or_else(PoisonError::into_inner);
        if *armed == Some(point) {
            *armed = None;
            bail!("injected storage failure at {point:?}");
        }
        Ok(())
    }

    fn ensure_locked(&self, customer_id: Uuid) -> anyhow::Result<()> {
        if !self.locked.contains(&customer_id) {
            bail!("customer {customer_id} accessed without lock_customer");
        }
        Ok(())
    }

    fn ensure_line_locked(&self, line_id: Uuid) -> anyhow::Result<()> {
        match self.working.lines.iter().find(|line| line.id == line_id) {
            Some(line) => self.ensure_locked(line.customer_id),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn insert_event_record_or_conflict(
        &mut self,
        hash: &EventHash,
    ) -> anyhow::Result<RecordOutcome> {
        if self.working.event_hashes.insert(hash.as_str().to_string()) {
            Ok(RecordOutcome::Inserted)
        } else {
            Ok(RecordOutcome::Conflict)
        }
    }

    async fn lock_customer(&mut self, customer_id: Uuid) -> anyhow::Result<()> {
        self.locked.insert(customer_id);
        Ok(())
    }

    async fn lock_debt(&mut self, customer_id: Uuid) -> anyhow::Result<Option<DebtBalance>> {
        self.ensure_locked(customer_id)?;
        Ok(self
            .working
            .debts
            .get(&customer_id)
            .map(|&points| DebtBalance {
                customer_id,
                points,
            }))
    }

    async fn upsert_debt(&mut self, customer_id: Uuid, points: Points) -> anyhow::Result<()> {
        self.ensure_locked(customer_id)?;
        if points < 0 {
            bail!("debt for {customer_id} would go negative: {points}");
        }
        self.working.debts.insert(customer_id, points);
        Ok(())
    }

    async fn increment_debt(
        &mut self,
        customer_id: Uuid,
        points: Points,
    ) -> anyhow::Result<Points> {
        self.ensure_locked(customer_id)?;
        self.check(FailPoint::IncrementDebt)?;
        let debt = self.working.debts.entry(customer_id).or_insert(0);
        *debt += points;
        Ok(*debt)
    }

    async fn delete_debt(&mut self, customer_id: Uuid) -> anyhow::Result<bool> {
        self.ensure_locked(customer_id)?;
        Ok(self.working.debts.remove(&customer_id).is_some())
    }

    async fn insert_line(&mut self, line: NewLedgerLine) -> anyhow::Result<LedgerLine> {
        self.ensure_locked(line.customer_id)?;
        self.check(FailPoint::InsertLine)?;
        if self.working.lines.iter().any(|l| l.order_id == line.order_id) {
            bail!("duplicate ledger line for order {}", line.order_id);
        }
        if line.available_points < 0 || line.available_points > line.points_from_order {
            bail!(
                "available points {} out of range for {} granted",
                line.available_points,
                line.points_from_order
            );
        }

        let line = line.into_line(Uuid::new_v4(), Utc::now());
        self.working.lines.push(line.clone());
        Ok(line)
    }

    async fn lock_active_lines(
        &mut self,
        customer_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> anyhow::Result<Vec<LedgerLine>> {
        self.ensure_locked(customer_id)?;
        let mut lines: Vec<LedgerLine> = self
            .working
            .lines
            .iter()
            .filter(|line| line.customer_id == customer_id && line.is_active_at(as_of))
            .cloned()
            .collect();
        lines.sort_by(|a, b| {
            a.expires_at
                .cmp(&b.expires_at)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(lines)
    }

    async fn find_line_by_order_id(
        &mut self,
        order_id: Uuid,
    ) -> anyhow::Result<Option<LedgerLine>> {
        Ok(self
            .working
            .lines
            .iter()
            .find(|line| line.order_id == order_id)
            .cloned())
    }

    async fn mark_cancelled(&mut self, line_id: Uuid) -> anyhow::Result<Option<LedgerLine>> {
        self.ensure_line_locked(line_id)?;
        Ok(self
            .working
            .lines
            .iter_mut()
            .find(|line| line.id == line_id && !line.is_cancelled)
            .map(|line| {
                line.is_cancelled = true;
                line.clone()
            }))
    }

    async fn update_available_points(&mut self, lines: &[LedgerLine]) -> anyhow::Result<()> {
        self.check(FailPoint::UpdateAvailablePoints)?;
        for updated in lines {
            self.ensure_line_locked(updated.id)?;
            let Some(stored) = self.working.lines.iter_mut().find(|l| l.id == updated.id) else {
                bail!("ledger line {} not found", updated.id);
            };
            if updated.available_points < 0 || updated.available_points > stored.points_from_order
            {
                bail!(
                    "available points {} out of range for line {}",
                    updated.available_points,
                    updated.id
                );
            }
            stored.available_points = updated.available_points;
        }
        Ok(())
    }

    async fn delete_all_lines_for_customer(&mut self, customer_id: Uuid) -> anyhow::Result<u64> {
        self.ensure_locked(customer_id)?;
        self.check(FailPoint::DeleteLines)?;
        let before = self.working.lines.len();
        self.working.lines.retain(|line| line.customer_id != customer_id);
        Ok((before - self.working.lines.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.check(FailPoint::Commit)?;
        let MemoryTx {
            _writer,
            committed,
            working,
            ..
        } = *self;
        *committed.lock().unwrap_or_else(PoisonError::into_inner) = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}
