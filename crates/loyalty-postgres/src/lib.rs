//! PostgreSQL implementation of the loyalty ledger store.
//!
//! This crate provides a PostgreSQL implementation of the `LedgerStore` and
//! `LedgerTx` traits from the loyalty ledger.
//!
//! # Features
//!
//! - One writer per customer via `pg_advisory_xact_lock`, then pessimistic
//!   row locks with `SELECT ... FOR UPDATE`
//! - Idempotency records written with `ON CONFLICT DO NOTHING`, so a duplicate
//!   never poisons the surrounding transaction
//! - Atomic debt increments with `INSERT ... ON CONFLICT DO UPDATE`
//! - Batch line updates in one statement via `UNNEST`
//! - Balance reads computed in a single statement (one snapshot, no locks)
//!
//! # Database Schema
//!
//! Provisioning is left to the deployment; the store expects:
//!
//! ```sql
//! CREATE TABLE processed_events (
//!     id UUID PRIMARY KEY,
//!     event_hash TEXT NOT NULL,
//!     CONSTRAINT processed_events_event_hash_unique UNIQUE (event_hash)
//! );
//!
//! CREATE TABLE loyalty_debts (
//!     customer_id UUID PRIMARY KEY,
//!     points BIGINT NOT NULL CHECK (points >= 0)
//! );
//!
//! CREATE TABLE loyalty_lines (
//!     id UUID PRIMARY KEY,
//!     customer_id UUID NOT NULL,
//!     order_id UUID NOT NULL,
//!     points_from_order BIGINT NOT NULL CHECK (points_from_order >= 0),
//!     available_points BIGINT NOT NULL,
//!     expires_at TIMESTAMPTZ NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     is_cancelled BOOLEAN NOT NULL DEFAULT FALSE,
//!     CONSTRAINT loyalty_lines_order_id_unique UNIQUE (order_id),
//!     CHECK (available_points >= 0 AND available_points <= points_from_order)
//! );
//!
//! CREATE INDEX idx_loyalty_lines_active ON loyalty_lines (customer_id, expires_at)
//!     WHERE is_cancelled = FALSE;
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use loyalty_ledger::Ledger;
//! use loyalty_postgres::{PgLedgerStore, PgStoreConfig};
//! use std::sync::Arc;
//!
//! let pool = PgStoreConfig::from_env()?.connect().await?;
//! let ledger = Ledger::new(Arc::new(PgLedgerStore::new(pool)));
//! ```

mod config;

pub use config::PgStoreConfig;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_ledger::{
    BalanceSnapshot, DebtBalance, EventHash, LedgerLine, LedgerStore, LedgerTx, NewLedgerLine,
    Points, RecordOutcome,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

const LINE_COLUMNS: &str = "id, customer_id, order_id, points_from_order, available_points, \
                            expires_at, created_at, is_cancelled";

/// PostgreSQL ledger store.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    /// Both sums come from one statement, so they are read from the same
    /// snapshot even though no lock is taken.
    async fn balance_snapshot(
        &self,
        customer_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<BalanceSnapshot> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE((
                    SELECT SUM(available_points)
                    FROM loyalty_lines
                    WHERE customer_id = $1
                      AND is_cancelled = FALSE
                      AND expires_at >= $2
                ), 0)::BIGINT AS available,
                COALESCE((
                    SELECT points
                    FROM loyalty_debts
                    WHERE customer_id = $1
                ), 0)::BIGINT AS debt
            "#,
        )
        .bind(customer_id)
        .bind(as_of)
        .fetch_one(&self.pool)
        .await?;

        Ok(BalanceSnapshot {
            available: row.try_get("available")?,
            debt: row.try_get("debt")?,
        })
    }
}

/// One open PostgreSQL transaction. Dropped without commit, sqlx rolls it back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn insert_event_record_or_conflict(&mut self, hash: &EventHash) -> Result<RecordOutcome> {
        // Blocks on a concurrent uncommitted insert of the same hash until
        // that transaction finishes.
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (id, event_hash)
            VALUES ($1, $2)
            ON CONFLICT (event_hash) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(hash.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 1 {
            Ok(RecordOutcome::Inserted)
        } else {
            debug!(event_hash = %hash, "event hash already recorded");
            Ok(RecordOutcome::Conflict)
        }
    }

    /// Row locks cannot cover rows that do not exist yet (a first debt row,
    /// a first line), so writers of one customer meet on an advisory lock.
    async fn lock_customer(&mut self, customer_id: Uuid) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(customer_lock_key(customer_id))
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn lock_debt(&mut self, customer_id: Uuid) -> Result<Option<DebtBalance>> {
        let row = sqlx::query(
            "SELECT customer_id, points FROM loyalty_debts WHERE customer_id = $1 FOR UPDATE",
        )
        .bind(customer_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| -> Result<DebtBalance> {
            Ok(DebtBalance {
                customer_id: row.try_get("customer_id")?,
                points: row.try_get("points")?,
            })
        })
        .transpose()
    }

    async fn upsert_debt(&mut self, customer_id: Uuid, points: Points) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_debts (customer_id, points)
            VALUES ($1, $2)
            ON CONFLICT (customer_id) DO UPDATE
            SET points = EXCLUDED.points
            "#,
        )
        .bind(customer_id)
        .bind(points)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn increment_debt(&mut self, customer_id: Uuid, points: Points) -> Result<Points> {
        let total: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO loyalty_debts (customer_id, points)
            VALUES ($1, $2)
            ON CONFLICT (customer_id) DO UPDATE
            SET points = loyalty_debts.points + EXCLUDED.points
            RETURNING points
            "#,
        )
        .bind(customer_id)
        .bind(points)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(total)
    }

    async fn delete_debt(&mut self, customer_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM loyalty_debts WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_line(&mut self, line: NewLedgerLine) -> Result<LedgerLine> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO loyalty_lines
                (id, customer_id, order_id, points_from_order, available_points, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {LINE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(line.customer_id)
        .bind(line.order_id)
        .bind(line.points_from_order)
        .bind(line.available_points)
        .bind(line.expires_at)
        .fetch_one(&mut *self.tx)
        .await?;

        line_from_row(&row)
    }

    async fn lock_active_lines(
        &mut self,
        customer_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<LedgerLine>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LINE_COLUMNS}
            FROM loyalty_lines
            WHERE customer_id = $1
              AND is_cancelled = FALSE
              AND expires_at >= $2
            ORDER BY expires_at ASC, created_at ASC, id ASC
            FOR UPDATE
            "#
        ))
        .bind(customer_id)
        .bind(as_of)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(line_from_row).collect()
    }

    async fn find_line_by_order_id(&mut self, order_id: Uuid) -> Result<Option<LedgerLine>> {
        let row = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM loyalty_lines WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(line_from_row).transpose()
    }

    async fn mark_cancelled(&mut self, line_id: Uuid) -> Result<Option<LedgerLine>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE loyalty_lines
            SET is_cancelled = TRUE
            WHERE id = $1 AND is_cancelled = FALSE
            RETURNING {LINE_COLUMNS}
            "#
        ))
        .bind(line_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(line_from_row).transpose()
    }

    async fn update_available_points(&mut self, lines: &[LedgerLine]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = lines.iter().map(|line| line.id).collect();
        let points: Vec<i64> = lines.iter().map(|line| line.available_points).collect();

        let result = sqlx::query(
            r#"
            UPDATE loyalty_lines AS l
            SET available_points = u.available_points
            FROM UNNEST($1::uuid[], $2::bigint[]) AS u(id, available_points)
            WHERE l.id = u.id
            "#,
        )
        .bind(ids)
        .bind(points)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() != lines.len() as u64 {
            anyhow::bail!(
                "updated {} of {} ledger lines",
                result.rows_affected(),
                lines.len()
            );
        }
        Ok(())
    }

    async fn delete_all_lines_for_customer(&mut self, customer_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM loyalty_lines WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Advisory lock key for a customer. Collisions only cost extra waiting.
fn customer_lock_key(customer_id: Uuid) -> i64 {
    let (high, low) = customer_id.as_u64_pair();
    (high ^ low) as i64
}

fn line_from_row(row: &PgRow) -> Result<LedgerLine> {
    Ok(LedgerLine {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        order_id: row.try_get("order_id")?,
        points_from_order: row.try_get("points_from_order")?,
        available_points: row.try_get("available_points")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        is_cancelled: row.try_get("is_cancelled")?,
    })
}
