//! # Loyalty Ledger
//!
//! A customer loyalty-points ledger driven by order lifecycle events, with
//! expiry, earliest-expiry-first consumption, and debt when spending outpaces
//! what can be reclaimed.
//!
//! ## Core Concepts
//!
//! - [`LedgerLine`] = points granted by one order, and how many are still spendable
//! - [`DebtBalance`] = points a customer owes after a cancelled order could not be reclaimed
//! - [`LedgerEvent`] = an order/customer fact delivered at least once by the event source
//!
//! The key principle: **One Event = One Transaction**.
//! The idempotency record and every ledger write for an event commit together
//! or not at all.
//!
//! ## Architecture
//!
//! ```text
//! Webhook (HTTP layer, not in this crate)
//!     │
//!     ▼ LedgerEvent::from_json()
//! Ledger::apply()
//!     │
//!     ├─► CustomerCreated ─► acknowledged, nothing written
//!     │
//!     └─► store.begin() ─────────────────────────────┐
//!             │                                      │
//!             ▼                                      │
//!       mark_processed() ─► Conflict ─► rollback ─► Duplicate
//!             │
//!             ▼ Inserted
//!       handlers::handle()
//!             │
//!             │   (every branch locks the customer first)
//!             ├─► OrderPlaced    ─► lock debt ─► offset_accrual() ─► insert line
//!             ├─► OrderCanceled  ─┐
//!             ├─► OrderReturned  ─┴► lock debt ─► lock lines ─► mark cancelled ─► consume() ─► debt
//!             └─► CustomerDeleted ─► lock debt ─► delete lines ─► delete debt
//!             │
//!             ▼
//!       commit (Ok) / rollback (Err)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Exactly-once effect** - `(event kind, sequence)` is applied at most once
//! 2. **Conservation** - points consumed from lines plus debt only grow by what was spent or reclaimed
//! 3. **Earliest expiry first** - consumption drains lines in `expires_at` order
//! 4. **No negative debt** - debt is created from reclamation shortfalls and paid down by accrual
//! 5. **One writer per customer** - every mutation takes the customer lock first, then debt row before line rows
//! 6. **All or nothing** - any error rolls back the whole operation
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use loyalty_ledger::{ApplyOutcome, Ledger, LedgerEvent};
//! use loyalty_postgres::PgLedgerStore;
//!
//! let ledger = Ledger::new(Arc::new(PgLedgerStore::new(pool)));
//!
//! let event = LedgerEvent::from_json(body)?;
//! match ledger.apply(&event).await? {
//!     ApplyOutcome::Applied | ApplyOutcome::Duplicate => { /* 200 */ }
//! }
//!
//! let remaining = ledger.spend(customer_id, 15).await?;
//! let balance = ledger.balance(customer_id).await?;
//! ```

// Core modules
mod consumption;
mod debt;
mod error;
mod event;
mod handlers;
mod idempotency;
mod ledger;
mod store;
mod types;

pub mod accrual;

// Wire decoding tests (test-only)
#[cfg(test)]
mod serde_wire_tests;

// Re-export the pure algorithms
pub use consumption::consume;
pub use debt::{offset_accrual, DebtOffset};

// Re-export error types
pub use error::{LedgerError, SpendError, WireError};

// Re-export event types
pub use event::{
    CustomerPayload, EntityName, EventBody, EventKind, LedgerEvent, OrderPayload,
    OrderPlacedPayload,
};

// Re-export idempotency types
pub use idempotency::{mark_processed, ApplyOutcome, EventHash};

// Re-export the ledger handle (primary entry point)
pub use ledger::Ledger;

// Re-export storage interfaces
pub use store::{LedgerStore, LedgerTx, RecordOutcome};

// Re-export ledger state types
pub use types::{total_available, BalanceSnapshot, DebtBalance, LedgerLine, NewLedgerLine, Points};

// Re-export commonly used external types
pub use async_trait::async_trait;
