//! Error types for event application, manual spend and wire decoding.
//!
//! Recoverable outcomes (a duplicate event, a cancel for an unknown order) are
//! not errors: they come back as values. Everything here aborts the operation's
//! transaction.

use thiserror::Error;
use uuid::Uuid;

use crate::event::{EntityName, EventKind};
use crate::types::Points;

/// Failure applying an event or reading the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Input or stored state that validated input can never produce.
    #[error("domain invariant violated: {0}")]
    DomainInvariant(String),

    /// Lock timeout, lost connection, constraint failure. Safe to retry.
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::DomainInvariant(message.into())
    }
}

/// Outcome of a customer-initiated spend that did not succeed.
#[derive(Debug, Error)]
pub enum SpendError {
    #[error("points to spend must be positive, got {0}")]
    InvalidAmount(Points),

    #[error("not enough points: requested {requested}, available {available}")]
    InsufficientBalance { requested: Points, available: Points },

    #[error("customer {0} has no active loyalty points")]
    CustomerNotFound(Uuid),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SpendError {
    /// The caller asked for something the ledger cannot give (4xx, not 404).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SpendError::InvalidAmount(_) | SpendError::InsufficientBalance { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SpendError::CustomerNotFound(_))
    }
}

impl From<anyhow::Error> for SpendError {
    fn from(err: anyhow::Error) -> Self {
        SpendError::Ledger(LedgerError::Storage(err))
    }
}

/// A webhook event that could not be decoded.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event sequence must be positive")]
    ZeroSequence,

    #[error("{event} belongs to entity {expected}, got {actual}")]
    EntityMismatch {
        event: EventKind,
        expected: EntityName,
        actual: EntityName,
    },

    #[error("invalid {event} payload: {source}")]
    Payload {
        event: EventKind,
        source: serde_json::Error,
    },
}
