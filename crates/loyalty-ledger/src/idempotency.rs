//! Exactly-once application of at-least-once delivered events.
//!
//! Every recorded event writes a [`EventHash`] as the first statement of its
//! transaction. The hash covers the event kind and sequence only, so a
//! redelivery with a different payload or timestamp is still the same event.
//! When the record already exists the dispatcher rolls back everything the
//! transaction would have written and reports [`ApplyOutcome::Duplicate`].

use std::fmt;

use sha2::{Digest, Sha256};

use crate::event::EventKind;
use crate::store::{LedgerTx, RecordOutcome};

/// Deterministic dedupe key: lowercase hex SHA-256 of `"{EventName}-{Sequence}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventHash(String);

impl EventHash {
    pub fn compute(kind: EventKind, sequence: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}-{}", kind.as_str(), sequence));
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Both outcomes are success from the event source's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Duplicate,
}

/// Record `(kind, sequence)` inside `tx`.
///
/// Must be the first write of the transaction.
pub async fn mark_processed(
    tx: &mut dyn LedgerTx,
    kind: EventKind,
    sequence: u64,
) -> anyhow::Result<ApplyOutcome> {
    let hash = EventHash::compute(kind, sequence);
    match tx.insert_event_record_or_conflict(&hash).await? {
        RecordOutcome::Inserted => Ok(ApplyOutcome::Applied),
        RecordOutcome::Conflict => Ok(ApplyOutcome::Duplicate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_of_name_and_sequence() {
        // echo -n "OrderPlaced-10" | sha256sum
        let expected = hex::encode(Sha256::digest(b"OrderPlaced-10"));
        assert_eq!(EventHash::compute(EventKind::OrderPlaced, 10).as_str(), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn hash_is_stable_across_calls() {
        assert_eq!(
            EventHash::compute(EventKind::OrderCanceled, 7),
            EventHash::compute(EventKind::OrderCanceled, 7)
        );
    }

    #[test]
    fn kind_and_sequence_both_distinguish() {
        let base = EventHash::compute(EventKind::OrderCanceled, 3);
        assert_ne!(base, EventHash::compute(EventKind::OrderReturned, 3));
        assert_ne!(base, EventHash::compute(EventKind::OrderCanceled, 4));
    }
}
