//! Order lifecycle events as delivered by the webhook source.
//!
//! The wire shape is a PascalCase JSON object:
//!
//! ```json
//! {
//!   "EventTime": "2023-11-16T12:24:45+01:00",
//!   "EventName": "OrderPlaced",
//!   "EntityName": "Order",
//!   "Sequence": 10,
//!   "Payload": { "OrderId": "...", "CustomerId": "...", "TotalOrderAmount": 50 }
//! }
//! ```
//!
//! Decoding yields a [`LedgerEvent`] whose [`EventBody`] is an exhaustive enum,
//! so every event kind must be handled wherever the body is matched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WireError;

/// The five event kinds the ledger understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    CustomerCreated,
    CustomerDeleted,
    OrderPlaced,
    OrderCanceled,
    OrderReturned,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CustomerCreated => "CustomerCreated",
            EventKind::CustomerDeleted => "CustomerDeleted",
            EventKind::OrderPlaced => "OrderPlaced",
            EventKind::OrderCanceled => "OrderCanceled",
            EventKind::OrderReturned => "OrderReturned",
        }
    }

    pub fn entity(&self) -> EntityName {
        match self {
            EventKind::CustomerCreated | EventKind::CustomerDeleted => EntityName::Customer,
            EventKind::OrderPlaced | EventKind::OrderCanceled | EventKind::OrderReturned => {
                EntityName::Order
            }
        }
    }

    /// Whether applying this kind writes an idempotency record.
    ///
    /// `CustomerCreated` is acknowledged without touching the store at all.
    pub fn is_recorded(&self) -> bool {
        !matches!(self, EventKind::CustomerCreated)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityName {
    Customer,
    Order,
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityName::Customer => f.write_str("Customer"),
            EntityName::Order => f.write_str("Order"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerPayload {
    pub customer_id: Uuid,
}

/// `TotalOrderAmount` is signed on purpose: a negative amount is a domain
/// invariant violation raised by the ledger, not a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderPlacedPayload {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub total_order_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderPayload {
    pub order_id: Uuid,
}

/// Kind-specific payload, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBody {
    CustomerCreated(CustomerPayload),
    CustomerDeleted(CustomerPayload),
    OrderPlaced(OrderPlacedPayload),
    OrderCanceled(OrderPayload),
    OrderReturned(OrderPayload),
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::CustomerCreated(_) => EventKind::CustomerCreated,
            EventBody::CustomerDeleted(_) => EventKind::CustomerDeleted,
            EventBody::OrderPlaced(_) => EventKind::OrderPlaced,
            EventBody::OrderCanceled(_) => EventKind::OrderCanceled,
            EventBody::OrderReturned(_) => EventKind::OrderReturned,
        }
    }
}

/// A decoded webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct LedgerEvent {
    pub event_time: DateTime<Utc>,
    /// Positive, unique per event kind at the source.
    pub sequence: u64,
    pub body: EventBody,
}

impl LedgerEvent {
    pub fn new(event_time: DateTime<Utc>, sequence: u64, body: EventBody) -> Self {
        Self {
            event_time,
            sequence,
            body,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    /// Decode one event from its JSON wire form.
    pub fn from_json(input: &str) -> Result<Self, WireError> {
        let raw: RawEvent = serde_json::from_str(input)?;
        raw.try_into()
    }
}

/// The envelope before the payload is typed against `EventName`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEvent {
    event_time: DateTime<Utc>,
    event_name: EventKind,
    entity_name: EntityName,
    sequence: u64,
    payload: serde_json::Value,
}

impl TryFrom<RawEvent> for LedgerEvent {
    type Error = WireError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let kind = raw.event_name;
        if raw.sequence == 0 {
            return Err(WireError::ZeroSequence);
        }
        if raw.entity_name != kind.entity() {
            return Err(WireError::EntityMismatch {
                event: kind,
                expected: kind.entity(),
                actual: raw.entity_name,
            });
        }

        let body = match kind {
            EventKind::CustomerCreated => EventBody::CustomerCreated(payload(kind, raw.payload)?),
            EventKind::CustomerDeleted => EventBody::CustomerDeleted(payload(kind, raw.payload)?),
            EventKind::OrderPlaced => EventBody::OrderPlaced(payload(kind, raw.payload)?),
            EventKind::OrderCanceled => EventBody::OrderCanceled(payload(kind, raw.payload)?),
            EventKind::OrderReturned => EventBody::OrderReturned(payload(kind, raw.payload)?),
        };

        Ok(LedgerEvent::new(raw.event_time, raw.sequence, body))
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    event: EventKind,
    value: serde_json::Value,
) -> Result<T, WireError> {
    serde_json::from_value(value).map_err(|source| WireError::Payload { event, source })
}
