//! Builders for events and pre-existing ledger lines.

use chrono::{DateTime, Duration, Utc};
use loyalty_ledger::{
    CustomerPayload, EventBody, LedgerEvent, LedgerLine, OrderPayload, OrderPlacedPayload, Points,
};
use uuid::Uuid;

pub fn customer_created(sequence: u64, at: DateTime<Utc>, customer_id: Uuid) -> LedgerEvent {
    LedgerEvent::new(
        at,
        sequence,
        EventBody::CustomerCreated(CustomerPayload { customer_id }),
    )
}

pub fn customer_deleted(sequence: u64, at: DateTime<Utc>, customer_id: Uuid) -> LedgerEvent {
    LedgerEvent::new(
        at,
        sequence,
        EventBody::CustomerDeleted(CustomerPayload { customer_id }),
    )
}

pub fn order_placed(
    sequence: u64,
    at: DateTime<Utc>,
    customer_id: Uuid,
    order_id: Uuid,
    total_order_amount: i64,
) -> LedgerEvent {
    LedgerEvent::new(
        at,
        sequence,
        EventBody::OrderPlaced(OrderPlacedPayload {
            order_id,
            customer_id,
            total_order_amount,
        }),
    )
}

pub fn order_canceled(sequence: u64, at: DateTime<Utc>, order_id: Uuid) -> LedgerEvent {
    LedgerEvent::new(
        at,
        sequence,
        EventBody::OrderCanceled(OrderPayload { order_id }),
    )
}

pub fn order_returned(sequence: u64, at: DateTime<Utc>, order_id: Uuid) -> LedgerEvent {
    LedgerEvent::new(
        at,
        sequence,
        EventBody::OrderReturned(OrderPayload { order_id }),
    )
}

/// Builds a [`LedgerLine`] as if an earlier order had been accrued.
///
/// Defaults: 10 points, all available, expiring in 30 days, created now.
#[derive(Debug, Clone)]
pub struct LineBuilder {
    line: LedgerLine,
}

impl LineBuilder {
    pub fn new(customer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            line: LedgerLine {
                id: Uuid::new_v4(),
                customer_id,
                order_id: Uuid::new_v4(),
                points_from_order: 10,
                available_points: 10,
                expires_at: now + Duration::days(30),
                created_at: now,
                is_cancelled: false,
            },
        }
    }

    /// Sets both granted and available points.
    pub fn points(mut self, points: Points) -> Self {
        self.line.points_from_order = points;
        self.line.available_points = points;
        self
    }

    pub fn available(mut self, points: Points) -> Self {
        self.line.available_points = points;
        self
    }

    pub fn order_id(mut self, order_id: Uuid) -> Self {
        self.line.order_id = order_id;
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.line.expires_at = expires_at;
        self
    }

    pub fn expires_in(mut self, duration: Duration) -> Self {
        self.line.expires_at = Utc::now() + duration;
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.line.is_cancelled = true;
        self
    }

    pub fn build(self) -> LedgerLine {
        self.line
    }
}
