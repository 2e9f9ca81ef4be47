//! Ledger state: lines, debt balances and balance snapshots.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Loyalty points. Signed so that a balance net of debt can go negative.
pub type Points = i64;

/// One accrual record tied to a single order.
///
/// `available_points` only ever moves down from `points_from_order` and
/// `is_cancelled` only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerLine {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_id: Uuid,
    pub points_from_order: Points,
    pub available_points: Points,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_cancelled: bool,
}

impl LedgerLine {
    /// Points already spent (or offset against debt) from this line.
    pub fn consumed_points(&self) -> Points {
        self.points_from_order - self.available_points
    }

    /// A line is active when it is not cancelled and has not expired as of `as_of`.
    pub fn is_active_at(&self, as_of: DateTime<Utc>) -> bool {
        !self.is_cancelled && self.expires_at >= as_of
    }
}

/// A line about to be inserted. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerLine {
    pub customer_id: Uuid,
    pub order_id: Uuid,
    pub points_from_order: Points,
    pub available_points: Points,
    pub expires_at: DateTime<Utc>,
}

impl NewLedgerLine {
    pub fn into_line(self, id: Uuid, created_at: DateTime<Utc>) -> LedgerLine {
        LedgerLine {
            id,
            customer_id: self.customer_id,
            order_id: self.order_id,
            points_from_order: self.points_from_order,
            available_points: self.available_points,
            expires_at: self.expires_at,
            created_at,
            is_cancelled: false,
        }
    }
}

/// Outstanding deficit for a customer. At most one per customer, never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebtBalance {
    pub customer_id: Uuid,
    pub points: Points,
}

/// Committed totals read for the balance query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    /// Sum of `available_points` over active lines.
    pub available: Points,
    /// Debt points, 0 when the customer has no debt row.
    pub debt: Points,
}

impl BalanceSnapshot {
    pub fn points(&self) -> Points {
        self.available - self.debt
    }
}

/// Sum of spendable points across `lines`.
pub fn total_available(lines: &[LedgerLine]) -> Points {
    lines.iter().map(|line| line.available_points).sum()
}
