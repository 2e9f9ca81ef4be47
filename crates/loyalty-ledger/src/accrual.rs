//! How many points an order is worth and how long they last.

use chrono::{DateTime, Months, Utc};

use crate::error::LedgerError;
use crate::types::Points;

/// One point per this many units of order amount, rounded down.
pub const POINTS_PER_AMOUNT: i64 = 50;

/// Points expire this many calendar months after the order event.
pub const EXPIRY_MONTHS: u32 = 6;

pub fn points_for_order_amount(total_order_amount: i64) -> Result<Points, LedgerError> {
    if total_order_amount < 0 {
        return Err(LedgerError::invariant(format!(
            "order amount cannot be negative, got {total_order_amount}"
        )));
    }
    Ok(total_order_amount / POINTS_PER_AMOUNT)
}

/// Month arithmetic clamps to the end of shorter months (Aug 31 -> Feb 28/29).
pub fn expiry_for(event_time: DateTime<Utc>) -> Result<DateTime<Utc>, LedgerError> {
    event_time
        .checked_add_months(Months::new(EXPIRY_MONTHS))
        .ok_or_else(|| LedgerError::invariant(format!("expiry out of range for {event_time}")))
}
