//! Greedy FIFO-by-expiry deduction across ledger lines.

use tracing::debug;

use crate::types::{LedgerLine, Points};

/// Deduct `amount` from `lines` in order and return what could not be covered.
///
/// `lines` must already be sorted by `expires_at` ascending and must not
/// contain any line the caller wants left alone. Each line is drained fully
/// before the next one is touched; nothing is ever put back. A non-zero
/// return is a signal for the caller (debt, or a refused spend), not a failure.
pub fn consume(lines: &mut [LedgerLine], amount: Points) -> Points {
    debug_assert!(amount >= 0, "cannot consume a negative amount");

    let mut remaining = amount;
    for line in lines.iter_mut() {
        if remaining == 0 {
            break;
        }

        if line.available_points >= remaining {
            line.available_points -= remaining;
            remaining = 0;
        } else {
            remaining -= line.available_points;
            line.available_points = 0;
        }
    }

    debug!(requested = amount, remainder = remaining, "consumed points");
    remaining
}
