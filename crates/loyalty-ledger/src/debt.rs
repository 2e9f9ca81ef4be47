//! Offsetting accrued points against outstanding debt.

use crate::types::Points;

/// Result of applying newly gained points to an existing debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebtOffset {
    pub new_debt: Points,
    /// Points left spendable on the new line.
    pub available_points: Points,
}

/// Pay debt down with `gained_points` first; whatever is left is spendable.
///
/// Only accrual consults this. Reclamation on cancel creates debt on its own.
pub fn offset_accrual(current_debt: Points, gained_points: Points) -> DebtOffset {
    debug_assert!(current_debt >= 0 && gained_points >= 0);

    if current_debt >= gained_points {
        DebtOffset {
            new_debt: current_debt - gained_points,
            available_points: 0,
        }
    } else {
        DebtOffset {
            new_debt: 0,
            available_points: gained_points - current_debt,
        }
    }
}
