//! One handler per event kind, each running inside the caller's transaction.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::accrual;
use crate::consumption::consume;
use crate::debt::offset_accrual;
use crate::error::LedgerError;
use crate::event::{EventBody, LedgerEvent, OrderPlacedPayload};
use crate::store::LedgerTx;
use crate::types::NewLedgerLine;

/// Route an event body to its handler. The idempotency record is already written.
pub(crate) async fn handle(tx: &mut dyn LedgerTx, event: &LedgerEvent) -> Result<(), LedgerError> {
    match &event.body {
        // Acknowledged before a transaction is opened.
        EventBody::CustomerCreated(_) => Ok(()),
        EventBody::CustomerDeleted(payload) => customer_deleted(tx, payload.customer_id).await,
        EventBody::OrderPlaced(payload) => order_placed(tx, event.event_time, payload).await,
        EventBody::OrderCanceled(payload) | EventBody::OrderReturned(payload) => {
            order_canceled(tx, event.event_time, payload.order_id).await
        }
    }
}

async fn order_placed(
    tx: &mut dyn LedgerTx,
    event_time: DateTime<Utc>,
    payload: &OrderPlacedPayload,
) -> Result<(), LedgerError> {
    let gained_points = accrual::points_for_order_amount(payload.total_order_amount)?;
    let expires_at = accrual::expiry_for(event_time)?;

    tx.lock_customer(payload.customer_id).await?;
    let debt = tx.lock_debt(payload.customer_id).await?;
    let current_debt = debt.map_or(0, |debt| debt.points);
    if current_debt < 0 {
        return Err(LedgerError::invariant(format!(
            "customer {} has negative debt {current_debt}",
            payload.customer_id
        )));
    }

    let offset = offset_accrual(current_debt, gained_points);
    if debt.is_some() {
        if offset.new_debt == 0 {
            tx.delete_debt(payload.customer_id).await?;
        } else if offset.new_debt != current_debt {
            tx.upsert_debt(payload.customer_id, offset.new_debt).await?;
        }
    }

    let line = tx
        .insert_line(NewLedgerLine {
            customer_id: payload.customer_id,
            order_id: payload.order_id,
            points_from_order: gained_points,
            available_points: offset.available_points,
            expires_at,
        })
        .await?;

    info!(
        customer_id = %payload.customer_id,
        order_id = %payload.order_id,
        line_id = %line.id,
        gained_points,
        available_points = offset.available_points,
        debt_before = current_debt,
        debt_after = offset.new_debt,
        "points accrued"
    );
    Ok(())
}

/// Shared by `OrderCanceled` and `OrderReturned`.
async fn order_canceled(
    tx: &mut dyn LedgerTx,
    event_time: DateTime<Utc>,
    order_id: Uuid,
) -> Result<(), LedgerError> {
    let Some(peeked) = tx.find_line_by_order_id(order_id).await? else {
        debug!(%order_id, "cancel for unknown order ignored");
        return Ok(());
    };
    let customer_id = peeked.customer_id;

    // Customer, debt row, active lines in expiry order, then the cancelled line.
    tx.lock_customer(customer_id).await?;
    tx.lock_debt(customer_id).await?;
    let mut siblings = tx.lock_active_lines(customer_id, event_time).await?;

    let Some(cancelled) = tx.mark_cancelled(peeked.id).await? else {
        debug!(%order_id, "order already cancelled");
        return Ok(());
    };
    siblings.retain(|line| line.id != cancelled.id);

    let consumed_by_customer = cancelled.consumed_points();
    if consumed_by_customer <= 0 {
        info!(%customer_id, %order_id, "order cancelled, nothing to reclaim");
        return Ok(());
    }

    let remainder = consume(&mut siblings, consumed_by_customer);
    tx.update_available_points(&siblings).await?;

    let debt_after = if remainder > 0 {
        Some(tx.increment_debt(customer_id, remainder).await?)
    } else {
        None
    };

    info!(
        %customer_id,
        %order_id,
        reclaimed = consumed_by_customer - remainder,
        new_debt = remainder,
        debt_after = ?debt_after,
        "order cancelled, spent points reclaimed"
    );
    Ok(())
}

async fn customer_deleted(tx: &mut dyn LedgerTx, customer_id: Uuid) -> Result<(), LedgerError> {
    tx.lock_customer(customer_id).await?;
    tx.lock_debt(customer_id).await?;
    let lines_removed = tx.delete_all_lines_for_customer(customer_id).await?;
    // Last, so a debt row created by a writer that finished first is seen.
    let debt_removed = tx.delete_debt(customer_id).await?;

    info!(%customer_id, lines_removed, debt_removed, "customer ledger deleted");
    Ok(())
}
