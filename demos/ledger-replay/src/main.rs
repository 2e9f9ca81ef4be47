//! # Ledger Replay Demo
//!
//! Feeds webhook events (one JSON object per line) through the ledger backed
//! by PostgreSQL, then prints the balance of every customer it saw.
//!
//! ```text
//! LOYALTY_DATABASE_URL=postgres://localhost/loyalty \
//! LOYALTY_LOG=loyalty_ledger=debug,info \
//!     cargo run -p ledger-replay-demo -- events.jsonl
//! ```
//!
//! Reads standard input when no file is given. Redelivered lines are reported
//! as duplicates and change nothing.

use std::collections::BTreeSet;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result};
use loyalty_ledger::{ApplyOutcome, EventBody, Ledger, LedgerEvent};
use loyalty_postgres::{PgLedgerStore, PgStoreConfig};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

// ============================================================================
// Logging
// ============================================================================

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("LOYALTY_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// ============================================================================
// Replay
// ============================================================================

#[derive(Debug, Default)]
struct Summary {
    applied: usize,
    duplicates: usize,
    rejected: usize,
    customers: BTreeSet<Uuid>,
}

async fn replay(ledger: &Ledger, input: impl BufRead) -> Result<Summary> {
    let mut summary = Summary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }

        let event = match LedgerEvent::from_json(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping malformed event");
                summary.rejected += 1;
                continue;
            }
        };

        if let Some(customer_id) = customer_of(&event) {
            summary.customers.insert(customer_id);
        }

        match ledger.apply(&event).await {
            Ok(ApplyOutcome::Applied) => summary.applied += 1,
            Ok(ApplyOutcome::Duplicate) => summary.duplicates += 1,
            Err(err) => {
                error!(line = index + 1, error = %err, "event rejected");
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}

/// Cancel and return events only carry the order id.
fn customer_of(event: &LedgerEvent) -> Option<Uuid> {
    match &event.body {
        EventBody::CustomerCreated(p) | EventBody::CustomerDeleted(p) => Some(p.customer_id),
        EventBody::OrderPlaced(p) => Some(p.customer_id),
        EventBody::OrderCanceled(_) | EventBody::OrderReturned(_) => None,
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = PgStoreConfig::from_env()?;
    let pool = config.connect().await?;
    let ledger = Ledger::new(Arc::new(PgLedgerStore::new(pool)));

    let summary = match std::env::args().nth(1) {
        Some(path) => {
            let file = std::fs::File::open(&path).with_context(|| format!("cannot open {path}"))?;
            replay(&ledger, BufReader::new(file)).await?
        }
        None => replay(&ledger, io::stdin().lock()).await?,
    };

    info!(
        applied = summary.applied,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        "replay finished"
    );

    for customer_id in &summary.customers {
        let balance = ledger.balance(*customer_id).await?;
        println!("{customer_id}\t{balance}");
    }

    Ok(())
}
