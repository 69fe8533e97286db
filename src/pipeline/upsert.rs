//! Upsert gate: insert a record unless its reference is already stored.
//!
//! A failed lookup is treated exactly like a miss. On a first run the store
//! has no table yet and every lookup fails; inserting is the right call then,
//! and the store's own keyed upsert still prevents a duplicate if the lookup
//! failed for some other reason.

use crate::error::StoreError;
use crate::record::ApplicationRecord;
use crate::store::RecordStore;
use tracing::{debug, info};

/// Result of a key lookup as seen by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found,
    /// Key absent, or the lookup itself failed.
    NotFound,
}

/// What the gate did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    SkippedDuplicate,
}

/// Look up a reference, failing open.
pub async fn lookup<S: RecordStore>(store: &S, council_reference: &str) -> Lookup {
    match store.contains(council_reference).await {
        Ok(true) => Lookup::Found,
        Ok(false) => Lookup::NotFound,
        Err(e) => {
            debug!(
                "Lookup of '{}' failed, treating as not found: {}",
                council_reference, e
            );
            Lookup::NotFound
        }
    }
}

/// Insert `record` unless a record with the same reference is stored.
///
/// Only a failed write is an error.
pub async fn upsert_if_absent<S: RecordStore>(
    store: &S,
    record: &ApplicationRecord,
) -> Result<UpsertOutcome, StoreError> {
    match lookup(store, &record.council_reference).await {
        Lookup::Found => {
            info!("Skipping already saved record {}", record.council_reference);
            Ok(UpsertOutcome::SkippedDuplicate)
        }
        Lookup::NotFound => {
            store.upsert(record).await?;
            debug!("Saved record {}", record.council_reference);
            Ok(UpsertOutcome::Inserted)
        }
    }
}
