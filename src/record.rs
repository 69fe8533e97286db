//! The normalised planning-application record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One planning application as persisted in the store.
///
/// `council_reference` is the idempotency key: the same reference is never
/// inserted twice, across runs or within one run. Records are built once by
/// the normaliser and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApplicationRecord {
    /// Application reference as printed in the document. Never empty.
    pub council_reference: String,
    /// Description with embedded line breaks removed.
    pub description: Option<String>,
    /// Last line of the description column, suffixed with the jurisdiction tag.
    pub address: String,
    /// Calendar date of the run that produced the record.
    pub date_scraped: NaiveDate,
    pub info_url: String,
    pub comment_url: String,
    /// Lodgement date, absent when the document value was missing or unreadable.
    pub date_received: Option<NaiveDate>,
}

/// Column names of the `data` table, in insert order.
pub const RECORD_COLUMNS: [&str; 7] = [
    "council_reference",
    "description",
    "address",
    "date_scraped",
    "info_url",
    "comment_url",
    "date_received",
];
