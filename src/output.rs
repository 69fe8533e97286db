//! Run results: what a scrape did to the store.

use crate::error::RowError;
use serde::{Deserialize, Serialize};

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages returned by the converter.
    pub pages: usize,
    /// Logical rows produced by the table reconstructor.
    pub rows: usize,
    /// Rows whose first cell was the data-row marker.
    pub data_rows: usize,
    /// Records newly written to the store.
    pub inserted: usize,
    /// Records skipped because their reference was already stored.
    pub duplicates: usize,
    /// Data rows skipped without an error because they carry no reference.
    pub skipped_rows: usize,
    /// Data rows that failed with a [`RowError`] and were passed over.
    pub row_errors: usize,
    /// Data rows with more cells than the table has columns.
    pub column_mismatches: usize,
    /// Records stored without a received date because it could not be parsed.
    pub date_failures: usize,
}

/// Full outcome of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub stats: RunStats,
    /// References inserted during this run, in document order.
    pub inserted: Vec<String>,
    /// References skipped as already saved, in document order.
    pub duplicates: Vec<String>,
    /// Row-level failures the run continued past.
    pub row_errors: Vec<RowError>,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl RunReport {
    /// True when every data row became a stored or already-stored record.
    pub fn is_clean(&self) -> bool {
        self.row_errors.is_empty() && self.stats.skipped_rows == 0
    }
}
