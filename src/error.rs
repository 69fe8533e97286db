//! Error types for the dap-scraper library.
//!
//! Failures are split by how far they reach:
//!
//! * [`ScrapeError`] **Fatal**: the run cannot continue (fetch or conversion
//!   failed, or the store refused a write).
//!   Returned as `Err(ScrapeError)` from the top-level `scrape*` functions.
//!
//! * [`RowError`] **Row-level**: one data row could not be turned into a
//!   record. Under [`crate::config::MissingFieldPolicy::Skip`] it is logged and
//!   kept in [`crate::output::RunReport::row_errors`]; under
//!   [`crate::config::MissingFieldPolicy::Fail`] it aborts the run.
//!
//! * [`DateParseFailure`] **Field-level**: the received date could not be
//!   read. The record is still built, with `date_received` left empty.
//!
//! A failed store lookup never ends a run: the upsert gate treats it as
//! "not found" (see [`crate::pipeline::upsert`]).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the dap-scraper library.
#[derive(Debug, Error)]
pub enum ScrapeError {
    // ── Fetch errors ──────────────────────────────────────────────────────
    /// Local source file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the local source file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP request was sent but the download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The fetched bytes could not be turned into positioned text.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    // ── Row errors ────────────────────────────────────────────────────────
    /// A data row failed under [`crate::config::MissingFieldPolicy::Fail`].
    #[error("Row processing aborted the run: {0}")]
    Row(#[from] RowError),

    // ── Store errors ──────────────────────────────────────────────────────
    /// The store rejected a write.
    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures of the PDF-to-positioned-text converter.
///
/// Any of these is fatal for the current fetch cycle; the converter never
/// returns a partial set of pages.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The source returned no bytes at all.
    #[error("Fetched document is empty")]
    Empty,

    /// The bytes do not start with the `%PDF` magic.
    #[error("Fetched document is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { magic: Vec<u8> },

    /// pdfium could not parse the document.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// The text layer of a page could not be read.
    #[error("Text extraction failed for page {page}: {detail}")]
    PageText { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Download a build from https://github.com/bblanchon/pdfium-binaries and either:\n\
  • place libpdfium next to the binary, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),
}

/// A row recognised as a data row that could not become a record.
///
/// Stored in [`crate::output::RunReport`] when the run continues past it.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum RowError {
    /// A column required to build the record is entirely absent from the row.
    #[error("Row '{reference}': required field '{field}' is missing")]
    MissingField { reference: String, field: String },

    /// The address source is present but has no segment to build an address from.
    #[error("Row '{reference}': address field is empty")]
    EmptyAddress { reference: String },

    /// The row has more cells than the table has columns, so its fields
    /// cannot be trusted to sit in their mapped columns.
    #[error(
        "Row '{reference}' on page {page}: {found} cells for a {expected}-column table \
(set --columns to pin the column positions)"
    )]
    ColumnCount {
        reference: String,
        page: usize,
        found: usize,
        expected: usize,
    },
}

impl RowError {
    /// Council reference of the offending row.
    pub fn reference(&self) -> &str {
        match self {
            RowError::MissingField { reference, .. }
            | RowError::EmptyAddress { reference }
            | RowError::ColumnCount { reference, .. } => reference,
        }
    }
}

/// Failures reported by a [`crate::store::RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite backend returned an error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A previous holder of the in-memory store lock panicked.
    #[error("Record store lock was poisoned")]
    Poisoned,
}

/// A received-date value that could not be parsed.
///
/// Carries the raw value exactly as it appeared in the document so it can be
/// logged.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("Unparsable received date: {raw:?}")]
pub struct DateParseFailure {
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_display() {
        let e = RowError::MissingField {
            reference: "DAP/20/01234".into(),
            field: "address".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("DAP/20/01234"), "got: {msg}");
        assert!(msg.contains("address"), "got: {msg}");
    }

    #[test]
    fn row_error_reference() {
        let e = RowError::EmptyAddress {
            reference: "DAP/19/00042".into(),
        };
        assert_eq!(e.reference(), "DAP/19/00042");
    }

    #[test]
    fn column_count_display() {
        let e = RowError::ColumnCount {
            reference: "DAP/20/01790".into(),
            page: 3,
            found: 7,
            expected: 6,
        };
        let msg = e.to_string();
        assert!(msg.contains("7 cells for a 6-column table"), "got: {msg}");
        assert!(msg.contains("page 3"), "got: {msg}");
        assert_eq!(e.reference(), "DAP/20/01790");
    }

    #[test]
    fn row_error_wraps_into_scrape_error() {
        let e: ScrapeError = RowError::EmptyAddress {
            reference: "X".into(),
        }
        .into();
        assert!(matches!(e, ScrapeError::Row(_)));
        assert!(e.to_string().contains("aborted the run"));
    }

    #[test]
    fn not_a_pdf_display() {
        let e = ConversionError::NotAPdf {
            magic: b"<htm".to_vec(),
        };
        assert!(e.to_string().contains("not a valid PDF"));
    }

    #[test]
    fn download_timeout_display() {
        let e = ScrapeError::DownloadTimeout {
            url: "http://example.org/a.pdf".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
        assert!(e.to_string().contains("example.org"));
    }

    #[test]
    fn date_failure_keeps_raw_value() {
        let e = DateParseFailure {
            raw: "not-a-date".into(),
        };
        assert!(e.to_string().contains("not-a-date"));
    }
}
