//! # dap-scraper
//!
//! Scrape the Western Australian Development Assessment Panel "current
//! applications" PDF into a local SQLite store, one row per council
//! reference.
//!
//! The document is a table printed to PDF. There is no structured feed, so
//! the table is rebuilt from the position of every piece of text on the page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Fetch      download from the published URL or read a local copy
//!  ├─ 2. Extract    positioned text fragments via pdfium (spawn_blocking)
//!  ├─ 3. Table      visual lines → columns → logical rows (wrapped cells merged)
//!  ├─ 4. Normalize  data rows → ApplicationRecord (address, dates)
//!  └─ 5. Upsert     insert unless the council reference is already stored
//! ```
//!
//! Running twice over the same document inserts nothing the second time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dap_scraper::{scrape_into_database, ScraperConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScraperConfig::builder()
//!         .database_url("sqlite:data.sqlite?mode=rwc")
//!         .build()?;
//!     let report = scrape_into_database(&config).await?;
//!     eprintln!(
//!         "{} new, {} already saved",
//!         report.stats.inserted, report.stats.duplicates
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dap-scraper` binary (clap + anyhow + tracing-subscriber) |
//!
//! pdfium itself is loaded at runtime: from `PDFIUM_LIB_PATH` (CLI), the
//! working directory, or the system library path.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod scrape;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ColumnBoundaries, MissingFieldPolicy, ScraperConfig, ScraperConfigBuilder, TableLayout,
};
pub use error::{ConversionError, DateParseFailure, RowError, ScrapeError, StoreError};
pub use output::{RunReport, RunStats};
pub use pipeline::extract::{Page, PositionedFragment};
pub use pipeline::table::{Row, TableReconstructor};
pub use record::ApplicationRecord;
pub use scrape::{
    inspect, process_pages, scrape, scrape_bytes, scrape_into_database, scrape_sync,
};
pub use store::{MemoryStore, RecordStore, SqliteStore};
