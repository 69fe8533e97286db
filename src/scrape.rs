//! Run entry points.
//!
//! A run is strictly sequential: fetch the document, convert it, then walk
//! pages in order and rows in order, touching the store once per record.
//! Fetch and conversion failures end the run before any record is written.

use crate::config::{MissingFieldPolicy, ScraperConfig};
use crate::error::{RowError, ScrapeError};
use crate::output::RunReport;
use crate::pipeline::extract::{self, Page};
use crate::pipeline::fetch;
use crate::pipeline::normalize::{Normalizer, RowOutcome, SkipReason};
use crate::pipeline::table::{self, Row, TableReconstructor};
use crate::pipeline::upsert::{self, UpsertOutcome};
use crate::store::{RecordStore, SqliteStore};
use chrono::NaiveDate;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Scrape the configured source into `store`.
///
/// # Errors
/// Returns `Err(ScrapeError)` only for fatal errors:
/// - the document could not be fetched or converted
/// - the store rejected a write
/// - a row failed under [`MissingFieldPolicy::Fail`]
pub async fn scrape<S: RecordStore>(
    config: &ScraperConfig,
    store: &S,
) -> Result<RunReport, ScrapeError> {
    let start = Instant::now();
    info!("Starting scrape: {}", config.source);

    let bytes =
        fetch::fetch_document(&config.source, config.download_timeout_secs, &config.user_agent)
            .await?;
    let mut report = scrape_bytes(bytes, config, store).await?;

    report.duration_ms = start.elapsed().as_millis() as u64;
    Ok(report)
}

/// Scrape PDF bytes already in memory into `store`.
pub async fn scrape_bytes<S: RecordStore>(
    bytes: Vec<u8>,
    config: &ScraperConfig,
    store: &S,
) -> Result<RunReport, ScrapeError> {
    let start = Instant::now();
    let pages = extract::extract_pages(bytes, config.pdfium_library_path.clone()).await?;
    let today = chrono::Local::now().date_naive();
    let mut report = process_pages(&pages, config, store, today).await?;

    report.duration_ms = start.elapsed().as_millis() as u64;
    Ok(report)
}

/// Scrape into the SQLite database named by `config.database_url`.
pub async fn scrape_into_database(config: &ScraperConfig) -> Result<RunReport, ScrapeError> {
    let store = SqliteStore::connect(&config.database_url).await?;
    let result = scrape(config, &store).await;
    store.close().await;
    result
}

/// Synchronous wrapper around [`scrape_into_database`].
///
/// Creates a temporary tokio runtime internally.
pub fn scrape_sync(config: &ScraperConfig) -> Result<RunReport, ScrapeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScrapeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(scrape_into_database(config))
}

/// Fetch, convert and reconstruct the table without touching any store.
pub async fn inspect(config: &ScraperConfig) -> Result<Vec<Row>, ScrapeError> {
    let bytes =
        fetch::fetch_document(&config.source, config.download_timeout_secs, &config.user_agent)
            .await?;
    let pages = extract::extract_pages(bytes, config.pdfium_library_path.clone()).await?;
    Ok(table::reconstruct(&pages, &config.table))
}

/// Run converted pages through reconstruction, normalisation and the upsert
/// gate.
///
/// `today` becomes every record's `date_scraped`.
pub async fn process_pages<S: RecordStore>(
    pages: &[Page],
    config: &ScraperConfig,
    store: &S,
    today: NaiveDate,
) -> Result<RunReport, ScrapeError> {
    let start = Instant::now();
    let normalizer = Normalizer::new(config, today);
    let mut report = RunReport::default();
    report.stats.pages = pages.len();

    let mut reconstructor = TableReconstructor::new(&config.table);
    for page in pages {
        let rows = reconstructor.page(&page.fragments);
        debug!("Page {}: {} logical rows", page.number, rows.len());
        report.stats.rows += rows.len();

        for row in &rows {
            let outcome = match normalizer.normalize(row) {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.stats.data_rows += 1;
                    if matches!(e, RowError::ColumnCount { .. }) {
                        report.stats.column_mismatches += 1;
                    }
                    match config.on_missing_address_field {
                        MissingFieldPolicy::Skip => {
                            warn!("Skipping row on page {}: {}", page.number, e);
                            report.stats.row_errors += 1;
                            report.row_errors.push(e);
                            continue;
                        }
                        MissingFieldPolicy::Fail => return Err(ScrapeError::Row(e)),
                    }
                }
            };

            let (record, date_failure) = match outcome {
                RowOutcome::Skipped(SkipReason::NotDataRow { .. }) => continue,
                RowOutcome::Skipped(SkipReason::MissingReference) => {
                    report.stats.data_rows += 1;
                    report.stats.skipped_rows += 1;
                    continue;
                }
                RowOutcome::Record {
                    record,
                    date_failure,
                } => (record, date_failure),
            };

            report.stats.data_rows += 1;
            if date_failure.is_some() {
                report.stats.date_failures += 1;
            }

            match upsert::upsert_if_absent(store, &record).await? {
                UpsertOutcome::Inserted => {
                    report.stats.inserted += 1;
                    report.inserted.push(record.council_reference);
                }
                UpsertOutcome::SkippedDuplicate => {
                    report.stats.duplicates += 1;
                    report.duplicates.push(record.council_reference);
                }
            }
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Run complete: {} inserted, {} already saved, {} row errors, {}ms",
        report.stats.inserted,
        report.stats.duplicates,
        report.stats.row_errors,
        report.duration_ms
    );
    Ok(report)
}
