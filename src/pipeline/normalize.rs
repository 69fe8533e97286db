//! Record normalisation: one logical row → one [`ApplicationRecord`] or a skip.
//!
//! The description column does double duty: its text with line breaks
//! removed is the description, and its last non-empty line (the street
//! address in the published document) becomes the address.

use crate::config::ScraperConfig;
use crate::error::{DateParseFailure, RowError};
use crate::pipeline::table::{RawTableRow, Row, LINE_BREAK};
use crate::record::ApplicationRecord;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Runs of slashes, as in `01//03/2020`.
static REPEATED_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").unwrap());

/// Any whitespace inside a date value.
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Day, month and a two-digit year.
static SHORT_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2})$").unwrap());

/// Why a row produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// First cell is not the data-row marker (header, footer, page furniture).
    NotDataRow { first_cell: Option<String> },
    /// Marker present but no council reference.
    MissingReference,
}

/// Result of normalising one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Record {
        record: ApplicationRecord,
        /// Set when a received date was present but unreadable.
        date_failure: Option<DateParseFailure>,
    },
    Skipped(SkipReason),
}

/// Turns rows into records for one run.
///
/// `today` is fixed at construction so every record of a run carries the
/// same `date_scraped`.
pub struct Normalizer<'a> {
    config: &'a ScraperConfig,
    today: NaiveDate,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a ScraperConfig, today: NaiveDate) -> Self {
        Self { config, today }
    }

    /// Normalise a row.
    ///
    /// Errors only for data rows that cannot become a record; everything
    /// else that is not a record comes back as [`RowOutcome::Skipped`].
    /// Whether an error ends the run is decided by the caller's
    /// [`crate::config::MissingFieldPolicy`].
    pub fn normalize(&self, row: &Row) -> Result<RowOutcome, RowError> {
        let Some(raw) = RawTableRow::from_row(row, &self.config.table)? else {
            return Ok(RowOutcome::Skipped(SkipReason::NotDataRow {
                first_cell: row.first_cell().map(String::from),
            }));
        };

        let Some(reference) = raw.reference else {
            debug!("Data row on page {} has no reference", raw.page);
            return Ok(RowOutcome::Skipped(SkipReason::MissingReference));
        };

        let Some(source) = raw.description else {
            return Err(RowError::MissingField {
                reference,
                field: "address".to_string(),
            });
        };

        let address = derive_address(&source, &self.config.jurisdiction).ok_or_else(|| {
            RowError::EmptyAddress {
                reference: reference.clone(),
            }
        })?;

        let description = Some(clean_description(&source)).filter(|d| !d.is_empty());

        let (date_received, date_failure) = match raw.date_received.as_deref().map(str::trim) {
            None | Some("") => (None, None),
            Some(value) => match parse_received_date(value) {
                Ok(date) => (Some(date), None),
                Err(failure) => {
                    warn!(
                        "Row '{}': could not parse received date {:?}, storing without it",
                        reference, failure.raw
                    );
                    (None, Some(failure))
                }
            },
        };

        Ok(RowOutcome::Record {
            record: ApplicationRecord {
                council_reference: reference,
                description,
                address,
                date_scraped: self.today,
                info_url: self.config.info_url.clone(),
                comment_url: self.config.comment_url.clone(),
                date_received,
            },
            date_failure,
        })
    }
}

/// Description text with every line break removed and surrounding
/// whitespace trimmed.
pub fn clean_description(source: &str) -> String {
    source.replace(LINE_BREAK, "").trim().to_string()
}

/// Last non-empty line of `source`, tagged with the jurisdiction.
///
/// `None` when the field has no non-empty line at all.
pub fn derive_address(source: &str, jurisdiction: &str) -> Option<String> {
    source
        .split(LINE_BREAK)
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
        .map(|line| format!("{}, {}", line, jurisdiction))
}

/// Parse a day/month/year received date.
///
/// Doubled slashes collapse to one, whitespace is removed, and a two-digit
/// year is read as 20YY.
pub fn parse_received_date(raw: &str) -> Result<NaiveDate, DateParseFailure> {
    let collapsed = REPEATED_SLASHES.replace_all(raw, "/");
    let compact = WHITESPACE.replace_all(&collapsed, "");
    let full = SHORT_YEAR.replace(&compact, "$1/$2/20$3");

    NaiveDate::parse_from_str(&full, "%d/%m/%Y").map_err(|_| DateParseFailure {
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingFieldPolicy;

    fn config(policy: MissingFieldPolicy) -> ScraperConfig {
        ScraperConfig::builder()
            .on_missing_address_field(policy)
            .build()
            .unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, 4).unwrap()
    }

    fn row(cells: &[&str]) -> Row {
        Row::new(1, cells.iter().map(|c| c.to_string()).collect())
    }

    fn record(outcome: RowOutcome) -> (ApplicationRecord, Option<DateParseFailure>) {
        match outcome {
            RowOutcome::Record {
                record,
                date_failure,
            } => (record, date_failure),
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn test_derive_address_uses_last_line() {
        assert_eq!(
            derive_address("123 Example St\nSuburb", "WA").as_deref(),
            Some("Suburb, WA")
        );
        assert_eq!(derive_address("Suburb\n\n", "WA").as_deref(), Some("Suburb, WA"));
        assert_eq!(derive_address(" \n ", "WA"), None);
    }

    #[test]
    fn test_clean_description_drops_line_breaks() {
        assert_eq!(
            clean_description("123 Example St\nSuburb"),
            "123 Example StSuburb"
        );
        assert_eq!(clean_description("  Shops\n"), "Shops");
    }

    #[test]
    fn test_parse_received_date() {
        let expected = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        assert_eq!(parse_received_date("01/03/2020"), Ok(expected));
        assert_eq!(parse_received_date("01//03/2020"), Ok(expected));
        assert_eq!(parse_received_date(" 01 / 03 / 2020 "), Ok(expected));
        assert_eq!(parse_received_date("1/3/20"), Ok(expected));
    }

    #[test]
    fn test_parse_received_date_failure_keeps_raw() {
        let err = parse_received_date("not-a-date").unwrap_err();
        assert_eq!(err.raw, "not-a-date");
        assert!(parse_received_date("31/02/2020").is_err());
    }

    #[test]
    fn builds_record_from_data_row() {
        let cfg = config(MissingFieldPolicy::Skip);
        let normalizer = Normalizer::new(&cfg, today());
        let outcome = normalizer
            .normalize(&row(&[
                "No",
                "DAP/20/01790",
                "City of Stirling",
                "$2.1m",
                "Two storey dwelling\n123 Example St\nSuburb",
                "01//03/2020",
            ]))
            .unwrap();

        let (record, failure) = record(outcome);
        assert_eq!(record.council_reference, "DAP/20/01790");
        assert_eq!(
            record.description.as_deref(),
            Some("Two storey dwelling123 Example StSuburb")
        );
        assert_eq!(record.address, "Suburb, WA");
        assert_eq!(record.date_scraped, today());
        assert_eq!(record.date_received, NaiveDate::from_ymd_opt(2020, 3, 1));
        assert_eq!(record.info_url, cfg.info_url);
        assert_eq!(record.comment_url, cfg.comment_url);
        assert!(failure.is_none());
    }

    #[test]
    fn unparsable_date_still_yields_record() {
        let cfg = config(MissingFieldPolicy::Skip);
        let outcome = Normalizer::new(&cfg, today())
            .normalize(&row(&["No", "DAP/20/1", "", "", "Suburb", "not-a-date"]))
            .unwrap();

        let (record, failure) = record(outcome);
        assert_eq!(record.date_received, None);
        assert_eq!(failure.unwrap().raw, "not-a-date");
    }

    #[test]
    fn missing_date_column_is_not_a_failure() {
        let cfg = config(MissingFieldPolicy::Skip);
        let outcome = Normalizer::new(&cfg, today())
            .normalize(&row(&["No", "DAP/20/1", "", "", "Suburb"]))
            .unwrap();

        let (record, failure) = record(outcome);
        assert_eq!(record.date_received, None);
        assert!(failure.is_none());
    }

    #[test]
    fn skips_page_furniture() {
        let cfg = config(MissingFieldPolicy::Fail);
        let outcome = Normalizer::new(&cfg, today())
            .normalize(&row(&["Page", "1 of 4"]))
            .unwrap();
        assert_eq!(
            outcome,
            RowOutcome::Skipped(SkipReason::NotDataRow {
                first_cell: Some("Page".into())
            })
        );
    }

    #[test]
    fn skips_marker_row_without_reference() {
        let cfg = config(MissingFieldPolicy::Fail);
        let outcome = Normalizer::new(&cfg, today())
            .normalize(&row(&["No", " ", "", "", "Suburb"]))
            .unwrap();
        assert_eq!(outcome, RowOutcome::Skipped(SkipReason::MissingReference));
    }

    #[test]
    fn missing_address_column_is_a_row_error() {
        for policy in [MissingFieldPolicy::Skip, MissingFieldPolicy::Fail] {
            let cfg = config(policy);
            let err = Normalizer::new(&cfg, today())
                .normalize(&row(&["No", "DAP/20/1", "City"]))
                .unwrap_err();
            assert_eq!(
                err,
                RowError::MissingField {
                    reference: "DAP/20/1".into(),
                    field: "address".into()
                }
            );
        }
    }

    #[test]
    fn blank_address_source_is_a_row_error() {
        let cfg = config(MissingFieldPolicy::Skip);
        let err = Normalizer::new(&cfg, today())
            .normalize(&row(&["No", "DAP/20/1", "", "", "", "01/03/2020"]))
            .unwrap_err();
        assert_eq!(
            err,
            RowError::EmptyAddress {
                reference: "DAP/20/1".into()
            }
        );
    }

    #[test]
    fn row_wider_than_table_is_a_row_error() {
        let cfg = ScraperConfig::builder().expected_columns(6).build().unwrap();
        let err = Normalizer::new(&cfg, today())
            .normalize(&row(&[
                "No",
                "DAP/20/1",
                "City",
                "$1m",
                "Two storey",
                "dwelling",
                "01/03/2020",
            ]))
            .unwrap_err();
        assert_eq!(
            err,
            RowError::ColumnCount {
                reference: "DAP/20/1".into(),
                page: 1,
                found: 7,
                expected: 6,
            }
        );
    }
}
