//! Configuration types for a scrape run.
//!
//! All run behaviour is controlled through [`ScraperConfig`], built via its
//! [`ScraperConfigBuilder`]. The table geometry lives in its own
//! [`TableLayout`] because it is the part most likely to need tuning when the
//! published document changes font or spacing.

use crate::error::ScrapeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Published location of the current DAP applications document.
pub const DEFAULT_SOURCE_URL: &str =
    "http://www.planning.wa.gov.au/daps/data/Current%20DAP%20Applications/Current%20DAP%20Applications.pdf";

/// Page describing the applications; used as both info and comment URL.
pub const DEFAULT_INFO_URL: &str = "http://daps.planning.wa.gov.au/8.asp";

/// SQLite database created next to the working directory.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:data.sqlite?mode=rwc";

/// Jurisdiction tag appended to every derived address.
pub const DEFAULT_JURISDICTION: &str = "WA";

/// First-cell value that marks a genuine table row.
pub const DEFAULT_ROW_MARKER: &str = "No";

/// Some hosts refuse requests without a browser-like agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// Configuration for one scrape run.
///
/// # Example
/// ```rust
/// use dap_scraper::{MissingFieldPolicy, ScraperConfig};
///
/// let config = ScraperConfig::builder()
///     .source("Current DAP Applications.pdf")
///     .database_url("sqlite::memory:")
///     .on_missing_address_field(MissingFieldPolicy::Fail)
///     .build()
///     .unwrap();
/// assert_eq!(config.jurisdiction, "WA");
/// ```
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// HTTP/HTTPS URL or local path of the PDF. Default: [`DEFAULT_SOURCE_URL`].
    pub source: String,

    /// Info URL stamped on every record. Default: [`DEFAULT_INFO_URL`].
    pub info_url: String,

    /// Comment URL stamped on every record. Default: [`DEFAULT_INFO_URL`].
    pub comment_url: String,

    /// sqlx SQLite connection string. Default: [`DEFAULT_DATABASE_URL`].
    pub database_url: String,

    /// Download timeout for URL sources in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// User-Agent header sent with the download. Default: [`DEFAULT_USER_AGENT`].
    pub user_agent: String,

    /// Explicit pdfium library (file or directory). Default: None, which
    /// tries the working directory and then the system library path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Table geometry and column mapping.
    pub table: TableLayout,

    /// Suffix tag for derived addresses. Default: [`DEFAULT_JURISDICTION`].
    pub jurisdiction: String,

    /// What to do with a data row whose address column is absent. Default: Skip.
    pub on_missing_address_field: MissingFieldPolicy,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE_URL.to_string(),
            info_url: DEFAULT_INFO_URL.to_string(),
            comment_url: DEFAULT_INFO_URL.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            download_timeout_secs: 120,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pdfium_library_path: None,
            table: TableLayout::default(),
            jurisdiction: DEFAULT_JURISDICTION.to_string(),
            on_missing_address_field: MissingFieldPolicy::default(),
        }
    }
}

impl ScraperConfig {
    /// Create a new builder for `ScraperConfig`.
    pub fn builder() -> ScraperConfigBuilder {
        ScraperConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ScraperConfig`].
#[derive(Debug)]
pub struct ScraperConfigBuilder {
    config: ScraperConfig,
}

impl ScraperConfigBuilder {
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = source.into();
        self
    }

    /// Sets the info URL; the comment URL follows unless set separately afterwards.
    pub fn info_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.config.comment_url = url.clone();
        self.config.info_url = url;
        self
    }

    pub fn comment_url(mut self, url: impl Into<String>) -> Self {
        self.config.comment_url = url.into();
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn table(mut self, layout: TableLayout) -> Self {
        self.config.table = layout;
        self
    }

    pub fn row_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.table.marker = marker.into();
        self
    }

    pub fn reference_column(mut self, index: usize) -> Self {
        self.config.table.reference_column = index;
        self
    }

    pub fn description_column(mut self, index: usize) -> Self {
        self.config.table.description_column = index;
        self
    }

    pub fn date_received_column(mut self, index: usize) -> Self {
        self.config.table.date_received_column = index;
        self
    }

    pub fn row_tolerance(mut self, points: f32) -> Self {
        self.config.table.row_tolerance = points;
        self
    }

    pub fn column_tolerance(mut self, points: f32) -> Self {
        self.config.table.column_tolerance = points;
        self
    }

    pub fn min_column_support(mut self, rows: usize) -> Self {
        self.config.table.min_column_support = rows;
        self
    }

    pub fn expected_columns(mut self, columns: usize) -> Self {
        self.config.table.expected_columns = Some(columns);
        self
    }

    pub fn column_boundaries(mut self, boundaries: ColumnBoundaries) -> Self {
        self.config.table.boundaries = boundaries;
        self
    }

    pub fn jurisdiction(mut self, tag: impl Into<String>) -> Self {
        self.config.jurisdiction = tag.into();
        self
    }

    pub fn on_missing_address_field(mut self, policy: MissingFieldPolicy) -> Self {
        self.config.on_missing_address_field = policy;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScraperConfig, ScrapeError> {
        let c = &self.config;
        if c.source.trim().is_empty() {
            return Err(ScrapeError::InvalidConfig("source must not be empty".into()));
        }
        if c.info_url.trim().is_empty() || c.comment_url.trim().is_empty() {
            return Err(ScrapeError::InvalidConfig(
                "info and comment URLs must not be empty".into(),
            ));
        }
        if c.database_url.trim().is_empty() {
            return Err(ScrapeError::InvalidConfig(
                "database URL must not be empty".into(),
            ));
        }
        c.table.validate()?;
        Ok(self.config)
    }
}

// ── Table layout ─────────────────────────────────────────────────────────

/// Geometry and column mapping of the applications table.
///
/// Coordinates are PDF points measured from the top-left corner of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableLayout {
    /// Literal first-cell value of every data row. Default: `"No"`.
    pub marker: String,

    /// Column holding the council reference. Default: 1.
    pub reference_column: usize,

    /// Column holding the description, whose last line is the address. Default: 4.
    pub description_column: usize,

    /// Column holding the received date. Default: 5.
    pub date_received_column: usize,

    /// Maximum baseline distance for two fragments to share a visual row. Default: 3.0.
    ///
    /// Mixed font sizes shift baselines by a point or two; raise this for
    /// documents that mix headings and body text on one line.
    pub row_tolerance: f32,

    /// Maximum distance between x-starts that still counts as one column. Default: 4.0.
    pub column_tolerance: f32,

    /// Distinct visual rows that must start text at an x-position before it
    /// is accepted as an inferred column boundary. Default: 2.
    pub min_column_support: usize,

    /// Number of columns the table is known to have. Default: None.
    ///
    /// When set, inferred boundaries are capped at this count and a data row
    /// with more cells is reported as [`RowError::ColumnCount`](crate::RowError::ColumnCount).
    /// Without it the width comes from the header row.
    pub expected_columns: Option<usize>,

    /// How column boundaries are obtained. Default: inferred per page.
    pub boundaries: ColumnBoundaries,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            marker: DEFAULT_ROW_MARKER.to_string(),
            reference_column: 1,
            description_column: 4,
            date_received_column: 5,
            row_tolerance: 3.0,
            column_tolerance: 4.0,
            min_column_support: 2,
            expected_columns: None,
            boundaries: ColumnBoundaries::default(),
        }
    }
}

impl TableLayout {
    /// Smallest cell count a row needs for every mapped column to be present.
    pub fn required_columns(&self) -> usize {
        self.reference_column
            .max(self.description_column)
            .max(self.date_received_column)
            + 1
    }

    fn validate(&self) -> Result<(), ScrapeError> {
        if self.marker.trim().is_empty() {
            return Err(ScrapeError::InvalidConfig(
                "row marker must not be empty".into(),
            ));
        }
        if !(self.row_tolerance.is_finite() && self.row_tolerance >= 0.0) {
            return Err(ScrapeError::InvalidConfig(format!(
                "row tolerance must be a non-negative number, got {}",
                self.row_tolerance
            )));
        }
        if !(self.column_tolerance.is_finite() && self.column_tolerance >= 0.0) {
            return Err(ScrapeError::InvalidConfig(format!(
                "column tolerance must be a non-negative number, got {}",
                self.column_tolerance
            )));
        }
        if self.min_column_support == 0 {
            return Err(ScrapeError::InvalidConfig(
                "minimum column support must be ≥ 1".into(),
            ));
        }
        if self.reference_column == 0 {
            return Err(ScrapeError::InvalidConfig(
                "reference column cannot be the marker column (0)".into(),
            ));
        }
        if let Some(expected) = self.expected_columns {
            if expected < self.required_columns() {
                return Err(ScrapeError::InvalidConfig(format!(
                    "expected column count {expected} leaves mapped columns out (need {})",
                    self.required_columns()
                )));
            }
        }
        if let ColumnBoundaries::Fixed(starts) = &self.boundaries {
            if starts.is_empty() || starts.iter().any(|x| !x.is_finite()) {
                return Err(ScrapeError::InvalidConfig(
                    "fixed column boundaries must be a non-empty list of numbers".into(),
                ));
            }
        }
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where the reconstructor gets its column boundaries from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ColumnBoundaries {
    /// Learn boundaries from the header row, falling back to clustering
    /// fragment x-starts on pages without one. (default)
    #[default]
    Inferred,
    /// Use these column start positions, in points from the left edge.
    Fixed(Vec<f32>),
}

/// Handling of data rows that lack the address source column.
///
/// The document has historically been processed both ways: some runs skipped
/// such rows, others stopped on them. The choice is left to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Record the row error in the run report and continue. (default)
    #[default]
    Skip,
    /// Abort the run on the first row error.
    Fail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_published_document() {
        let c = ScraperConfig::default();
        assert_eq!(c.table.marker, "No");
        assert_eq!(c.jurisdiction, "WA");
        assert_eq!(c.info_url, c.comment_url);
        assert_eq!(c.on_missing_address_field, MissingFieldPolicy::Skip);
        assert_eq!(c.table.required_columns(), 6);
    }

    #[test]
    fn info_url_sets_comment_url() {
        let c = ScraperConfig::builder()
            .info_url("http://example.org/info")
            .build()
            .unwrap();
        assert_eq!(c.comment_url, "http://example.org/info");

        let c = ScraperConfig::builder()
            .info_url("http://example.org/info")
            .comment_url("http://example.org/comment")
            .build()
            .unwrap();
        assert_eq!(c.info_url, "http://example.org/info");
        assert_eq!(c.comment_url, "http://example.org/comment");
    }

    #[test]
    fn rejects_empty_marker() {
        let err = ScraperConfig::builder().row_marker("  ").build().unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_negative_tolerance() {
        assert!(ScraperConfig::builder().row_tolerance(-1.0).build().is_err());
        assert!(ScraperConfig::builder()
            .column_tolerance(f32::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn rejects_zero_support_and_marker_reference() {
        assert!(ScraperConfig::builder().min_column_support(0).build().is_err());
        assert!(ScraperConfig::builder().reference_column(0).build().is_err());
    }

    #[test]
    fn rejects_expected_columns_below_mapping() {
        assert!(ScraperConfig::builder().expected_columns(5).build().is_err());
        let c = ScraperConfig::builder().expected_columns(7).build().unwrap();
        assert_eq!(c.table.expected_columns, Some(7));
    }

    #[test]
    fn rejects_empty_fixed_boundaries() {
        let err = ScraperConfig::builder()
            .column_boundaries(ColumnBoundaries::Fixed(vec![]))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("fixed column boundaries"));
    }

    #[test]
    fn policy_serialises_snake_case() {
        let json = serde_json::to_string(&MissingFieldPolicy::Fail).unwrap();
        assert_eq!(json, "\"fail\"");
    }
}
