//! CLI binary for dap-scraper.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ScraperConfig` and prints the run report.

use anyhow::{Context, Result};
use clap::Parser;
use dap_scraper::config::{DEFAULT_DATABASE_URL, DEFAULT_INFO_URL, DEFAULT_SOURCE_URL};
use dap_scraper::{
    inspect, scrape, ColumnBoundaries, MemoryStore, MissingFieldPolicy, RunReport, ScraperConfig,
    SqliteStore,
};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scrape the published document into ./data.sqlite
  dap-scraper

  # Scrape a downloaded copy into another database
  dap-scraper "Current DAP Applications.pdf" --database sqlite:daps.sqlite?mode=rwc

  # See what would be saved without writing anything
  dap-scraper --dry-run --json

  # Show the reconstructed table rows (column tuning)
  dap-scraper --dump-rows --row-tolerance 4 --column-tolerance 6

  # Pin column start positions instead of inferring them
  dap-scraper --columns 28,70,160,250,330,520

  # Report data rows that spill into a seventh column
  dap-scraper --expected-columns 6

ENVIRONMENT VARIABLES:
  DATABASE_URL            sqlx SQLite URL of the record store
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                tracing filter, overrides --verbose/--quiet

SETUP:
  pdfium is loaded at runtime. Download a build from
  https://github.com/bblanchon/pdfium-binaries and either place it next to
  the binary or point PDFIUM_LIB_PATH at it.
"#;

/// Scrape WA Development Assessment Panel applications into SQLite.
#[derive(Parser, Debug)]
#[command(
    name = "dap-scraper",
    version,
    about = "Scrape WA Development Assessment Panel applications into SQLite",
    long_about = "Download the current DAP applications PDF, rebuild its table from the \
position of the text on each page, and save every application not already stored, keyed by \
council reference.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(env = "DAP_SOURCE", default_value = DEFAULT_SOURCE_URL)]
    source: String,

    /// sqlx SQLite connection string of the record store.
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database: String,

    /// Info URL stamped on every record.
    #[arg(long, env = "DAP_INFO_URL", default_value = DEFAULT_INFO_URL)]
    info_url: String,

    /// Comment URL stamped on every record (defaults to the info URL).
    #[arg(long, env = "DAP_COMMENT_URL")]
    comment_url: Option<String>,

    /// What to do with a data row that cannot become a record.
    #[arg(long, env = "DAP_ON_MISSING_ADDRESS", value_enum, default_value = "skip")]
    on_missing_address: PolicyArg,

    /// First-cell value marking a data row.
    #[arg(long, env = "DAP_ROW_MARKER", default_value = "No")]
    marker: String,

    /// Column index of the council reference.
    #[arg(long, default_value_t = 1)]
    reference_column: usize,

    /// Column index of the description (its last line is the address).
    #[arg(long, default_value_t = 4)]
    description_column: usize,

    /// Column index of the received date.
    #[arg(long, default_value_t = 5)]
    date_column: usize,

    /// Max baseline distance (points) for text to share a visual line.
    #[arg(long, env = "DAP_ROW_TOLERANCE", default_value_t = 3.0)]
    row_tolerance: f32,

    /// Max distance (points) between text starts in one column.
    #[arg(long, env = "DAP_COLUMN_TOLERANCE", default_value_t = 4.0)]
    column_tolerance: f32,

    /// Lines that must start text at a position before it counts as a column.
    #[arg(long, default_value_t = 2)]
    min_column_support: usize,

    /// Number of columns the table has; wider data rows become row errors.
    #[arg(long, env = "DAP_EXPECTED_COLUMNS")]
    expected_columns: Option<usize>,

    /// Fixed column start positions in points, comma-separated (e.g. 28,70,160).
    #[arg(long, env = "DAP_COLUMNS", value_delimiter = ',')]
    columns: Option<Vec<f32>>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DAP_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// User-Agent header sent with the download.
    #[arg(long, env = "DAP_USER_AGENT")]
    user_agent: Option<String>,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Run against an in-memory store; nothing is written to disk.
    #[arg(long)]
    dry_run: bool,

    /// Print the reconstructed table rows and exit.
    #[arg(long, conflicts_with = "dry_run")]
    dump_rows: bool,

    /// Print the run report (or rows) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DAP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DAP_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Skip,
    Fail,
}

impl From<PolicyArg> for MissingFieldPolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::Skip => MissingFieldPolicy::Skip,
            PolicyArg::Fail => MissingFieldPolicy::Fail,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    // ── Row dump mode ────────────────────────────────────────────────────
    if cli.dump_rows {
        let rows = inspect(&config).await.context("Failed to read table rows")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("Failed to serialise rows")?
            );
        } else {
            for row in rows.iter().filter(|r| !r.is_blank()) {
                let cells: Vec<String> = row.cells.iter().map(|c| c.replace('\n', "⏎")).collect();
                println!("{} {}", dim(&format!("p{:<3}", row.page)), cells.join(" │ "));
            }
        }
        return Ok(());
    }

    // ── Run scrape ───────────────────────────────────────────────────────
    let report = if cli.dry_run {
        let store = MemoryStore::new();
        scrape(&config, &store).await.context("Scrape failed")?
    } else {
        let store = SqliteStore::connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_url))?;
        let result = scrape(&config, &store).await;
        store.close().await;
        result.context("Scrape failed")?
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise run report")?
        );
    } else if !cli.quiet {
        print_summary(&report, cli.dry_run);
    }

    Ok(())
}

/// Map CLI args to `ScraperConfig`.
fn build_config(cli: &Cli) -> Result<ScraperConfig> {
    let mut builder = ScraperConfig::builder()
        .source(cli.source.clone())
        .database_url(cli.database.clone())
        .info_url(cli.info_url.clone())
        .on_missing_address_field(cli.on_missing_address.into())
        .row_marker(cli.marker.clone())
        .reference_column(cli.reference_column)
        .description_column(cli.description_column)
        .date_received_column(cli.date_column)
        .row_tolerance(cli.row_tolerance)
        .column_tolerance(cli.column_tolerance)
        .min_column_support(cli.min_column_support)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref url) = cli.comment_url {
        builder = builder.comment_url(url.clone());
    }
    if let Some(count) = cli.expected_columns {
        builder = builder.expected_columns(count);
    }
    if let Some(ref columns) = cli.columns {
        builder = builder.column_boundaries(ColumnBoundaries::Fixed(columns.clone()));
    }
    if let Some(ref agent) = cli.user_agent {
        builder = builder.user_agent(agent.clone());
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(path.clone());
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(report: &RunReport, dry_run: bool) {
    let stats = &report.stats;
    let mark = if report.row_errors.is_empty() {
        green("✔")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{}  {} new  {} already saved  {}  {}ms{}",
        mark,
        bold(&stats.inserted.to_string()),
        stats.duplicates,
        dim(&format!(
            "{} pages, {} data rows",
            stats.pages, stats.data_rows
        )),
        report.duration_ms,
        if dry_run { "  (dry run)" } else { "" },
    );
    if stats.date_failures > 0 {
        eprintln!("   {} records saved without a received date", stats.date_failures);
    }
    if stats.column_mismatches > 0 {
        eprintln!(
            "   {} rows wider than the table; try --columns",
            stats.column_mismatches
        );
    }
    for error in &report.row_errors {
        eprintln!("   {} {}", yellow("skipped:"), error);
    }
}
