//! Record persistence.
//!
//! The upsert gate needs only two capabilities from a store: look up a key
//! and write a full record under its key. [`RecordStore`] is that seam.
//! [`SqliteStore`] is the persistent implementation; [`MemoryStore`] backs
//! dry runs and tests.
//!
//! Both give read-after-write consistency within a run, so a reference that
//! appears twice in one document is caught on its second appearance.

use crate::error::StoreError;
use crate::record::{ApplicationRecord, RECORD_COLUMNS};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Table holding one row per council reference.
pub const TABLE_NAME: &str = "data";

/// Key lookup and keyed write of [`ApplicationRecord`]s.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Whether a record with this council reference is stored.
    async fn contains(&self, council_reference: &str) -> Result<bool, StoreError>;

    /// Insert the record, or replace the one stored under the same reference.
    async fn upsert(&self, record: &ApplicationRecord) -> Result<(), StoreError>;
}

// ── SQLite ───────────────────────────────────────────────────────────────

/// SQLite-backed store.
///
/// The `data` table is created on the first write, not on connect. Until
/// then a lookup fails with "no such table", which the upsert gate reads as
/// "not found".
pub struct SqliteStore {
    pool: SqlitePool,
    schema: OnceCell<()>,
}

impl SqliteStore {
    /// Open a connection pool for an sqlx SQLite URL such as
    /// `sqlite:data.sqlite?mode=rwc` or `sqlite::memory:`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("Connecting to database: {}", database_url);

        // One long-lived connection: an in-memory database lives and dies
        // with its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool,
            schema: OnceCell::new(),
        })
    }

    /// Fetch a stored record by reference.
    pub async fn get(&self, council_reference: &str) -> Result<Option<ApplicationRecord>, StoreError> {
        let record = sqlx::query_as::<_, ApplicationRecord>(&format!(
            "SELECT {} FROM {} WHERE council_reference = ?",
            RECORD_COLUMNS.join(", "),
            TABLE_NAME
        ))
        .bind(council_reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", TABLE_NAME))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema
            .get_or_try_init(|| create_schema(&self.pool))
            .await
            .map(|_| ())
    }
}

/// Create the table if needed and add any record column it lacks.
async fn create_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    let columns = RECORD_COLUMNS
        .iter()
        .map(|c| {
            if *c == "council_reference" {
                format!("{} TEXT PRIMARY KEY", c)
            } else {
                format!("{} TEXT", c)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        TABLE_NAME, columns
    ))
    .execute(pool)
    .await?;

    let existing: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT name FROM pragma_table_info('{}')",
        TABLE_NAME
    ))
    .fetch_all(pool)
    .await?;

    for column in RECORD_COLUMNS {
        if existing.iter().any(|name| name == column) {
            continue;
        }
        info!("Adding missing column '{}' to table '{}'", column, TABLE_NAME);
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT",
            TABLE_NAME, column
        ))
        .execute(pool)
        .await?;
    }

    // A table created by another tool may lack the key constraint the upsert relies on.
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {0}_council_reference ON {0} (council_reference)",
        TABLE_NAME
    ))
    .execute(pool)
    .await?;

    debug!("Schema ready for table '{}'", TABLE_NAME);
    Ok(())
}

impl RecordStore for SqliteStore {
    async fn contains(&self, council_reference: &str) -> Result<bool, StoreError> {
        let found: Option<String> = sqlx::query_scalar(&format!(
            "SELECT council_reference FROM {} WHERE council_reference = ?",
            TABLE_NAME
        ))
        .bind(council_reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn upsert(&self, record: &ApplicationRecord) -> Result<(), StoreError> {
        self.ensure_schema().await?;

        let placeholders = vec!["?"; RECORD_COLUMNS.len()].join(", ");
        let updates = RECORD_COLUMNS[1..]
            .iter()
            .map(|c| format!("{0} = excluded.{0}", c))
            .collect::<Vec<_>>()
            .join(", ");

        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(council_reference) DO UPDATE SET {}",
            TABLE_NAME,
            RECORD_COLUMNS.join(", "),
            placeholders,
            updates
        ))
        .bind(&record.council_reference)
        .bind(&record.description)
        .bind(&record.address)
        .bind(record.date_scraped)
        .bind(&record.info_url)
        .bind(&record.comment_url)
        .bind(record.date_received)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Store kept entirely in memory, ordered by reference.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, ApplicationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, council_reference: &str) -> Result<Option<ApplicationRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(council_reference).cloned())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.lock().map_err(|_| StoreError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// All stored records, ordered by reference.
    pub fn records(&self) -> Result<Vec<ApplicationRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.values().cloned().collect())
    }
}

impl RecordStore for MemoryStore {
    async fn contains(&self, council_reference: &str) -> Result<bool, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.contains_key(council_reference))
    }

    async fn upsert(&self, record: &ApplicationRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.insert(record.council_reference.clone(), record.clone());
        Ok(())
    }
}
