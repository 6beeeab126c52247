//! Record store gateway for rowpipe.
//!
//! [`StoreGateway`] is the contract the pipeline persists through. Two
//! implementations ship here:
//! - [`Storage`]: libSQL, either an embedded file or a remote database
//! - [`MemoryStore`]: process-local map, for tests and dry runs
//!
//! The pipeline only ever calls [`StoreGateway::put`]. `get`, `scan`, `query`
//! and `update` exist for the surrounding tooling.

mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use rowpipe_shared::{
    CanonicalRecord, RecordKey, RecordPatch, Result, RowpipeError, Source, StoreConfig,
};

pub use memory::MemoryStore;

/// Persistence contract keyed by `(id, timestamp)`.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Insert one record. Fails if the key already exists.
    async fn put(&self, record: &CanonicalRecord) -> Result<()>;

    /// Fetch one record by key.
    async fn get(&self, key: &RecordKey) -> Result<Option<CanonicalRecord>>;

    /// Up to `limit` records ordered by `(id, timestamp)`.
    async fn scan(&self, limit: usize) -> Result<Vec<CanonicalRecord>>;

    /// Every record stored under `id`, oldest first.
    async fn query(&self, id: &str) -> Result<Vec<CanonicalRecord>>;

    /// Apply a validated patch. Returns `None` when the key does not exist.
    async fn update(&self, key: &RecordKey, patch: &RecordPatch)
    -> Result<Option<CanonicalRecord>>;
}

/// Largest stock value the `INTEGER` column holds.
pub const MAX_STOCK: u64 = i64::MAX as u64;

/// Stock as stored. Values past [`MAX_STOCK`] fail instead of wrapping.
pub(crate) fn stock_column(stock: u64, key: &RecordKey) -> Result<i64> {
    i64::try_from(stock).map_err(|_| {
        RowpipeError::PersistenceFailed(format!(
            "{key}: stock {stock} exceeds the storable maximum {MAX_STOCK}"
        ))
    })
}

const RECORD_COLUMNS: &str = "id, timestamp, name, category, price, stock, source, source_detail, \
                              processed_at, processor_version, updated_at";

/// libSQL-backed record store.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open the store described by `config`: a remote database when the
    /// endpoint is a URL, otherwise a local file.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        if !config.is_remote() {
            return Self::open(Path::new(&config.endpoint)).await;
        }

        let token = config.credentials.resolve_token()?.unwrap_or_default();
        tracing::info!(endpoint = %config.endpoint, region = %config.region, "connecting to remote store");

        let db = libsql::Builder::new_remote(config.endpoint.clone(), token)
            .build()
            .await
            .map_err(|e| RowpipeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| RowpipeError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RowpipeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RowpipeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| RowpipeError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for inspection tooling).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RowpipeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| RowpipeError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    RowpipeError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(RowpipeError::PersistenceFailed(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    async fn select(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<CanonicalRecord>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| RowpipeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| RowpipeError::Storage(e.to_string()))?
        {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }
}

#[async_trait]
impl StoreGateway for Storage {
    async fn put(&self, record: &CanonicalRecord) -> Result<()> {
        self.check_writable()?;
        let stock = stock_column(record.stock, &record.key())?;
        self.conn
            .execute(
                "INSERT INTO records (id, timestamp, name, category, price, stock, source, source_detail, processed_at, processor_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id.as_str(),
                    record.timestamp,
                    record.name.as_str(),
                    record.category.as_str(),
                    record.price,
                    stock,
                    record.source.kind(),
                    record.source.detail(),
                    record.processed_at.to_rfc3339(),
                    record.processor_version.as_str(),
                ],
            )
            .await
            .map_err(|e| RowpipeError::PersistenceFailed(format!("{}: {e}", record.key())))?;
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<CanonicalRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1 AND timestamp = ?2");
        let mut found = self
            .select(&sql, params![key.id.as_str(), key.timestamp])
            .await?;
        Ok(found.pop())
    }

    async fn scan(&self, limit: usize) -> Result<Vec<CanonicalRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records ORDER BY id, timestamp LIMIT ?1");
        self.select(&sql, params![limit as i64]).await
    }

    async fn query(&self, id: &str) -> Result<Vec<CanonicalRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1 ORDER BY timestamp");
        self.select(&sql, params![id]).await
    }

    async fn update(
        &self,
        key: &RecordKey,
        patch: &RecordPatch,
    ) -> Result<Option<CanonicalRecord>> {
        self.check_writable()?;
        if patch.is_empty() {
            return Err(RowpipeError::validation("patch has no fields to update"));
        }

        let stock = patch.stock.map(|s| stock_column(s, key)).transpose()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE records SET
                   name = COALESCE(?1, name),
                   category = COALESCE(?2, category),
                   price = COALESCE(?3, price),
                   stock = COALESCE(?4, stock),
                   updated_at = ?5
                 WHERE id = ?6 AND timestamp = ?7",
                params![
                    patch.name.as_deref(),
                    patch.category.as_deref(),
                    patch.price,
                    stock,
                    now.as_str(),
                    key.id.as_str(),
                    key.timestamp,
                ],
            )
            .await
            .map_err(|e| RowpipeError::PersistenceFailed(format!("{key}: {e}")))?;

        if changed == 0 {
            return Ok(None);
        }
        self.get(key).await
    }
}

/// Convert a database row to a [`CanonicalRecord`].
fn row_to_record(row: &libsql::Row) -> Result<CanonicalRecord> {
    let column = |idx: i32, e: libsql::Error| RowpipeError::Storage(format!("column {idx}: {e}"));
    let text = |idx: i32| -> Result<String> { row.get::<String>(idx).map_err(|e| column(idx, e)) };
    let parse_time = |s: &str| {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RowpipeError::Storage(format!("invalid date: {e}")))
    };

    let stock = row.get::<i64>(5).map_err(|e| column(5, e))?;
    let source_kind = text(6)?;
    let source = Source::from_parts(&source_kind, text(7)?)?;

    Ok(CanonicalRecord {
        id: text(0)?,
        timestamp: row.get::<i64>(1).map_err(|e| column(1, e))?,
        name: text(2)?,
        category: text(3)?,
        price: row.get::<f64>(4).map_err(|e| column(4, e))?,
        stock: u64::try_from(stock)
            .map_err(|_| RowpipeError::Storage(format!("column 5: negative stock {stock}")))?,
        source,
        processed_at: parse_time(&text(8)?)?,
        processor_version: text(9)?,
        updated_at: match row.get_value(10).map_err(|e| column(10, e))? {
            libsql::Value::Null => None,
            libsql::Value::Text(s) => Some(parse_time(&s)?),
            other => {
                return Err(RowpipeError::Storage(format!(
                    "column 10: expected text or null, got {other:?}"
                )));
            }
        },
    })
}
