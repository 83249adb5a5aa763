//! libSQL storage layer for refsync records.
//!
//! The [`Storage`] struct wraps a libSQL database holding the `record` table.
//! Every mutation is a single committed statement: the pipeline relies on
//! per-record durability, so a mid-batch crash loses at most the in-flight
//! record's progress.

mod migrations;
mod run;

use std::path::Path;

use libsql::{Connection, Database, params};

use refsync_shared::{Record, RefsyncError, Result, parse_timestamp};

pub use run::{DB_FILE_NAME, LOG_FILE_NAME, RunContext};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RefsyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RefsyncError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| RefsyncError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
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
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        RefsyncError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
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

    // -----------------------------------------------------------------------
    // Record operations
    // -----------------------------------------------------------------------

    /// Upsert a record by id (update in place if present, insert otherwise).
    ///
    /// A re-pull must not disturb local pipeline state: `update_flg`,
    /// `error`, and `deleted` keep their stored values on conflict.
    pub async fn upsert_record(&self, record: &Record) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO record (id, title, text, reference, group_id, created_by,
                                     created_at, updated_at, deleted, hash, update_flg, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                   title = excluded.title,
                   text = excluded.text,
                   reference = excluded.reference,
                   group_id = excluded.group_id,
                   created_by = excluded.created_by,
                   created_at = excluded.created_at,
                   updated_at = excluded.updated_at,
                   hash = excluded.hash",
                params![
                    record.id,
                    record.title.as_str(),
                    record.text.as_str(),
                    record.reference.as_str(),
                    record.group_id,
                    record.created_by.as_str(),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                    record.deleted as i64,
                    record.hash.as_str(),
                    record.update_flg as i64,
                    record.error.as_deref(),
                ],
            )
            .await
            .map_err(|e| RefsyncError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a record by id.
    pub async fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, text, reference, group_id, created_by,
                        created_at, updated_at, deleted, hash, update_flg, error
                 FROM record WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| RefsyncError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(RefsyncError::Storage(e.to_string())),
        }
    }

    /// List all records in id order.
    pub async fn list_records(&self) -> Result<Vec<Record>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, text, reference, group_id, created_by,
                        created_at, updated_at, deleted, hash, update_flg, error
                 FROM record ORDER BY id",
                params![],
            )
            .await
            .map_err(|e| RefsyncError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }

    /// Write a record's outcome message (skip reason or failure diagnostic).
    pub async fn set_outcome(&self, id: i64, message: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE record SET error = ?1 WHERE id = ?2",
                params![message, id],
            )
            .await
            .map_err(|e| RefsyncError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Store freshly converted text, its fingerprint, and mark the record dirty.
    pub async fn set_converted(&self, id: i64, text: &str, hash: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE record SET text = ?1, hash = ?2, update_flg = 1 WHERE id = ?3",
                params![text, hash, id],
            )
            .await
            .map_err(|e| RefsyncError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List records staged for upstream push, in id order.
    pub async fn dirty_records(&self) -> Result<Vec<Record>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, text, reference, group_id, created_by,
                        created_at, updated_at, deleted, hash, update_flg, error
                 FROM record WHERE update_flg = 1 ORDER BY id",
                params![],
            )
            .await
            .map_err(|e| RefsyncError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }

    /// Clear the dirty flag after an acknowledged push.
    pub async fn clear_dirty(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE record SET update_flg = 0 WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| RefsyncError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Convert a database row to a [`Record`].
fn row_to_record(row: &libsql::Row) -> Result<Record> {
    Ok(Record {
        id: row
            .get::<i64>(0)
            .map_err(|e| RefsyncError::Storage(e.to_string()))?,
        title: row
            .get::<String>(1)
            .map_err(|e| RefsyncError::Storage(e.to_string()))?,
        text: row
            .get::<String>(2)
            .map_err(|e| RefsyncError::Storage(e.to_string()))?,
        reference: row
            .get::<String>(3)
            .map_err(|e| RefsyncError::Storage(e.to_string()))?,
        group_id: row
            .get::<i64>(4)
            .map_err(|e| RefsyncError::Storage(e.to_string()))?,
        created_by: row
            .get::<String>(5)
            .map_err(|e| RefsyncError::Storage(e.to_string()))?,
        created_at: {
            let s: String = row
                .get(6)
                .map_err(|e| RefsyncError::Storage(e.to_string()))?;
            parse_timestamp(&s)?
        },
        updated_at: {
            let s: String = row
                .get(7)
                .map_err(|e| RefsyncError::Storage(e.to_string()))?;
            parse_timestamp(&s)?
        },
        deleted: row
            .get::<i64>(8)
            .map_err(|e| RefsyncError::Storage(e.to_string()))?
            != 0,
        hash: row
            .get::<String>(9)
            .map_err(|e| RefsyncError::Storage(e.to_string()))?,
        update_flg: row
            .get::<i64>(10)
            .map_err(|e| RefsyncError::Storage(e.to_string()))?
            != 0,
        error: row.get::<String>(11).ok(),
    })
}
