//! SQLite-backed catalogue store.

use super::models::{
    truncate_message, CatalogueItem, DownloadStatus, NewCatalogueItem, ERROR_MESSAGE_MAX_LEN,
};
use super::schema::CATALOGUE_VERSIONED_SCHEMAS;
use super::trait_def::CatalogueStore;
use crate::sqlite_persistence::{read_schema_version, BASE_DB_VERSION};
use anyhow::{bail, Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

/// A write was rejected because it would duplicate a unique column.
#[derive(Debug, Error)]
#[error("unique constraint violated on column '{column}'")]
pub struct UniqueViolation {
    pub column: String,
}

const SELECT_COLUMNS: &str = "id, title, artist, album, duration, original_url, file_path, \
     thumbnail_url, status, error_message, created_at, updated_at";

/// Statuses for which a new admission or a claim must not touch the row.
const BUSY_STATUSES_SQL: &str = "('downloading', 'complete')";

pub struct SqliteCatalogueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogueStore {
    /// Opens an existing catalogue database or creates a new one.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = if db_path.exists() {
            Connection::open(db_path)
                .with_context(|| format!("Failed to open catalogue database {:?}", db_path))?
        } else {
            let conn = Connection::open(db_path)
                .with_context(|| format!("Failed to create catalogue database {:?}", db_path))?;
            CATALOGUE_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new catalogue database at {:?}", db_path);
            conn
        };

        let version = read_schema_version(&conn).context("Failed to read catalogue version")?;
        let schema_count = CATALOGUE_VERSIONED_SCHEMAS.len();
        if version >= schema_count {
            bail!(
                "Catalogue database version {} is too new (max supported: {})",
                version,
                schema_count - 1
            );
        }
        CATALOGUE_VERSIONED_SCHEMAS[version].validate(&conn)?;
        Self::migrate_if_needed(&conn, version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        CATALOGUE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = CATALOGUE_VERSIONED_SCHEMAS.len() - 1;
        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating catalogue database from version {} to {}",
            current_version, target_version
        );
        for schema in CATALOGUE_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                migration_fn(conn)?;
            }
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + target_version),
            [],
        )?;
        Ok(())
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<CatalogueItem> {
        Ok(CatalogueItem {
            id: row.get("id")?,
            title: row.get("title")?,
            artist: row.get("artist")?,
            album: row.get("album")?,
            duration_seconds: row.get("duration")?,
            external_source: row.get("original_url")?,
            file_path: row.get("file_path")?,
            thumbnail_url: row.get("thumbnail_url")?,
            status: DownloadStatus::from_db_str(&row.get::<_, String>("status")?)
                .unwrap_or(DownloadStatus::Error),
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn query_one(
        conn: &Connection,
        where_clause: &str,
        param: impl rusqlite::ToSql,
    ) -> Result<Option<CatalogueItem>> {
        let sql = format!("SELECT {} FROM songs WHERE {}", SELECT_COLUMNS, where_clause);
        Ok(conn
            .query_row(&sql, params![param], Self::row_to_item)
            .optional()?)
    }
}

/// Maps SQLite unique constraint failures to [`UniqueViolation`].
fn map_write_error(e: rusqlite::Error) -> anyhow::Error {
    if let rusqlite::Error::SqliteFailure(err, Some(msg)) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
                // "songs.original_url" -> "original_url"
                let column = columns.rsplit('.').next().unwrap_or(columns).to_string();
                return UniqueViolation { column }.into();
            }
        }
    }
    e.into()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl CatalogueStore for SqliteCatalogueStore {
    fn create_item(&self, item: &NewCatalogueItem) -> Result<CatalogueItem> {
        let conn = self.conn.lock().unwrap();
        let timestamp = now();
        conn.execute(
            r#"
            INSERT INTO songs (
                title, artist, album, duration, original_url, file_path,
                thumbnail_url, status, error_message, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?9)
            "#,
            params![
                item.title,
                item.artist,
                item.album,
                item.duration_seconds,
                item.external_source,
                item.file_path,
                item.thumbnail_url,
                item.status.as_str(),
                timestamp,
            ],
        )
        .map_err(map_write_error)?;

        let id = conn.last_insert_rowid();
        Self::query_one(&conn, "id = ?1", id)?
            .with_context(|| format!("Catalogue item {} vanished after insert", id))
    }

    fn get_item(&self, id: i64) -> Result<Option<CatalogueItem>> {
        let conn = self.conn.lock().unwrap();
        Self::query_one(&conn, "id = ?1", id)
    }

    fn find_by_external_source(&self, url: &str) -> Result<Option<CatalogueItem>> {
        let conn = self.conn.lock().unwrap();
        Self::query_one(&conn, "original_url = ?1", url)
    }

    fn update_item(&self, item: &CatalogueItem) -> Result<()> {
        let error_message = item
            .error_message
            .as_deref()
            .map(|m| truncate_message(m, ERROR_MESSAGE_MAX_LEN));
        if item.status == DownloadStatus::Error
            && error_message.as_deref().map_or(true, |m| m.trim().is_empty())
        {
            bail!("Catalogue item {} cannot be ERROR without a message", item.id);
        }
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                r#"
                UPDATE songs SET
                    title = ?2, artist = ?3, album = ?4, duration = ?5,
                    original_url = ?6, file_path = ?7, thumbnail_url = ?8,
                    status = ?9, error_message = ?10, updated_at = ?11
                WHERE id = ?1
                "#,
                params![
                    item.id,
                    item.title,
                    item.artist,
                    item.album,
                    item.duration_seconds,
                    item.external_source,
                    item.file_path,
                    item.thumbnail_url,
                    item.status.as_str(),
                    error_message,
                    now(),
                ],
            )
            .map_err(map_write_error)?;
        if changed == 0 {
            bail!("Catalogue item {} not found", item.id);
        }
        Ok(())
    }

    fn delete_item(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM songs WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn list_items(&self) -> Result<Vec<CatalogueItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM songs ORDER BY artist ASC, title ASC",
            SELECT_COLUMNS
        ))?;
        let items = stmt
            .query_map([], Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn list_by_status(&self, statuses: &[DownloadStatus]) -> Result<Vec<CatalogueItem>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM songs WHERE status IN ({}) ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS, placeholders
        ))?;
        let items = stmt
            .query_map(
                params_from_iter(statuses.iter().map(|s| s.as_str())),
                Self::row_to_item,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn readmit(&self, item: &CatalogueItem) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                &format!(
                    r#"
                    UPDATE songs SET
                        title = ?2, artist = ?3, album = ?4, duration = ?5,
                        thumbnail_url = ?6, status = 'pending', error_message = NULL,
                        updated_at = ?7
                    WHERE id = ?1 AND status NOT IN {}
                    "#,
                    BUSY_STATUSES_SQL
                ),
                params![
                    item.id,
                    item.title,
                    item.artist,
                    item.album,
                    item.duration_seconds,
                    item.thumbnail_url,
                    now(),
                ],
            )
            .map_err(map_write_error)?;
        Ok(changed > 0)
    }

    fn claim_for_download(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            &format!(
                "UPDATE songs SET status = 'downloading', updated_at = ?2 \
                 WHERE id = ?1 AND status NOT IN {}",
                BUSY_STATUSES_SQL
            ),
            params![id, now()],
        )?;
        Ok(changed > 0)
    }

    fn mark_complete(&self, id: i64, file_path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE songs SET status = 'complete', file_path = ?2, error_message = NULL, \
                 updated_at = ?3 WHERE id = ?1",
                params![id, file_path, now()],
            )
            .map_err(map_write_error)?;
        if changed == 0 {
            bail!("Catalogue item {} not found", id);
        }
        Ok(())
    }

    fn mark_failed(&self, id: i64, error_message: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE songs SET status = 'error', error_message = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id,
                truncate_message(error_message, ERROR_MESSAGE_MAX_LEN),
                now()
            ],
        )?;
        if changed == 0 {
            bail!("Catalogue item {} not found", id);
        }
        Ok(())
    }

    fn mark_failed_unless_busy(&self, id: i64, error_message: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            &format!(
                "UPDATE songs SET status = 'error', error_message = ?2, updated_at = ?3 \
                 WHERE id = ?1 AND status NOT IN {}",
                BUSY_STATUSES_SQL
            ),
            params![
                id,
                truncate_message(error_message, ERROR_MESSAGE_MAX_LEN),
                now()
            ],
        )?;
        Ok(changed > 0)
    }

    fn fail_unfinished(&self, error_message: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE songs SET status = 'error', error_message = ?1, updated_at = ?2 \
             WHERE status IN ('pending', 'downloading')",
            params![truncate_message(error_message, ERROR_MESSAGE_MAX_LEN), now()],
        )?;
        Ok(changed)
    }
}
