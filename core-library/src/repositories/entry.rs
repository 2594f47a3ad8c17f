//! Progress entry repository trait and implementations

use crate::db::{decode_timestamp, encode_timestamp};
use crate::error::Result;
use crate::models::{CachedMetadata, EntryId, ProgressEntry, Provenance};
use async_trait::async_trait;
use bridge_traits::storage::SettingsStore;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Settings key of the single-document entry store.
pub const ENTRIES_DOCUMENT_KEY: &str = "tracker.entries";

/// Persistence for progress entries, one record per entry.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Load every entry.
    ///
    /// Malformed records are skipped (or, for the document format, the whole
    /// store loads as empty); only I/O failures are errors.
    async fn load_all(&self) -> Result<Vec<ProgressEntry>>;

    /// Insert or replace `entry`.
    async fn save(&self, entry: &ProgressEntry) -> Result<()>;

    /// Delete by id.
    ///
    /// # Returns
    /// - `Ok(true)` if an entry was deleted
    /// - `Ok(false)` if no entry had that id
    async fn delete(&self, id: &EntryId) -> Result<bool>;

    /// Replace the whole store with `entries`.
    async fn replace_all(&self, entries: &[ProgressEntry]) -> Result<()>;
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite implementation of EntryRepository
pub struct SqliteEntryRepository {
    pool: SqlitePool,
}

impl SqliteEntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    id: String,
    title: String,
    media_kind: String,
    remote_id: Option<i64>,
    progress: i64,
    progress_volumes: Option<i64>,
    total: Option<i64>,
    total_volumes: Option<i64>,
    status: String,
    sync_state: String,
    last_activity_at: i64,
    last_sync_attempt_at: Option<i64>,
    last_sync_error: Option<String>,
    source_id: Option<String>,
    source_media_id: Option<String>,
    in_library: i64,
    categories: String,
    bookmarks: String,
    downloads: String,
    metadata: Option<String>,
    created_at: i64,
}

fn to_u32(field: &str, value: i64) -> std::result::Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("{} out of range: {}", field, value))
}

fn parse_set(field: &str, json: &str) -> std::result::Result<BTreeSet<String>, String> {
    serde_json::from_str(json).map_err(|e| format!("{}: {}", field, e))
}

impl TryFrom<EntryRow> for ProgressEntry {
    type Error = String;

    fn try_from(row: EntryRow) -> std::result::Result<Self, Self::Error> {
        let provenance = match (row.source_id, row.source_media_id) {
            (Some(source_id), Some(source_media_id)) => {
                Some(Provenance::new(source_id, source_media_id))
            }
            _ => None,
        };
        let metadata = row
            .metadata
            .map(|json| serde_json::from_str::<CachedMetadata>(&json))
            .transpose()
            .map_err(|e| format!("metadata: {}", e))?;

        Ok(ProgressEntry {
            id: EntryId::new(row.id),
            title: row.title,
            media_kind: row.media_kind.parse()?,
            remote_id: row
                .remote_id
                .map(|id| u64::try_from(id).map_err(|_| format!("remote_id out of range: {}", id)))
                .transpose()?,
            progress: to_u32("progress", row.progress)?,
            progress_volumes: row
                .progress_volumes
                .map(|v| to_u32("progress_volumes", v))
                .transpose()?,
            total: row.total.map(|v| to_u32("total", v)).transpose()?,
            total_volumes: row
                .total_volumes
                .map(|v| to_u32("total_volumes", v))
                .transpose()?,
            status: row.status.parse()?,
            sync_state: row.sync_state.parse()?,
            last_activity_at: decode_timestamp(row.last_activity_at),
            last_sync_attempt_at: row.last_sync_attempt_at.map(decode_timestamp),
            last_sync_error: row.last_sync_error,
            provenance,
            in_library: row.in_library != 0,
            categories: parse_set("categories", &row.categories)?,
            bookmarks: parse_set("bookmarks", &row.bookmarks)?,
            downloads: parse_set("downloads", &row.downloads)?,
            metadata,
            created_at: decode_timestamp(row.created_at),
        })
    }
}

#[async_trait]
impl EntryRepository for SqliteEntryRepository {
    async fn load_all(&self) -> Result<Vec<ProgressEntry>> {
        let rows = query_as::<_, EntryRow>("SELECT * FROM progress_entries ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match ProgressEntry::try_from(row) {
                Ok(entry) => entries.push(entry),
                Err(reason) => warn!(entry_id = %id, reason = %reason, "Skipping malformed entry row"),
            }
        }

        debug!(count = entries.len(), "Loaded progress entries");
        Ok(entries)
    }

    async fn save(&self, entry: &ProgressEntry) -> Result<()> {
        let (source_id, source_media_id) = match &entry.provenance {
            Some(p) => (Some(p.source_id.as_str()), Some(p.source_media_id.as_str())),
            None => (None, None),
        };
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        query(
            r#"
            INSERT INTO progress_entries (
                id, title, media_kind, remote_id, progress, progress_volumes, total,
                total_volumes, status, sync_state, last_activity_at, last_sync_attempt_at,
                last_sync_error, source_id, source_media_id, in_library, categories,
                bookmarks, downloads, metadata, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                media_kind = excluded.media_kind,
                remote_id = excluded.remote_id,
                progress = excluded.progress,
                progress_volumes = excluded.progress_volumes,
                total = excluded.total,
                total_volumes = excluded.total_volumes,
                status = excluded.status,
                sync_state = excluded.sync_state,
                last_activity_at = excluded.last_activity_at,
                last_sync_attempt_at = excluded.last_sync_attempt_at,
                last_sync_error = excluded.last_sync_error,
                source_id = excluded.source_id,
                source_media_id = excluded.source_media_id,
                in_library = excluded.in_library,
                categories = excluded.categories,
                bookmarks = excluded.bookmarks,
                downloads = excluded.downloads,
                metadata = excluded.metadata
            "#,
        )
        .bind(entry.id.as_str())
        .bind(&entry.title)
        .bind(entry.media_kind.as_str())
        .bind(entry.remote_id.map(|id| id as i64))
        .bind(entry.progress as i64)
        .bind(entry.progress_volumes.map(i64::from))
        .bind(entry.total.map(i64::from))
        .bind(entry.total_volumes.map(i64::from))
        .bind(entry.status.as_str())
        .bind(entry.sync_state.as_str())
        .bind(encode_timestamp(entry.last_activity_at)?)
        .bind(entry.last_sync_attempt_at.map(encode_timestamp).transpose()?)
        .bind(&entry.last_sync_error)
        .bind(source_id)
        .bind(source_media_id)
        .bind(entry.in_library as i64)
        .bind(serde_json::to_string(&entry.categories)?)
        .bind(serde_json::to_string(&entry.bookmarks)?)
        .bind(serde_json::to_string(&entry.downloads)?)
        .bind(metadata)
        .bind(encode_timestamp(entry.created_at)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &EntryId) -> Result<bool> {
        let result = query("DELETE FROM progress_entries WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_all(&self, entries: &[ProgressEntry]) -> Result<()> {
        query("DELETE FROM progress_entries")
            .execute(&self.pool)
            .await?;
        for entry in entries {
            self.save(entry).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Single document
// =============================================================================

/// Entries as one JSON object (`id -> entry`) under [`ENTRIES_DOCUMENT_KEY`].
///
/// Every write rewrites the whole document.
pub struct DocumentEntryRepository {
    settings: Arc<dyn SettingsStore>,
}

impl DocumentEntryRepository {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    async fn read_document(&self) -> Result<BTreeMap<String, ProgressEntry>> {
        let raw = self.settings.get_string(ENTRIES_DOCUMENT_KEY).await?;
        Ok(raw.map(|json| parse_document(&json)).unwrap_or_default())
    }

    async fn write_document(&self, document: &BTreeMap<String, ProgressEntry>) -> Result<()> {
        let json = serde_json::to_string(document)?;
        self.settings.set_string(ENTRIES_DOCUMENT_KEY, &json).await?;
        Ok(())
    }
}

/// Parse an `id -> entry` document; malformed input yields an empty map.
fn parse_document(json: &str) -> BTreeMap<String, ProgressEntry> {
    match serde_json::from_str(json) {
        Ok(document) => document,
        Err(e) => {
            warn!(error = %e, "Malformed entry document, treating store as empty");
            BTreeMap::new()
        }
    }
}

#[async_trait]
impl EntryRepository for DocumentEntryRepository {
    async fn load_all(&self) -> Result<Vec<ProgressEntry>> {
        Ok(self.read_document().await?.into_values().collect())
    }

    async fn save(&self, entry: &ProgressEntry) -> Result<()> {
        let mut document = self.read_document().await?;
        document.insert(entry.id.to_string(), entry.clone());
        self.write_document(&document).await
    }

    async fn delete(&self, id: &EntryId) -> Result<bool> {
        let mut document = self.read_document().await?;
        if document.remove(id.as_str()).is_none() {
            return Ok(false);
        }
        self.write_document(&document).await?;
        Ok(true)
    }

    async fn replace_all(&self, entries: &[ProgressEntry]) -> Result<()> {
        let document = entries
            .iter()
            .map(|entry| (entry.id.to_string(), entry.clone()))
            .collect();
        self.write_document(&document).await
    }
}
