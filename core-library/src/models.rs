//! Domain models for the progress library
//!
//! Entries are keyed either by the remote tracker id (`"21"`) or, before a
//! remote id is known, by the source that produced them (`"mangadex:abc"`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ID Types
// =============================================================================

/// Local identifier of a [`ProgressEntry`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Key for an entry bound to a remote tracker id.
    ///
    /// ```
    /// use core_library::models::EntryId;
    ///
    /// assert_eq!(EntryId::remote(21).as_str(), "21");
    /// assert_eq!(EntryId::remote(21).remote_id(), Some(21));
    /// ```
    pub fn remote(remote_id: u64) -> Self {
        Self(remote_id.to_string())
    }

    /// Composite key `"{source_id}:{source_media_id}"` for an entry that has
    /// not been linked yet.
    pub fn source(source_id: &str, source_media_id: &str) -> Self {
        Self(format!("{}:{}", source_id, source_media_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The remote id encoded in a remote-keyed id.
    pub fn remote_id(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// The provenance encoded in a source-keyed id.
    pub fn provenance(&self) -> Option<Provenance> {
        let (source_id, source_media_id) = self.0.split_once(':')?;
        if source_id.is_empty() || source_media_id.is_empty() {
            return None;
        }
        Some(Provenance::new(source_id, source_media_id))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Anime,
    Manga,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Anime => "ANIME",
            MediaKind::Manga => "MANGA",
        }
    }
}

impl Default for MediaKind {
    fn default() -> Self {
        MediaKind::Anime
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ANIME" => Ok(MediaKind::Anime),
            "MANGA" => Ok(MediaKind::Manga),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

/// List status as understood by the remote tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListStatus {
    Planning,
    Current,
    Paused,
    Dropped,
    Completed,
    Repeating,
}

impl ListStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListStatus::Planning => "PLANNING",
            ListStatus::Current => "CURRENT",
            ListStatus::Paused => "PAUSED",
            ListStatus::Dropped => "DROPPED",
            ListStatus::Completed => "COMPLETED",
            ListStatus::Repeating => "REPEATING",
        }
    }
}

impl FromStr for ListStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLANNING" => Ok(ListStatus::Planning),
            "CURRENT" => Ok(ListStatus::Current),
            "PAUSED" => Ok(ListStatus::Paused),
            "DROPPED" => Ok(ListStatus::Dropped),
            "COMPLETED" => Ok(ListStatus::Completed),
            "REPEATING" => Ok(ListStatus::Repeating),
            other => Err(format!("unknown list status '{}'", other)),
        }
    }
}

impl fmt::Display for ListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote sync state of an entry.
///
/// `Unsynced -> Syncing -> {Synced, Error}`; a local mutation re-arms
/// `Unsynced`, a transient failure returns `Syncing -> Unsynced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Unsynced,
    Syncing,
    Synced,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Unsynced => "unsynced",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Error => "error",
        }
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsynced" => Ok(SyncState::Unsynced),
            "syncing" => Ok(SyncState::Syncing),
            "synced" => Ok(SyncState::Synced),
            "error" => Ok(SyncState::Error),
            other => Err(format!("unknown sync state '{}'", other)),
        }
    }
}

// =============================================================================
// Value Types
// =============================================================================

/// Where an entry was first seen (a source extension and its media id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub source_id: String,
    pub source_media_id: String,
}

impl Provenance {
    pub fn new(source_id: impl Into<String>, source_media_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_media_id: source_media_id.into(),
        }
    }

    pub fn matches(&self, source_id: &str, source_media_id: &str) -> bool {
        self.source_id == source_id && self.source_media_id == source_media_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedMetadata {
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self {
            description: None,
            genres: Vec::new(),
            author: None,
            cover_url: None,
            fetched_at,
        }
    }
}

// =============================================================================
// Progress Entry
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub id: EntryId,
    pub title: String,
    #[serde(default)]
    pub media_kind: MediaKind,
    #[serde(default)]
    pub remote_id: Option<u64>,
    /// Episodes watched or chapters read
    pub progress: u32,
    #[serde(default)]
    pub progress_volumes: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub total_volumes: Option<u32>,
    pub status: ListStatus,
    pub last_activity_at: DateTime<Utc>,
    pub sync_state: SyncState,
    #[serde(default)]
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sync_error: Option<String>,
    #[serde(default)]
    pub provenance: Option<Provenance>,
    #[serde(default)]
    pub in_library: bool,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub bookmarks: BTreeSet<String>,
    #[serde(default)]
    pub downloads: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Option<CachedMetadata>,
    pub created_at: DateTime<Utc>,
}

impl ProgressEntry {
    /// Blank entry for `id`. A remote or provenance key encoded in the id is
    /// carried over.
    pub fn new(id: EntryId, title: impl Into<String>, media_kind: MediaKind, now: DateTime<Utc>) -> Self {
        let remote_id = id.remote_id();
        let provenance = id.provenance();
        Self {
            id,
            title: title.into(),
            media_kind,
            remote_id,
            progress: 0,
            progress_volumes: None,
            total: None,
            total_volumes: None,
            status: ListStatus::Planning,
            last_activity_at: now,
            sync_state: SyncState::Unsynced,
            last_sync_attempt_at: None,
            last_sync_error: None,
            provenance,
            in_library: false,
            categories: BTreeSet::new(),
            bookmarks: BTreeSet::new(),
            downloads: BTreeSet::new(),
            metadata: None,
            created_at: now,
        }
    }

    /// `Completed` when the known total has been reached.
    ///
    /// A total of zero is treated as unknown.
    pub fn reached_total(&self) -> bool {
        matches!(self.total, Some(total) if total > 0 && self.progress >= total)
    }

    /// Apply the completion rule; other statuses are left as they are.
    pub fn derive_status(&mut self) {
        if self.reached_total() {
            self.status = ListStatus::Completed;
        }
    }

    /// Re-arm sync after a local mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
        self.sync_state = SyncState::Unsynced;
        self.last_sync_error = None;
    }

    pub fn is_pending_sync(&self) -> bool {
        self.remote_id.is_some() && self.sync_state == SyncState::Unsynced
    }
}

/// Local progress write.
///
/// Only `progress` is required; every other field is applied when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressPatch {
    pub progress: u32,
    pub progress_volumes: Option<u32>,
    pub title: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub total: Option<u32>,
    pub total_volumes: Option<u32>,
    /// Explicit override; disables the completion rule for this write
    pub status: Option<ListStatus>,
    pub provenance: Option<Provenance>,
}

impl ProgressPatch {
    pub fn progress(progress: u32) -> Self {
        Self {
            progress,
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_media_kind(mut self, media_kind: MediaKind) -> Self {
        self.media_kind = Some(media_kind);
        self
    }

    pub fn with_volumes(mut self, volumes: u32) -> Self {
        self.progress_volumes = Some(volumes);
        self
    }

    pub fn with_total(mut self, total: u32) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_total_volumes(mut self, total_volumes: u32) -> Self {
        self.total_volumes = Some(total_volumes);
        self
    }

    pub fn with_status(mut self, status: ListStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

/// Binding of a source entry to its remote tracker record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub source_id: String,
    pub source_media_id: String,
    pub remote_id: u64,
    pub media_kind: MediaKind,
    pub title: String,
    pub cover_url: Option<String>,
    pub total: Option<u32>,
    pub total_volumes: Option<u32>,
}

impl LinkRequest {
    pub fn new(
        source_id: impl Into<String>,
        source_media_id: impl Into<String>,
        remote_id: u64,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_media_id: source_media_id.into(),
            remote_id,
            media_kind: MediaKind::default(),
            title: title.into(),
            cover_url: None,
            total: None,
            total_volumes: None,
        }
    }

    pub fn with_media_kind(mut self, media_kind: MediaKind) -> Self {
        self.media_kind = media_kind;
        self
    }

    pub fn with_cover(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    pub fn with_total(mut self, total: u32) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_total_volumes(mut self, total_volumes: u32) -> Self {
        self.total_volumes = Some(total_volumes);
        self
    }

    pub fn provenance(&self) -> Provenance {
        Provenance::new(&self.source_id, &self.source_media_id)
    }
}

/// Remote progress observed during recalibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub progress: u32,
    pub progress_volumes: Option<u32>,
    pub status: Option<ListStatus>,
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Category id cannot be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("Category name cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_entry_id_kinds() {
        let remote = EntryId::remote(100);
        assert_eq!(remote.remote_id(), Some(100));
        assert_eq!(remote.provenance(), None);

        let source = EntryId::source("mangadex", "abc-1");
        assert_eq!(source.as_str(), "mangadex:abc-1");
        assert_eq!(source.remote_id(), None);
        assert_eq!(
            source.provenance(),
            Some(Provenance::new("mangadex", "abc-1"))
        );

        assert_eq!(EntryId::from(":x").provenance(), None);
    }

    #[test]
    fn test_new_entry_takes_keys_from_id() {
        let entry = ProgressEntry::new(EntryId::remote(5), "Title", MediaKind::Manga, now());
        assert_eq!(entry.remote_id, Some(5));
        assert_eq!(entry.sync_state, SyncState::Unsynced);
        assert_eq!(entry.status, ListStatus::Planning);
    }

    #[test]
    fn test_completion_rule() {
        let mut entry = ProgressEntry::new(EntryId::remote(1), "T", MediaKind::Anime, now());
        entry.status = ListStatus::Current;
        entry.total = Some(12);

        entry.progress = 11;
        entry.derive_status();
        assert_eq!(entry.status, ListStatus::Current);

        entry.progress = 12;
        entry.derive_status();
        assert_eq!(entry.status, ListStatus::Completed);
    }

    #[test]
    fn test_zero_total_is_unknown() {
        let mut entry = ProgressEntry::new(EntryId::remote(1), "T", MediaKind::Anime, now());
        entry.status = ListStatus::Current;
        entry.total = Some(0);
        entry.progress = 3;

        entry.derive_status();
        assert_eq!(entry.status, ListStatus::Current);
    }

    #[test]
    fn test_status_strings() {
        for status in [
            ListStatus::Planning,
            ListStatus::Current,
            ListStatus::Paused,
            ListStatus::Dropped,
            ListStatus::Completed,
            ListStatus::Repeating,
        ] {
            assert_eq!(status.as_str().parse::<ListStatus>(), Ok(status));
        }
        assert!("WATCHING".parse::<ListStatus>().is_err());
    }

    #[test]
    fn test_entry_document_shape() {
        let entry = ProgressEntry::new(EntryId::remote(7), "T", MediaKind::Anime, now());
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["id"], "7");
        assert_eq!(json["syncState"], "unsynced");
        assert_eq!(json["status"], "PLANNING");
        assert_eq!(json["mediaKind"], "ANIME");
    }

    #[test]
    fn test_category_validation() {
        let category = Category {
            id: "c1".to_string(),
            name: " ".to_string(),
            sort_order: 0,
            created_at: now(),
        };
        assert!(category.validate().is_err());
    }
}
