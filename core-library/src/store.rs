//! # Persisted Entry Store
//!
//! Local source of truth for progress. Entries live in an in-memory index
//! guarded by an async mutex and are written through to an
//! [`EntryRepository`] one record per mutation. The lock is held across each
//! read-modify-write so concurrent callers never interleave inside one
//! operation.
//!
//! ## Merge policy
//!
//! - Progress (and volume progress) only ever increases
//! - Reaching a known total forces `Completed` unless the caller overrides the
//!   status explicitly
//! - Every progress or status write re-arms `SyncState::Unsynced`
//!
//! ## Example
//!
//! ```rust,ignore
//! let store = EntryStore::open(repository, clock).await;
//! let entry = store
//!     .upsert_progress(&EntryId::remote(21), ProgressPatch::progress(12).with_total(12))
//!     .await?;
//! assert_eq!(entry.status, ListStatus::Completed);
//! ```

use crate::error::{LibraryError, Result};
use crate::models::{
    CachedMetadata, EntryId, LinkRequest, ListStatus, MediaKind, ProgressEntry, ProgressPatch,
    RemoteSnapshot, SyncState,
};
use crate::repositories::EntryRepository;
use bridge_traits::time::Clock;
use core_async::sync::Mutex;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct EntryStore {
    entries: Mutex<BTreeMap<EntryId, ProgressEntry>>,
    repository: Arc<dyn EntryRepository>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl EntryStore {
    /// Load the store from `repository`.
    ///
    /// Never fails: a repository that cannot be read yields an empty store.
    /// Entries persisted mid-sync are normalized back to `Unsynced`.
    pub async fn open(repository: Arc<dyn EntryRepository>, clock: Arc<dyn Clock>) -> Self {
        let loaded = match repository.load_all().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to load progress entries, starting empty");
                Vec::new()
            }
        };

        let entries: BTreeMap<_, _> = loaded
            .into_iter()
            .map(|entry| (entry.id.clone(), normalize_loaded(entry)))
            .collect();

        info!(count = entries.len(), "Entry store opened");

        Self {
            entries: Mutex::new(entries),
            repository,
            clock,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn publish(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Library(event));
        }
    }

    /// Apply `change` to the entry under `id` and persist it.
    ///
    /// Returns the updated entry, or `None` when the id is unknown or
    /// `change` reported no modification.
    async fn modify<F>(&self, id: &EntryId, change: F) -> Result<Option<ProgressEntry>>
    where
        F: FnOnce(&mut ProgressEntry) -> bool + Send,
    {
        let mut entries = self.entries.lock().await;
        let Some(current) = entries.get(id) else {
            return Ok(None);
        };

        let mut updated = current.clone();
        if !change(&mut updated) {
            return Ok(None);
        }

        self.repository.save(&updated).await?;
        entries.insert(id.clone(), updated.clone());
        Ok(Some(updated))
    }

    // -------------------------------------------------------------------------
    // Progress & status
    // -------------------------------------------------------------------------

    /// Record local progress, creating the entry if needed.
    #[instrument(skip(self, patch), fields(entry_id = %id, progress = patch.progress))]
    pub async fn upsert_progress(&self, id: &EntryId, patch: ProgressPatch) -> Result<ProgressEntry> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;

        let mut entry = match entries.get(id) {
            Some(existing) => existing.clone(),
            None => {
                let title = patch
                    .title
                    .clone()
                    .unwrap_or_else(|| id.to_string());
                let mut entry = ProgressEntry::new(
                    id.clone(),
                    title,
                    patch.media_kind.unwrap_or_default(),
                    now,
                );
                if patch.progress > 0 {
                    entry.status = ListStatus::Current;
                }
                entry
            }
        };

        if patch.progress < entry.progress {
            debug!(
                stored = entry.progress,
                requested = patch.progress,
                "Ignoring progress regression"
            );
        }
        entry.progress = entry.progress.max(patch.progress);
        entry.progress_volumes = entry.progress_volumes.max(patch.progress_volumes);

        if let Some(title) = patch.title.filter(|t| !t.trim().is_empty()) {
            entry.title = title;
        }
        if let Some(media_kind) = patch.media_kind {
            entry.media_kind = media_kind;
        }
        if patch.total.is_some() {
            entry.total = patch.total;
        }
        if patch.total_volumes.is_some() {
            entry.total_volumes = patch.total_volumes;
        }
        if entry.provenance.is_none() {
            entry.provenance = patch.provenance;
        }

        match patch.status {
            Some(status) => entry.status = status,
            None => entry.derive_status(),
        }
        entry.touch(now);

        self.repository.save(&entry).await?;
        entries.insert(id.clone(), entry.clone());
        drop(entries);

        self.publish(LibraryEvent::EntryUpdated {
            entry_id: id.to_string(),
            progress: entry.progress,
            status: entry.status.to_string(),
        });
        Ok(entry)
    }

    /// Explicit status override. Unknown ids are a no-op.
    pub async fn set_status(&self, id: &EntryId, status: ListStatus) -> Result<Option<ProgressEntry>> {
        let now = self.clock.now();
        let updated = self
            .modify(id, |entry| {
                entry.status = status;
                entry.touch(now);
                true
            })
            .await?;

        if let Some(entry) = &updated {
            self.publish(LibraryEvent::EntryUpdated {
                entry_id: id.to_string(),
                progress: entry.progress,
                status: entry.status.to_string(),
            });
        }
        Ok(updated)
    }

    // -------------------------------------------------------------------------
    // Remote binding
    // -------------------------------------------------------------------------

    /// Bind the entry produced by a source to its remote tracker id.
    ///
    /// A source-keyed entry is re-keyed under the remote id and its old key
    /// removed; an entry already stored under the remote id absorbs it. If
    /// neither exists a fresh library entry is created.
    ///
    /// # Errors
    /// [`LibraryError::RemoteIdConflict`] when the source entry is already
    /// bound to a different remote id.
    #[instrument(skip(self, request), fields(remote_id = request.remote_id, source_id = %request.source_id))]
    pub async fn link_remote_id(&self, request: LinkRequest) -> Result<ProgressEntry> {
        let now = self.clock.now();
        let remote_key = EntryId::remote(request.remote_id);
        let mut entries = self.entries.lock().await;

        let source_entry = entries
            .values()
            .find(|e| {
                e.id != remote_key
                    && e.provenance
                        .as_ref()
                        .is_some_and(|p| p.matches(&request.source_id, &request.source_media_id))
            })
            .cloned();

        if let Some(source) = &source_entry {
            if let Some(bound) = source.remote_id.filter(|bound| *bound != request.remote_id) {
                return Err(LibraryError::RemoteIdConflict {
                    id: source.id.to_string(),
                    bound,
                    requested: request.remote_id,
                });
            }
        }

        let existing = entries.get(&remote_key).cloned();
        let existing_progress = existing.as_ref().map(|e| e.progress).unwrap_or(0);
        let carries_local_progress = source_entry
            .as_ref()
            .is_some_and(|s| s.progress > existing_progress);
        let previous_id = source_entry.as_ref().map(|s| s.id.clone());

        let mut merged = match (existing, source_entry) {
            (Some(remote), Some(source)) => consolidate(remote, source),
            (Some(remote), None) => remote,
            (None, Some(source)) => source,
            (None, None) => {
                ProgressEntry::new(remote_key.clone(), &request.title, request.media_kind, now)
            }
        };

        merged.id = remote_key.clone();
        merged.remote_id = Some(request.remote_id);
        merged.media_kind = request.media_kind;
        merged.in_library = true;
        if merged.provenance.is_none() {
            merged.provenance = Some(request.provenance());
        }
        if !request.title.trim().is_empty() {
            merged.title = request.title.clone();
        }
        if let Some(cover_url) = request.cover_url {
            let metadata = merged
                .metadata
                .get_or_insert_with(|| CachedMetadata::new(now));
            metadata.cover_url = Some(cover_url);
        }
        if request.total.is_some() {
            merged.total = request.total;
        }
        if request.total_volumes.is_some() {
            merged.total_volumes = request.total_volumes;
        }
        merged.derive_status();
        if carries_local_progress {
            merged.sync_state = SyncState::Unsynced;
            merged.last_sync_error = None;
        }

        self.repository.save(&merged).await?;
        if let Some(old_key) = &previous_id {
            self.repository.delete(old_key).await?;
            entries.remove(old_key);
        }
        entries.insert(remote_key.clone(), merged.clone());
        drop(entries);

        info!(
            entry_id = %remote_key,
            previous_id = ?previous_id.as_ref().map(|id| id.as_str()),
            progress = merged.progress,
            "Entry linked to remote id"
        );
        self.publish(LibraryEvent::EntryLinked {
            entry_id: remote_key.to_string(),
            remote_id: request.remote_id,
            previous_id: previous_id.map(|id| id.to_string()),
        });
        Ok(merged)
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub async fn get(&self, id: &EntryId) -> Option<ProgressEntry> {
        self.entries.lock().await.get(id).cloned()
    }

    pub async fn get_by_remote_id(&self, remote_id: u64) -> Option<ProgressEntry> {
        let entries = self.entries.lock().await;
        entries
            .get(&EntryId::remote(remote_id))
            .or_else(|| entries.values().find(|e| e.remote_id == Some(remote_id)))
            .cloned()
    }

    pub async fn get_by_source(&self, source_id: &str, source_media_id: &str) -> Option<ProgressEntry> {
        self.entries
            .lock()
            .await
            .values()
            .find(|e| {
                e.provenance
                    .as_ref()
                    .is_some_and(|p| p.matches(source_id, source_media_id))
            })
            .cloned()
    }

    pub async fn list(&self) -> Vec<ProgressEntry> {
        self.entries.lock().await.values().cloned().collect()
    }

    /// Library members, most recently active first.
    pub async fn library(&self) -> Vec<ProgressEntry> {
        let mut members: Vec<_> = self
            .entries
            .lock()
            .await
            .values()
            .filter(|e| e.in_library)
            .cloned()
            .collect();
        members.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        members
    }

    /// Remote-bound entries whose latest local state has not been confirmed.
    pub async fn pending_sync(&self) -> Vec<ProgressEntry> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.is_pending_sync())
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    // -------------------------------------------------------------------------
    // Library membership
    // -------------------------------------------------------------------------

    /// Add to the library, creating the entry if it does not exist.
    pub async fn add_to_library(
        &self,
        id: &EntryId,
        title: &str,
        media_kind: MediaKind,
    ) -> Result<ProgressEntry> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;

        let mut entry = entries
            .get(id)
            .cloned()
            .unwrap_or_else(|| ProgressEntry::new(id.clone(), title, media_kind, now));
        if entry.in_library {
            return Ok(entry);
        }
        entry.in_library = true;

        self.repository.save(&entry).await?;
        entries.insert(id.clone(), entry.clone());
        drop(entries);

        self.publish(LibraryEvent::MembershipChanged {
            entry_id: id.to_string(),
            in_library: true,
        });
        Ok(entry)
    }

    /// Remove from the library, keeping progress history. Returns whether
    /// membership changed.
    pub async fn remove_from_library(&self, id: &EntryId) -> Result<bool> {
        let changed = self
            .modify(id, |entry| std::mem::replace(&mut entry.in_library, false))
            .await?
            .is_some();

        if changed {
            self.publish(LibraryEvent::MembershipChanged {
                entry_id: id.to_string(),
                in_library: false,
            });
        }
        Ok(changed)
    }

    // -------------------------------------------------------------------------
    // Set-valued fields
    // -------------------------------------------------------------------------

    pub async fn add_category(&self, id: &EntryId, category_id: &str) -> Result<bool> {
        let category_id = category_id.to_string();
        Ok(self
            .modify(id, |entry| entry.categories.insert(category_id))
            .await?
            .is_some())
    }

    pub async fn remove_category(&self, id: &EntryId, category_id: &str) -> Result<bool> {
        Ok(self
            .modify(id, |entry| entry.categories.remove(category_id))
            .await?
            .is_some())
    }

    /// Drop `category_id` from every entry. Returns how many entries changed.
    pub async fn remove_category_everywhere(&self, category_id: &str) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let mut changed = 0;

        for entry in entries.values_mut() {
            if !entry.categories.contains(category_id) {
                continue;
            }
            let mut updated = entry.clone();
            updated.categories.remove(category_id);
            self.repository.save(&updated).await?;
            *entry = updated;
            changed += 1;
        }

        Ok(changed)
    }

    pub async fn add_bookmark(&self, id: &EntryId, unit_id: &str) -> Result<bool> {
        let unit_id = unit_id.to_string();
        Ok(self
            .modify(id, |entry| entry.bookmarks.insert(unit_id))
            .await?
            .is_some())
    }

    pub async fn remove_bookmark(&self, id: &EntryId, unit_id: &str) -> Result<bool> {
        Ok(self
            .modify(id, |entry| entry.bookmarks.remove(unit_id))
            .await?
            .is_some())
    }

    /// Flip a bookmark. Returns the new state, or `None` for an unknown id.
    pub async fn toggle_bookmark(&self, id: &EntryId, unit_id: &str) -> Result<Option<bool>> {
        let updated = self
            .modify(id, |entry| {
                if !entry.bookmarks.remove(unit_id) {
                    entry.bookmarks.insert(unit_id.to_string());
                }
                true
            })
            .await?;

        Ok(updated.map(|entry| entry.bookmarks.contains(unit_id)))
    }

    pub async fn add_download(&self, id: &EntryId, unit_id: &str) -> Result<bool> {
        let unit_id = unit_id.to_string();
        Ok(self
            .modify(id, |entry| entry.downloads.insert(unit_id))
            .await?
            .is_some())
    }

    pub async fn remove_download(&self, id: &EntryId, unit_id: &str) -> Result<bool> {
        Ok(self
            .modify(id, |entry| entry.downloads.remove(unit_id))
            .await?
            .is_some())
    }

    /// Cache display metadata; an older snapshot never replaces a newer one.
    pub async fn cache_metadata(&self, id: &EntryId, metadata: CachedMetadata) -> Result<bool> {
        Ok(self
            .modify(id, |entry| match &entry.metadata {
                Some(current) if current.fetched_at > metadata.fetched_at => false,
                _ => {
                    entry.metadata = Some(metadata);
                    true
                }
            })
            .await?
            .is_some())
    }

    // -------------------------------------------------------------------------
    // Sync state
    // -------------------------------------------------------------------------

    /// Mark a remote write as in flight and return the state being written.
    pub async fn begin_sync(&self, id: &EntryId) -> Result<Option<ProgressEntry>> {
        self.modify(id, |entry| {
            entry.sync_state = SyncState::Syncing;
            true
        })
        .await
    }

    /// Complete an in-flight write.
    ///
    /// Only an entry still in `Syncing` is completed; a local mutation that
    /// landed meanwhile keeps it `Unsynced`.
    pub async fn mark_synced(&self, id: &EntryId) -> Result<bool> {
        Ok(self
            .modify(id, |entry| {
                if entry.sync_state != SyncState::Syncing {
                    return false;
                }
                entry.sync_state = SyncState::Synced;
                entry.last_sync_error = None;
                true
            })
            .await?
            .is_some())
    }

    /// Record a failed (retryable) attempt: the entry stays pending.
    pub async fn mark_sync_attempt(&self, id: &EntryId) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .modify(id, |entry| {
                entry.sync_state = SyncState::Unsynced;
                entry.last_sync_attempt_at = Some(now);
                true
            })
            .await?
            .is_some())
    }

    /// Record a fatal rejection of an in-flight write. No automatic retry
    /// follows.
    ///
    /// Like [`mark_synced`](Self::mark_synced), only an entry still in
    /// `Syncing` is touched: a local mutation made during the write stays
    /// `Unsynced` and is pushed on its own.
    pub async fn mark_sync_error(&self, id: &EntryId, message: &str) -> Result<bool> {
        let now = self.clock.now();
        let message = message.to_string();
        Ok(self
            .modify(id, |entry| {
                if entry.sync_state != SyncState::Syncing {
                    return false;
                }
                entry.sync_state = SyncState::Error;
                entry.last_sync_attempt_at = Some(now);
                entry.last_sync_error = Some(message);
                true
            })
            .await?
            .is_some())
    }

    /// Merge progress read back from the remote.
    ///
    /// Local progress never decreases. The entry is `Synced` when local and
    /// remote agree afterwards, otherwise `Unsynced` so the local state is
    /// pushed.
    pub async fn apply_remote_snapshot(
        &self,
        id: &EntryId,
        snapshot: RemoteSnapshot,
    ) -> Result<Option<ProgressEntry>> {
        self.modify(id, |entry| {
            let remote_ahead = snapshot.progress >= entry.progress;
            entry.progress = entry.progress.max(snapshot.progress);
            entry.progress_volumes = entry.progress_volumes.max(snapshot.progress_volumes);

            if let Some(status) = snapshot.status.filter(|_| remote_ahead) {
                entry.status = status;
            }
            entry.derive_status();

            let volumes_match = snapshot.progress_volumes.is_none()
                || entry.progress_volumes == snapshot.progress_volumes;
            if entry.progress == snapshot.progress && volumes_match {
                entry.sync_state = SyncState::Synced;
                entry.last_sync_error = None;
            } else {
                entry.sync_state = SyncState::Unsynced;
            }
            true
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Delete, import & export
    // -------------------------------------------------------------------------

    pub async fn delete(&self, id: &EntryId) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(id) {
            return Ok(false);
        }

        self.repository.delete(id).await?;
        entries.remove(id);
        drop(entries);

        self.publish(LibraryEvent::EntryRemoved {
            entry_id: id.to_string(),
        });
        Ok(true)
    }

    /// Serialize every entry as an `id -> entry` JSON document.
    pub async fn export_document(&self) -> Result<String> {
        let entries = self.entries.lock().await;
        let document: BTreeMap<&str, &ProgressEntry> =
            entries.iter().map(|(id, entry)| (id.as_str(), entry)).collect();
        Ok(serde_json::to_string(&document)?)
    }

    /// Replace the store with the contents of an exported document.
    ///
    /// The document is parsed in full before anything is written; malformed
    /// input is an error and the current entries are kept. Returns the number
    /// of entries imported.
    pub async fn import_document(&self, json: &str) -> Result<usize> {
        let document: BTreeMap<String, ProgressEntry> = serde_json::from_str(json).map_err(|e| {
            warn!(error = %e, "Rejected malformed entry document");
            LibraryError::Serialization(e)
        })?;
        let imported: BTreeMap<EntryId, ProgressEntry> = document
            .into_values()
            .map(|entry| (entry.id.clone(), normalize_loaded(entry)))
            .collect();

        let mut entries = self.entries.lock().await;
        let records: Vec<_> = imported.values().cloned().collect();
        self.repository.replace_all(&records).await?;
        *entries = imported;

        info!(count = entries.len(), "Imported entry document");
        Ok(entries.len())
    }
}

fn normalize_loaded(mut entry: ProgressEntry) -> ProgressEntry {
    if entry.sync_state == SyncState::Syncing {
        entry.sync_state = SyncState::Unsynced;
    }
    entry
}

/// Fold `other` into `primary`: progress by maximum, sets by union, scalar
/// fields from whichever saw activity last.
fn consolidate(mut primary: ProgressEntry, other: ProgressEntry) -> ProgressEntry {
    let other_newer = other.last_activity_at > primary.last_activity_at;

    primary.progress = primary.progress.max(other.progress);
    primary.progress_volumes = primary.progress_volumes.max(other.progress_volumes);
    if other_newer {
        primary.status = other.status;
        primary.title = other.title;
        primary.total = other.total.or(primary.total);
        primary.total_volumes = other.total_volumes.or(primary.total_volumes);
    } else {
        primary.total = primary.total.or(other.total);
        primary.total_volumes = primary.total_volumes.or(other.total_volumes);
    }

    primary.last_activity_at = primary.last_activity_at.max(other.last_activity_at);
    primary.created_at = primary.created_at.min(other.created_at);
    primary.last_sync_attempt_at = primary.last_sync_attempt_at.max(other.last_sync_attempt_at);
    primary.in_library |= other.in_library;
    primary.provenance = primary.provenance.or(other.provenance);
    primary.categories.extend(other.categories);
    primary.bookmarks.extend(other.bookmarks);
    primary.downloads.extend(other.downloads);
    primary.metadata = match (primary.metadata, other.metadata) {
        (Some(a), Some(b)) => Some(if b.fetched_at > a.fetched_at { b } else { a }),
        (a, b) => a.or(b),
    };
    primary
}
