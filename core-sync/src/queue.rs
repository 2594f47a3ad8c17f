//! # Mutation Queue
//!
//! Durable FIFO log of remote writes that could not be delivered yet.
//!
//! Presence in the queue means "pending"; absence means "applied or
//! abandoned". There is no per-item state machine.
//!
//! ## Drain semantics
//!
//! [`MutationQueue::drain`] walks the queue front to back, one item at a time,
//! pausing between items. Each item's processor reports a [`DrainOutcome`]:
//!
//! - `Applied`: removed, continue
//! - `Abandoned`: removed (fatal rejection), continue
//! - `Retry`: kept in place, the pass **stops**; nothing behind it is
//!   attempted, so ordering is never violated
//!
//! ## Usage
//!
//! ```ignore
//! let queue = MutationQueue::open(repository, clock).await;
//! queue.enqueue(mutation).await?;
//!
//! let report = queue
//!     .drain(Duration::from_millis(500), |item| async move {
//!         match adapter.apply(&credential, &item.mutation).await {
//!             Ok(()) => DrainOutcome::Applied,
//!             Err(_) => DrainOutcome::Retry,
//!         }
//!     })
//!     .await?;
//! ```

use crate::error::{Result, SyncError};
use crate::remote::Mutation;
use async_trait::async_trait;
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_async::sync::Mutex;
use core_library::db::{decode_timestamp, encode_timestamp};
use core_async::time::{sleep, Duration};
use serde::{Deserialize, Serialize};
use sqlx::{query, query_as, SqlitePool};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Settings key of the single-document queue.
pub const QUEUE_DOCUMENT_KEY: &str = "tracker.mutation_queue";

/// Type-safe queued mutation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MutationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    pub id: MutationId,
    pub mutation: Mutation,
    pub enqueued_at: DateTime<Utc>,
}

/// What the processor made of one queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Applied,
    Abandoned,
    Retry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub abandoned: usize,
    /// Items still queued after the pass.
    pub remaining: usize,
    /// The pass hit a `Retry` and left the rest for the next drain.
    pub stopped_early: bool,
}

// =============================================================================
// Repository
// =============================================================================

#[async_trait]
pub trait MutationQueueRepository: Send + Sync {
    /// All persisted items, oldest first.
    async fn load_all(&self) -> Result<Vec<QueuedMutation>>;

    /// Persist `item` at the back of the queue.
    async fn append(&self, item: &QueuedMutation) -> Result<()>;

    /// # Returns
    /// - `Ok(true)` if the item was removed
    /// - `Ok(false)` if it was not queued
    async fn remove(&self, id: &MutationId) -> Result<bool>;

    async fn clear(&self) -> Result<()>;
}

/// SQLite implementation; the autoincrement `seq` column fixes FIFO order.
pub struct SqliteMutationQueueRepository {
    pool: SqlitePool,
}

impl SqliteMutationQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: String,
    kind: String,
    payload: String,
    enqueued_at: i64,
}

impl TryFrom<QueueRow> for QueuedMutation {
    type Error = SyncError;

    fn try_from(row: QueueRow) -> Result<Self> {
        let id = MutationId::parse(&row.id).ok_or_else(|| {
            SyncError::Database(format!("invalid mutation id: {}", row.id))
        })?;
        let enqueued_at = decode_timestamp(row.enqueued_at);

        let mutation: Mutation = serde_json::from_str(&row.payload)?;
        if mutation.kind() != row.kind {
            warn!(mutation_id = %id, kind = %row.kind, "Queue row kind does not match payload");
        }

        Ok(QueuedMutation {
            id,
            mutation,
            enqueued_at,
        })
    }
}

#[async_trait]
impl MutationQueueRepository for SqliteMutationQueueRepository {
    async fn load_all(&self) -> Result<Vec<QueuedMutation>> {
        let rows = query_as::<_, QueueRow>(
            "SELECT id, kind, payload, enqueued_at FROM mutation_queue ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                QueuedMutation::try_from(row)
                    .map_err(|e| warn!(mutation_id = %id, error = %e, "Skipping malformed queue row"))
                    .ok()
            })
            .collect())
    }

    async fn append(&self, item: &QueuedMutation) -> Result<()> {
        query("INSERT INTO mutation_queue (id, kind, payload, enqueued_at) VALUES (?, ?, ?, ?)")
            .bind(item.id.as_str())
            .bind(item.mutation.kind())
            .bind(serde_json::to_string(&item.mutation)?)
            .bind(encode_timestamp(item.enqueued_at)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &MutationId) -> Result<bool> {
        let result = query("DELETE FROM mutation_queue WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<()> {
        query("DELETE FROM mutation_queue").execute(&self.pool).await?;
        Ok(())
    }
}

/// The whole queue as one ordered JSON array under [`QUEUE_DOCUMENT_KEY`].
pub struct DocumentMutationQueueRepository {
    settings: Arc<dyn SettingsStore>,
}

impl DocumentMutationQueueRepository {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    async fn write(&self, items: &[QueuedMutation]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.settings.set_string(QUEUE_DOCUMENT_KEY, &json).await?;
        Ok(())
    }
}

#[async_trait]
impl MutationQueueRepository for DocumentMutationQueueRepository {
    async fn load_all(&self) -> Result<Vec<QueuedMutation>> {
        let Some(json) = self.settings.get_string(QUEUE_DOCUMENT_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&json) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!(error = %e, "Malformed queue document, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn append(&self, item: &QueuedMutation) -> Result<()> {
        let mut items = self.load_all().await?;
        items.push(item.clone());
        self.write(&items).await
    }

    async fn remove(&self, id: &MutationId) -> Result<bool> {
        let mut items = self.load_all().await?;
        let before = items.len();
        items.retain(|item| &item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.write(&items).await?;
        Ok(true)
    }

    async fn clear(&self) -> Result<()> {
        self.settings.delete(QUEUE_DOCUMENT_KEY).await?;
        Ok(())
    }
}

// =============================================================================
// Queue
// =============================================================================

pub struct MutationQueue {
    items: Mutex<VecDeque<QueuedMutation>>,
    repository: Arc<dyn MutationQueueRepository>,
    clock: Arc<dyn Clock>,
}

impl MutationQueue {
    /// Load the queue from `repository`. An unreadable queue starts empty.
    pub async fn open(repository: Arc<dyn MutationQueueRepository>, clock: Arc<dyn Clock>) -> Self {
        let items = match repository.load_all().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Failed to load mutation queue, starting empty");
                Vec::new()
            }
        };

        info!(pending = items.len(), "Mutation queue opened");

        Self {
            items: Mutex::new(items.into()),
            repository,
            clock,
        }
    }

    /// Append `mutation` to the back of the queue. Never drops.
    pub async fn enqueue(&self, mutation: Mutation) -> Result<QueuedMutation> {
        let item = QueuedMutation {
            id: MutationId::new(),
            mutation,
            enqueued_at: self.clock.now(),
        };

        let mut items = self.items.lock().await;
        self.repository.append(&item).await?;
        items.push_back(item.clone());

        debug!(
            mutation_id = %item.id,
            kind = item.mutation.kind(),
            entry_id = %item.mutation.entry_id(),
            pending = items.len(),
            "Mutation enqueued"
        );
        Ok(item)
    }

    /// Replay queued items in order until one asks to be retried.
    ///
    /// The queue lock is not held while `process` runs, so enqueues made
    /// during a pass land behind the items being replayed and are picked up
    /// by the same pass.
    pub async fn drain<F, Fut>(&self, delay: Duration, mut process: F) -> Result<DrainReport>
    where
        F: FnMut(QueuedMutation) -> Fut,
        Fut: Future<Output = DrainOutcome>,
    {
        let mut report = DrainReport::default();
        let mut first = true;

        while let Some(item) = self.front().await {
            if !first && !delay.is_zero() {
                sleep(delay).await;
            }
            first = false;

            let id = item.id;
            match process(item).await {
                DrainOutcome::Applied => {
                    self.purge(&id).await?;
                    report.applied += 1;
                }
                DrainOutcome::Abandoned => {
                    self.purge(&id).await?;
                    report.abandoned += 1;
                }
                DrainOutcome::Retry => {
                    report.stopped_early = true;
                    break;
                }
            }
        }

        report.remaining = self.len().await;
        Ok(report)
    }

    async fn front(&self) -> Option<QueuedMutation> {
        self.items.lock().await.front().cloned()
    }

    /// Remove one item regardless of position.
    pub async fn purge(&self, id: &MutationId) -> Result<bool> {
        let mut items = self.items.lock().await;
        let Some(index) = items.iter().position(|item| &item.id == id) else {
            return Ok(false);
        };
        self.repository.remove(id).await?;
        items.remove(index);
        Ok(true)
    }

    pub async fn clear(&self) -> Result<()> {
        let mut items = self.items.lock().await;
        self.repository.clear().await?;
        items.clear();
        Ok(())
    }

    /// Copy of the queue, oldest first.
    pub async fn snapshot(&self) -> Vec<QueuedMutation> {
        self.items.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ProgressUpdate, StatusUpdate};
    use bridge_desktop::SqliteSettingsStore;
    use bridge_traits::time::SystemClock;
    use core_library::db::create_test_pool;
    use core_library::models::{EntryId, ListStatus, MediaKind};
    use std::sync::Mutex as StdMutex;

    fn progress(remote_id: u64, progress: u32) -> Mutation {
        Mutation::UpdateProgress(ProgressUpdate {
            entry_id: EntryId::remote(remote_id),
            remote_id,
            media_kind: MediaKind::Anime,
            progress,
            progress_volumes: None,
            status: ListStatus::Current,
        })
    }

    async fn sqlite_queue() -> (MutationQueue, Arc<SqliteMutationQueueRepository>) {
        let pool = create_test_pool().await.unwrap();
        let repo = Arc::new(SqliteMutationQueueRepository::new(pool));
        let queue = MutationQueue::open(repo.clone(), Arc::new(SystemClock)).await;
        (queue, repo)
    }

    fn remote_ids(items: &[QueuedMutation]) -> Vec<u64> {
        items.iter().map(|item| item.mutation.remote_id()).collect()
    }

    #[tokio::test]
    async fn test_failed_head_keeps_order() {
        let (queue, _) = sqlite_queue().await;
        for id in [1, 2, 3] {
            queue.enqueue(progress(id, 1)).await.unwrap();
        }

        let attempted = StdMutex::new(Vec::new());
        let report = queue
            .drain(Duration::ZERO, |item| {
                attempted.lock().unwrap().push(item.mutation.remote_id());
                async { DrainOutcome::Retry }
            })
            .await
            .unwrap();

        assert!(report.stopped_early);
        assert_eq!(report.remaining, 3);
        assert_eq!(*attempted.lock().unwrap(), vec![1]);
        assert_eq!(remote_ids(&queue.snapshot().await), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failure_mid_queue_stops_pass() {
        let (queue, repo) = sqlite_queue().await;
        for id in [1, 2, 3] {
            queue.enqueue(progress(id, 1)).await.unwrap();
        }

        let report = queue
            .drain(Duration::ZERO, |item| async move {
                if item.mutation.remote_id() == 2 {
                    DrainOutcome::Retry
                } else {
                    DrainOutcome::Applied
                }
            })
            .await
            .unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.remaining, 2);
        assert_eq!(remote_ids(&repo.load_all().await.unwrap()), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_abandoned_items_are_dropped() {
        let (queue, _) = sqlite_queue().await;
        queue.enqueue(progress(1, 1)).await.unwrap();
        queue.enqueue(progress(2, 1)).await.unwrap();

        let report = queue
            .drain(Duration::ZERO, |item| async move {
                if item.mutation.remote_id() == 1 {
                    DrainOutcome::Abandoned
                } else {
                    DrainOutcome::Applied
                }
            })
            .await
            .unwrap();

        assert_eq!(
            report,
            DrainReport {
                applied: 1,
                abandoned: 1,
                remaining: 0,
                stopped_early: false
            }
        );
        assert!(queue.is_empty().await);
    }

    /// Keeps paused-clock tests off the SQLite worker thread.
    #[derive(Default)]
    struct MemoryRepository {
        items: StdMutex<Vec<QueuedMutation>>,
    }

    #[async_trait]
    impl MutationQueueRepository for MemoryRepository {
        async fn load_all(&self) -> Result<Vec<QueuedMutation>> {
            Ok(self.items.lock().unwrap().clone())
        }

        async fn append(&self, item: &QueuedMutation) -> Result<()> {
            self.items.lock().unwrap().push(item.clone());
            Ok(())
        }

        async fn remove(&self, id: &MutationId) -> Result<bool> {
            let mut items = self.items.lock().unwrap();
            let before = items.len();
            items.retain(|item| &item.id != id);
            Ok(items.len() != before)
        }

        async fn clear(&self) -> Result<()> {
            self.items.lock().unwrap().clear();
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_items() {
        let queue =
            MutationQueue::open(Arc::new(MemoryRepository::default()), Arc::new(SystemClock)).await;
        for id in [1, 2, 3] {
            queue.enqueue(progress(id, 1)).await.unwrap();
        }

        let started = tokio::time::Instant::now();
        queue
            .drain(Duration::from_millis(500), |_| async { DrainOutcome::Applied })
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_reopen_restores_fifo() {
        let pool = create_test_pool().await.unwrap();
        let repo = Arc::new(SqliteMutationQueueRepository::new(pool));
        let queue = MutationQueue::open(repo.clone(), Arc::new(SystemClock)).await;
        queue.enqueue(progress(7, 1)).await.unwrap();
        let status = Mutation::UpdateStatus(StatusUpdate {
            entry_id: EntryId::remote(3),
            remote_id: 3,
            media_kind: MediaKind::Manga,
            status: ListStatus::Paused,
        });
        queue.enqueue(status.clone()).await.unwrap();

        let reopened = MutationQueue::open(repo, Arc::new(SystemClock)).await;
        let items = reopened.snapshot().await;
        assert_eq!(remote_ids(&items), vec![7, 3]);
        assert_eq!(items[1].mutation, status);
    }

    #[tokio::test]
    async fn test_reopen_keeps_exact_enqueue_time() {
        let (queue, repo) = sqlite_queue().await;
        let queued = queue.enqueue(progress(9, 2)).await.unwrap();

        let reopened = MutationQueue::open(repo, Arc::new(SystemClock)).await;
        assert_eq!(reopened.snapshot().await, vec![queued]);
    }

    #[tokio::test]
    async fn test_purge_and_clear() {
        let (queue, repo) = sqlite_queue().await;
        let first = queue.enqueue(progress(1, 1)).await.unwrap();
        queue.enqueue(progress(2, 1)).await.unwrap();

        assert!(queue.purge(&first.id).await.unwrap());
        assert!(!queue.purge(&first.id).await.unwrap());
        assert_eq!(queue.len().await, 1);

        queue.clear().await.unwrap();
        assert!(queue.is_empty().await);
        assert!(repo.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_backend_round_trip() {
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let repo = Arc::new(DocumentMutationQueueRepository::new(settings.clone()));
        let queue = MutationQueue::open(repo.clone(), Arc::new(SystemClock)).await;

        queue.enqueue(progress(1, 4)).await.unwrap();
        queue.enqueue(progress(2, 9)).await.unwrap();

        let reopened = MutationQueue::open(repo, Arc::new(SystemClock)).await;
        assert_eq!(reopened.snapshot().await, queue.snapshot().await);
        assert!(settings.get_string(QUEUE_DOCUMENT_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_document_loads_empty() {
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        settings.set_string(QUEUE_DOCUMENT_KEY, "[{oops").await.unwrap();

        let queue = MutationQueue::open(
            Arc::new(DocumentMutationQueueRepository::new(settings)),
            Arc::new(SystemClock),
        )
        .await;

        assert!(queue.is_empty().await);
    }
}
