//! Core service façade and bootstrap.
//!
//! [`TrackerService::start`] wires a validated [`CoreConfig`] into the
//! tracker: it opens persistence for the configured backend, builds the
//! AniList or MyAnimeList adapter over the injected `HttpClient`, and arms
//! the background
//! sync loop (periodic drain, reconnect drain, sign-in drain).
//!
//! Host code then goes through the service for every local write so each
//! one is pushed to the remote as soon as it lands.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::TrackerService;
//!
//! let config = CoreConfig::builder().database_path("tracker.db").build()?;
//! let tracker = TrackerService::start(config).await?;
//! tracker.sign_in("access-token").await?;
//! let change = tracker.record_progress(&id, ProgressPatch::progress(5)).await?;
//! tracker.shutdown().await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_async::sync::Mutex;
use core_auth::{Credential, CredentialStore};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::repositories::{
    CategoryRepository, DocumentCategoryRepository, DocumentEntryRepository, EntryRepository,
    SqliteCategoryRepository, SqliteEntryRepository,
};
use core_library::{
    CategoryStore, EntryId, EntryStore, LinkRequest, ListStatus, ProgressEntry, ProgressPatch,
};
use core_runtime::config::{CoreConfig, StorageBackend, TrackerKind};
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::{
    DocumentMutationQueueRepository, DrainStatus, MutationQueue, MutationQueueRepository,
    RemoteAdapter, SqliteMutationQueueRepository, SyncConfig, SyncCoordinator, SyncHandle,
    SyncOutcome,
};
use provider_anilist::AniListAdapter;
use provider_myanimelist::MyAnimeListAdapter;
use tracing::{info, instrument, warn};

const EVENT_BUS_CAPACITY: usize = 256;

/// A local write and what became of its push to the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedChange {
    /// Entry as stored after the sync attempt.
    pub entry: ProgressEntry,
    pub sync: SyncOutcome,
}

struct Persistence {
    entries: Arc<dyn EntryRepository>,
    categories: Arc<dyn CategoryRepository>,
    queue: Arc<dyn MutationQueueRepository>,
}

impl Persistence {
    async fn open(config: &CoreConfig) -> Result<Self> {
        match config.storage_backend {
            StorageBackend::Sqlite => {
                let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
                info!(path = %config.database_path.display(), "Opened SQLite persistence");
                Ok(Self {
                    entries: Arc::new(SqliteEntryRepository::new(pool.clone())),
                    categories: Arc::new(SqliteCategoryRepository::new(pool.clone())),
                    queue: Arc::new(SqliteMutationQueueRepository::new(pool)),
                })
            }
            StorageBackend::Document => {
                let settings = Arc::clone(&config.settings_store);
                info!("Using single-document persistence");
                Ok(Self {
                    entries: Arc::new(DocumentEntryRepository::new(Arc::clone(&settings))),
                    categories: Arc::new(DocumentCategoryRepository::new(Arc::clone(&settings))),
                    queue: Arc::new(DocumentMutationQueueRepository::new(settings)),
                })
            }
        }
    }
}

/// Primary façade exposed to host applications.
pub struct TrackerService {
    event_bus: EventBus,
    entries: Arc<EntryStore>,
    categories: CategoryStore,
    credentials: CredentialStore,
    coordinator: Arc<SyncCoordinator>,
    sync_handle: Mutex<Option<SyncHandle>>,
}

impl TrackerService {
    /// Boot the tracker against the service named by `config.tracker.kind`.
    ///
    /// # Errors
    /// [`CoreError::CapabilityMissing`] without an `HttpClient`; persistence
    /// failures while opening the SQLite database.
    pub async fn start(config: CoreConfig) -> Result<Self> {
        let http_client = config
            .http_client
            .clone()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "HttpClient".to_string(),
                message: "An HttpClient is required to reach the tracking service. \
                          Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient."
                    .to_string(),
            })?;

        let endpoint = config.tracker.endpoint.clone();
        let adapter: Arc<dyn RemoteAdapter> = match config.tracker.kind {
            TrackerKind::AniList => Arc::new(AniListAdapter::new(http_client).with_endpoint(endpoint)),
            TrackerKind::MyAnimeList => {
                Arc::new(MyAnimeListAdapter::new(http_client).with_api_base(endpoint))
            }
        };
        Self::start_with_remote(config, adapter).await
    }

    /// Boot the tracker against any remote adapter.
    #[instrument(skip_all, fields(backend = ?config.storage_backend))]
    pub async fn start_with_remote(
        config: CoreConfig,
        adapter: Arc<dyn RemoteAdapter>,
    ) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
        let persistence = Persistence::open(&config).await?;
        let clock = Arc::clone(&config.clock);

        let entries = Arc::new(
            EntryStore::open(persistence.entries, Arc::clone(&clock))
                .await
                .with_event_bus(event_bus.clone()),
        );
        let categories = CategoryStore::new(
            persistence.categories,
            Arc::clone(&config.settings_store),
            Arc::clone(&clock),
        )
        .with_event_bus(event_bus.clone());
        let queue = Arc::new(MutationQueue::open(persistence.queue, clock).await);
        let credentials = CredentialStore::new(
            Arc::clone(&config.secure_store),
            config.tracker.credential_key.clone(),
        )
        .with_event_bus(event_bus.clone());

        let mut coordinator = SyncCoordinator::new(
            SyncConfig::from_settings(config.sync, config.features),
            Arc::clone(&entries),
            Arc::clone(&queue),
            adapter,
            credentials.clone(),
        )
        .with_event_bus(event_bus.clone());
        if let Some(monitor) = config.network_monitor.clone() {
            coordinator = coordinator.with_network_monitor(monitor);
        }
        if let Some(sink) = config.notification_sink.clone() {
            coordinator = coordinator.with_notification_sink(sink);
        }

        let coordinator = Arc::new(coordinator);
        let handle = coordinator.start();

        info!(
            entries = entries.len().await,
            queued = queue.len().await,
            "Tracker service started"
        );

        Ok(Self {
            event_bus,
            entries,
            categories,
            credentials,
            coordinator,
            sync_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn entries(&self) -> &Arc<EntryStore> {
        &self.entries
    }

    pub fn categories(&self) -> &CategoryStore {
        &self.categories
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> core_async::sync::broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    // =========================================================================
    // Local writes
    // =========================================================================

    /// Record progress and push it.
    ///
    /// Connectivity failures come back as [`SyncOutcome::Queued`]; a remote
    /// rejection is an error even though the local write has been kept.
    pub async fn record_progress(&self, id: &EntryId, patch: ProgressPatch) -> Result<TrackedChange> {
        let entry = self.entries.upsert_progress(id, patch).await?;
        let sync = self.coordinator.sync_entry(&entry.id).await?;
        self.tracked(entry, sync).await
    }

    /// Override the list status and push it. `None` for unknown ids.
    pub async fn set_status(&self, id: &EntryId, status: ListStatus) -> Result<Option<TrackedChange>> {
        let Some(entry) = self.entries.set_status(id, status).await? else {
            return Ok(None);
        };
        let sync = self.coordinator.sync_status(&entry.id).await?;
        self.tracked(entry, sync).await.map(Some)
    }

    /// Bind a source-keyed entry to its remote id, pushing it if the linked
    /// entry carries unsynced progress. Otherwise the outcome is
    /// [`SyncOutcome::Skipped`] with the entry's current sync state.
    pub async fn link_remote_id(&self, request: LinkRequest) -> Result<TrackedChange> {
        let entry = self.entries.link_remote_id(request).await?;
        if !entry.is_pending_sync() {
            let sync = SyncOutcome::Skipped {
                state: entry.sync_state,
            };
            return Ok(TrackedChange { entry, sync });
        }
        let sync = self.coordinator.sync_entry(&entry.id).await?;
        self.tracked(entry, sync).await
    }

    /// Delete a category and drop it from every entry.
    pub async fn delete_category(&self, category_id: &str) -> Result<bool> {
        Ok(self.categories.delete(category_id, &self.entries).await?)
    }

    async fn tracked(&self, entry: ProgressEntry, sync: SyncOutcome) -> Result<TrackedChange> {
        let entry = self.entries.get(&entry.id).await.unwrap_or(entry);
        Ok(TrackedChange { entry, sync })
    }

    // =========================================================================
    // Account and sync
    // =========================================================================

    /// Store the tracking-service token. The sync loop drains on sign-in.
    pub async fn sign_in(&self, access_token: impl Into<String>) -> Result<()> {
        let credential = Credential::new(access_token)?;
        self.credentials.store(&credential).await?;
        Ok(())
    }

    /// Forget the token. Queued writes stay queued until the next sign-in.
    pub async fn sign_out(&self) -> Result<()> {
        self.credentials.clear().await?;
        Ok(())
    }

    pub async fn is_signed_in(&self) -> Result<bool> {
        Ok(self.credentials.has_credential().await?)
    }

    pub async fn recalibrate(&self, id: &EntryId) -> Result<ProgressEntry> {
        Ok(self.coordinator.recalibrate(id).await?)
    }

    pub async fn drain(&self) -> Result<DrainStatus> {
        Ok(self.coordinator.drain().await?)
    }

    pub async fn pending_mutations(&self) -> usize {
        self.coordinator.queue().len().await
    }

    /// Stop the background loop. Idempotent.
    pub async fn shutdown(&self) {
        let handle = self.sync_handle.lock().await.take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                info!("Tracker service stopped");
            }
            None => warn!("Tracker service already stopped"),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.sync_handle
            .lock()
            .await
            .as_ref()
            .is_some_and(SyncHandle::is_running)
    }
}
