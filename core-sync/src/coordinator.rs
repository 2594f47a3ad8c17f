//! # Sync Coordinator
//!
//! Pushes local progress to the remote tracking service and replays whatever
//! could not be delivered.
//!
//! ## Overview
//!
//! The `SyncCoordinator` ties together:
//! - the [`EntryStore`], which owns sync-state bookkeeping
//! - the [`MutationQueue`], which holds undelivered writes in FIFO order
//! - a [`RemoteAdapter`], which performs the actual remote call
//! - the [`CredentialStore`], checked for presence before any attempt
//! - optional `NetworkMonitor`, `NotificationSink` and `EventBus` bridges
//!
//! ## Workflow
//!
//! ### Immediate sync
//! 1. Skip entries without a remote id
//! 2. Without a credential, or while offline, enqueue and stop
//! 3. Mark the entry `Syncing` and apply the write
//! 4. Success: mark `Synced`, notify
//! 5. Retryable failure: record the attempt and enqueue; only connectivity
//!    failures are swallowed
//! 6. Fatal failure: mark `Error`, do not enqueue
//!
//! ### Drain
//! 1. At most one pass runs at a time; a second trigger is a no-op
//! 2. Items are replayed front to back with a fixed pause between them
//! 3. Each replayed write is raised to the entry's current local state
//! 4. The first retryable failure ends the pass
//!
//! Only one remote call is ever in flight: immediate syncs, replays and
//! recalibration reads all take the same lock.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = Arc::new(SyncCoordinator::new(config, entries, queue, adapter, credentials));
//! let handle = coordinator.start();
//!
//! store.upsert_progress(&id, ProgressPatch::progress(12)).await?;
//! coordinator.sync_entry(&id).await?;
//!
//! handle.stop().await;
//! ```

use crate::error::{Result, SyncError};
use crate::queue::{DrainOutcome, DrainReport, MutationQueue, QueuedMutation};
use crate::remote::{Mutation, RemoteAdapter, RemoteError};
use bridge_traits::network::{NetworkChangeStream, NetworkInfo, NetworkMonitor};
use bridge_traits::notification::{Notification, NotificationSink};
use core_async::sync::{broadcast, Mutex};
use core_async::task::JoinHandle;
use core_async::time::{delayed_interval, Duration};
use core_async::CancellationToken;
use core_auth::{Credential, CredentialStore};
use core_library::models::{EntryId, MediaKind, ProgressEntry, RemoteSnapshot, SyncState};
use core_library::EntryStore;
use core_runtime::config::{FeatureFlags, SyncTimings};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Sync coordinator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Period of the background drain.
    pub drain_interval: Duration,

    /// Pause between two replayed items.
    pub inter_item_delay: Duration,

    /// Attempt the remote write as soon as a local mutation is reported.
    /// When off, every write goes through the queue.
    pub immediate_sync: bool,

    /// Run the periodic drain in the background loop.
    pub background_drain: bool,

    /// Consult the network monitor before remote calls and drain when it
    /// reports a reconnect.
    pub network_awareness: bool,

    /// Send a notification per confirmed write.
    pub notifications: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_settings(SyncTimings::default(), FeatureFlags::default())
    }
}

impl SyncConfig {
    pub fn from_settings(timings: SyncTimings, features: FeatureFlags) -> Self {
        Self {
            drain_interval: timings.drain_interval,
            inter_item_delay: timings.inter_item_delay,
            immediate_sync: features.enable_immediate_sync,
            background_drain: features.enable_background_drain,
            network_awareness: features.enable_network_awareness,
            notifications: features.enable_sync_notifications,
        }
    }
}

/// Result of pushing one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote confirmed the write.
    Synced,
    /// The write waits in the queue.
    Queued { reason: String },
    /// The entry has no remote id; nothing to push.
    NotLinked,
    /// Nothing was pushed because the entry had no unsynced change;
    /// `state` is where it stands.
    Skipped { state: SyncState },
}

/// Result of a drain request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    Completed(DrainReport),
    /// Another pass is running; this request did nothing.
    AlreadyRunning,
    NotAuthenticated,
    Offline,
}

pub struct SyncCoordinator {
    config: SyncConfig,
    entries: Arc<EntryStore>,
    queue: Arc<MutationQueue>,
    adapter: Arc<dyn RemoteAdapter>,
    credentials: CredentialStore,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
    event_bus: Option<EventBus>,
    drain_lock: Mutex<()>,
    remote_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        entries: Arc<EntryStore>,
        queue: Arc<MutationQueue>,
        adapter: Arc<dyn RemoteAdapter>,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            config,
            entries,
            queue,
            adapter,
            credentials,
            network_monitor: None,
            notification_sink: None,
            event_bus: None,
            drain_lock: Mutex::new(()),
            remote_lock: Mutex::new(()),
        }
    }

    pub fn with_network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    fn publish(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Sync(event));
        }
    }

    async fn credential(&self) -> Option<Credential> {
        match self.credentials.load().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Credential unavailable, deferring sync");
                None
            }
        }
    }

    async fn is_online(&self) -> bool {
        if !self.config.network_awareness {
            return true;
        }
        match &self.network_monitor {
            Some(monitor) => monitor.is_connected().await,
            None => true,
        }
    }

    // =========================================================================
    // Immediate sync
    // =========================================================================

    /// Push the entry's progress and status.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub async fn sync_entry(&self, id: &EntryId) -> Result<SyncOutcome> {
        let entry = self.require_entry(id).await?;
        match Mutation::progress_of(&entry) {
            Some(mutation) => self.push(mutation).await,
            None => Ok(SyncOutcome::NotLinked),
        }
    }

    /// Push only the entry's status.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub async fn sync_status(&self, id: &EntryId) -> Result<SyncOutcome> {
        let entry = self.require_entry(id).await?;
        match Mutation::status_of(&entry) {
            Some(mutation) => self.push(mutation).await,
            None => Ok(SyncOutcome::NotLinked),
        }
    }

    async fn require_entry(&self, id: &EntryId) -> Result<ProgressEntry> {
        self.entries
            .get(id)
            .await
            .ok_or_else(|| SyncError::EntryNotFound {
                entry_id: id.to_string(),
            })
    }

    async fn push(&self, mutation: Mutation) -> Result<SyncOutcome> {
        let id = mutation.entry_id().clone();

        if !self.config.immediate_sync {
            return self.defer(mutation, "deferred").await;
        }
        let Some(credential) = self.credential().await else {
            return self.defer(mutation, "not authenticated").await;
        };
        if !self.is_online().await {
            self.entries.mark_sync_attempt(&id).await?;
            return self.defer(mutation, "offline").await;
        }

        let _remote = self.remote_lock.lock().await;
        let Some(entry) = self.entries.begin_sync(&id).await? else {
            return Err(SyncError::EntryNotFound {
                entry_id: id.to_string(),
            });
        };
        let mutation = mutation.refreshed(&entry);

        match self.adapter.apply(&credential, &mutation).await {
            Ok(()) => {
                self.confirm(&entry, &mutation).await?;
                Ok(SyncOutcome::Synced)
            }
            Err(e) if e.is_retryable() => {
                warn!(entry_id = %id, error = %e, "Remote write failed, queueing");
                self.entries.mark_sync_attempt(&id).await?;
                let reason = e.reason();
                self.defer(mutation, &reason).await?;
                if e.is_connectivity() {
                    Ok(SyncOutcome::Queued { reason })
                } else {
                    Err(e.into())
                }
            }
            Err(e) => {
                self.reject(&id, &e).await?;
                Err(e.into())
            }
        }
    }

    async fn defer(&self, mutation: Mutation, reason: &str) -> Result<SyncOutcome> {
        let item = self.queue.enqueue(mutation).await?;
        debug!(entry_id = %item.mutation.entry_id(), reason, "Write deferred to queue");

        self.publish(SyncEvent::EntryQueued {
            entry_id: item.mutation.entry_id().to_string(),
            remote_id: item.mutation.remote_id(),
            progress: item.mutation.progress().unwrap_or_default(),
            reason: reason.to_string(),
        });
        Ok(SyncOutcome::Queued {
            reason: reason.to_string(),
        })
    }

    async fn confirm(&self, entry: &ProgressEntry, mutation: &Mutation) -> Result<()> {
        self.entries.mark_synced(&entry.id).await?;

        info!(
            entry_id = %entry.id,
            remote_id = mutation.remote_id(),
            kind = mutation.kind(),
            "Remote write confirmed"
        );
        self.publish(SyncEvent::EntrySynced {
            entry_id: entry.id.to_string(),
            remote_id: mutation.remote_id(),
            progress: mutation.progress().unwrap_or(entry.progress),
        });

        if !self.config.notifications {
            return Ok(());
        }
        if let Some(sink) = &self.notification_sink {
            if let Err(e) = sink.notify(confirmation(entry, mutation)).await {
                warn!(entry_id = %entry.id, error = %e, "Failed to deliver sync notification");
            }
        }
        Ok(())
    }

    async fn reject(&self, id: &EntryId, error: &RemoteError) -> Result<()> {
        warn!(entry_id = %id, error = %error, "Remote write rejected");
        if !self.entries.mark_sync_error(id, &error.to_string()).await? {
            debug!(entry_id = %id, "Entry changed during rejected write, leaving it pending");
        }
        self.publish(SyncEvent::EntryRejected {
            entry_id: id.to_string(),
            message: error.to_string(),
        });
        Ok(())
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Replay the queue. A request made while a pass is running returns
    /// [`DrainStatus::AlreadyRunning`] without doing anything.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainStatus> {
        let Ok(_drain) = self.drain_lock.try_lock() else {
            debug!("Drain already running");
            return Ok(DrainStatus::AlreadyRunning);
        };

        let pending = self.queue.len().await;
        if pending == 0 {
            return Ok(DrainStatus::Completed(DrainReport::default()));
        }
        let Some(credential) = self.credential().await else {
            debug!(pending, "No credential, drain postponed");
            return Ok(DrainStatus::NotAuthenticated);
        };
        if !self.is_online().await {
            debug!(pending, "Offline, drain postponed");
            return Ok(DrainStatus::Offline);
        }

        info!(pending, "Draining mutation queue");
        self.publish(SyncEvent::DrainStarted { pending });

        let credential = &credential;
        let report = self
            .queue
            .drain(self.config.inter_item_delay, move |item| self.replay(item, credential))
            .await?;

        info!(
            applied = report.applied,
            abandoned = report.abandoned,
            remaining = report.remaining,
            "Drain finished"
        );
        self.publish(SyncEvent::DrainCompleted {
            applied: report.applied,
            abandoned: report.abandoned,
            remaining: report.remaining,
        });
        Ok(DrainStatus::Completed(report))
    }

    async fn replay(&self, item: QueuedMutation, credential: &Credential) -> DrainOutcome {
        match self.try_replay(item, credential).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Replay failed locally, keeping item");
                DrainOutcome::Retry
            }
        }
    }

    async fn try_replay(&self, item: QueuedMutation, credential: &Credential) -> Result<DrainOutcome> {
        let id = item.mutation.entry_id().clone();
        let Some(current) = self.entries.get(&id).await else {
            debug!(mutation_id = %item.id, entry_id = %id, "Entry gone, dropping queued write");
            return Ok(DrainOutcome::Abandoned);
        };

        // A rejected entry waits for a new local mutation to re-arm it.
        if current.sync_state == SyncState::Error {
            debug!(mutation_id = %item.id, entry_id = %id, "Entry rejected, dropping queued write");
            return Ok(DrainOutcome::Abandoned);
        }

        let already_delivered = current.sync_state == SyncState::Synced
            && item.mutation.progress().map_or(true, |p| p <= current.progress);
        if already_delivered {
            debug!(mutation_id = %item.id, entry_id = %id, "Entry already synced, skipping");
            return Ok(DrainOutcome::Applied);
        }

        let _remote = self.remote_lock.lock().await;
        let Some(entry) = self.entries.begin_sync(&id).await? else {
            return Ok(DrainOutcome::Abandoned);
        };
        let mutation = item.mutation.refreshed(&entry);

        match self.adapter.apply(credential, &mutation).await {
            Ok(()) => {
                self.confirm(&entry, &mutation).await?;
                Ok(DrainOutcome::Applied)
            }
            Err(e) if e.is_retryable() => {
                debug!(mutation_id = %item.id, error = %e, "Replay failed, stopping pass");
                self.entries.mark_sync_attempt(&id).await?;
                Ok(DrainOutcome::Retry)
            }
            Err(e) => {
                self.reject(&id, &e).await?;
                Ok(DrainOutcome::Abandoned)
            }
        }
    }

    // =========================================================================
    // Recalibration
    // =========================================================================

    /// Reconcile one entry with the remote's current record.
    ///
    /// Local progress never goes down. If local is ahead (or the remote has
    /// no record yet) the local state is pushed.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub async fn recalibrate(&self, id: &EntryId) -> Result<ProgressEntry> {
        let entry = self.require_entry(id).await?;
        let remote_id = entry.remote_id.ok_or_else(|| SyncError::NotLinked {
            entry_id: id.to_string(),
        })?;
        let credential = self.credentials.require().await?;

        let remote = {
            let _remote = self.remote_lock.lock().await;
            self.adapter
                .fetch_entry(&credential, remote_id, entry.media_kind)
                .await?
        };

        let updated = match &remote {
            Some(remote) => self
                .entries
                .apply_remote_snapshot(
                    id,
                    RemoteSnapshot {
                        progress: remote.progress,
                        progress_volumes: remote.progress_volumes,
                        status: remote.status,
                    },
                )
                .await?
                .ok_or_else(|| SyncError::EntryNotFound {
                    entry_id: id.to_string(),
                })?,
            None => entry,
        };

        let remote_progress = remote.as_ref().map_or(0, |r| r.progress);
        info!(
            local_progress = updated.progress,
            remote_progress,
            "Entry recalibrated"
        );
        self.publish(SyncEvent::Recalibrated {
            entry_id: id.to_string(),
            local_progress: updated.progress,
            remote_progress,
        });

        if remote.is_none() || updated.sync_state == SyncState::Unsynced {
            self.sync_entry(id).await?;
        }
        self.require_entry(id).await
    }

    // =========================================================================
    // Background loop
    // =========================================================================

    /// Spawn the background loop: periodic drain, drain on reconnect and
    /// drain when a credential is stored. Also drains once at startup.
    pub fn start(self: &Arc<Self>) -> SyncHandle {
        let token = CancellationToken::new();
        let coordinator = Arc::clone(self);
        let loop_token = token.clone();

        let join = core_async::spawn(async move {
            coordinator.run(loop_token).await;
        });

        info!(
            drain_interval_ms = self.config.drain_interval.as_millis() as u64,
            "Sync loop started"
        );
        SyncHandle { token, join }
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = delayed_interval(self.config.drain_interval);
        let mut changes = self.subscribe_network().await;
        let mut auth_events = self.event_bus.as_ref().map(EventBus::subscribe);

        self.drain_logged("startup").await;

        loop {
            core_async::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick(), if self.config.background_drain => {
                    self.drain_logged("timer").await;
                }
                change = next_network_change(&mut changes) => match change {
                    Some(info) if info.status.is_reachable() => {
                        self.drain_logged("network").await;
                    }
                    Some(info) => debug!(status = ?info.status, "Network unreachable"),
                    None => {
                        debug!("Network change stream closed");
                        changes = None;
                    }
                },
                event = next_event(&mut auth_events) => match event {
                    Ok(CoreEvent::Auth(AuthEvent::CredentialStored { .. })) => {
                        self.drain_logged("credential").await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Sync loop lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => auth_events = None,
                },
            }
        }

        info!("Sync loop stopped");
    }

    async fn subscribe_network(&self) -> Option<Box<dyn NetworkChangeStream>> {
        if !self.config.network_awareness {
            return None;
        }
        let monitor = self.network_monitor.as_ref()?;
        match monitor.subscribe_changes().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "Network change subscription unavailable");
                None
            }
        }
    }

    async fn drain_logged(&self, trigger: &'static str) {
        match self.drain().await {
            Ok(status) => debug!(trigger, ?status, "Drain trigger handled"),
            Err(e) => warn!(trigger, error = %e, "Drain failed"),
        }
    }
}

async fn next_network_change(
    stream: &mut Option<Box<dyn NetworkChangeStream>>,
) -> Option<NetworkInfo> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn next_event(
    receiver: &mut Option<broadcast::Receiver<CoreEvent>>,
) -> std::result::Result<CoreEvent, broadcast::error::RecvError> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

fn confirmation(entry: &ProgressEntry, mutation: &Mutation) -> Notification {
    let body = match mutation.progress() {
        Some(progress) => {
            let unit = match entry.media_kind {
                MediaKind::Anime => "Episode",
                MediaKind::Manga => "Chapter",
            };
            format!("{}: {} {}", entry.title, unit, progress)
        }
        None => format!("{}: {}", entry.title, entry.status),
    };

    let notification = Notification::new("Progress synced", body);
    match entry.metadata.as_ref().and_then(|m| m.cover_url.clone()) {
        Some(cover) => notification.with_icon(cover),
        None => notification,
    }
}

/// Handle to the background loop started by [`SyncCoordinator::start`].
pub struct SyncHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SyncHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Stop the loop and wait for it to exit. A drain in progress finishes
    /// its current remote call first.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "Sync loop ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SqliteMutationQueueRepository;
    use crate::remote::RemoteListEntry;
    use async_trait::async_trait;
    use bridge_desktop::{ManualNetworkMonitor, MemorySecureStore};
    use bridge_traits::network::NetworkStatus;
    use bridge_traits::time::SystemClock;
    use core_library::db::create_test_pool;
    use core_library::models::{ListStatus, ProgressPatch};
    use core_library::repositories::SqliteEntryRepository;
    use mockall::mock;
    use mockall::predicate::*;

    mock! {
        Adapter {}

        #[async_trait]
        impl RemoteAdapter for Adapter {
            async fn apply(&self, credential: &Credential, mutation: &Mutation) -> std::result::Result<(), RemoteError>;
            async fn fetch_entry(
                &self,
                credential: &Credential,
                remote_id: u64,
                media_kind: MediaKind,
            ) -> std::result::Result<Option<RemoteListEntry>, RemoteError>;
        }
    }

    struct Fixture {
        entries: Arc<EntryStore>,
        queue: Arc<MutationQueue>,
        credentials: CredentialStore,
    }

    async fn fixture(signed_in: bool) -> Fixture {
        let pool = create_test_pool().await.unwrap();
        let clock = Arc::new(SystemClock);
        let entries = Arc::new(
            EntryStore::open(Arc::new(SqliteEntryRepository::new(pool.clone())), clock.clone()).await,
        );
        let queue = Arc::new(
            MutationQueue::open(Arc::new(SqliteMutationQueueRepository::new(pool)), clock).await,
        );
        let credentials = CredentialStore::new(Arc::new(MemorySecureStore::new()), "anilist.token");
        if signed_in {
            credentials
                .store(&Credential::new("token-123").unwrap())
                .await
                .unwrap();
        }
        Fixture {
            entries,
            queue,
            credentials,
        }
    }

    fn config() -> SyncConfig {
        SyncConfig {
            inter_item_delay: Duration::ZERO,
            ..SyncConfig::default()
        }
    }

    impl Fixture {
        fn coordinator(&self, adapter: MockAdapter) -> SyncCoordinator {
            SyncCoordinator::new(
                config(),
                self.entries.clone(),
                self.queue.clone(),
                Arc::new(adapter),
                self.credentials.clone(),
            )
        }

        async fn linked(&self, remote_id: u64, progress: u32) -> EntryId {
            let id = EntryId::remote(remote_id);
            self.entries
                .upsert_progress(&id, ProgressPatch::progress(progress).with_title("Frieren"))
                .await
                .unwrap();
            id
        }
    }

    #[tokio::test]
    async fn test_sync_success_marks_synced() {
        let fx = fixture(true).await;
        let id = fx.linked(154587, 5).await;

        let mut adapter = MockAdapter::new();
        adapter
            .expect_apply()
            .withf(|credential, mutation| {
                credential.access_token() == "token-123"
                    && mutation.remote_id() == 154587
                    && mutation.progress() == Some(5)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = fx.coordinator(adapter).sync_entry(&id).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Synced);
        assert_eq!(fx.entries.get(&id).await.unwrap().sync_state, SyncState::Synced);
        assert!(fx.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_connectivity_failure_is_swallowed_and_queued() {
        let fx = fixture(true).await;
        let id = fx.linked(1, 3).await;

        let mut adapter = MockAdapter::new();
        adapter
            .expect_apply()
            .returning(|_, _| Err(RemoteError::Network("connection refused".into())));

        let outcome = fx.coordinator(adapter).sync_entry(&id).await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Queued { .. }));
        let entry = fx.entries.get(&id).await.unwrap();
        assert_eq!(entry.sync_state, SyncState::Unsynced);
        assert!(entry.last_sync_attempt_at.is_some());
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_server_failure_is_queued_and_surfaced() {
        let fx = fixture(true).await;
        let id = fx.linked(1, 3).await;

        let mut adapter = MockAdapter::new();
        adapter
            .expect_apply()
            .returning(|_, _| Err(RemoteError::Server { status: 503 }));

        let result = fx.coordinator(adapter).sync_entry(&id).await;

        assert!(matches!(
            result,
            Err(SyncError::Remote(RemoteError::Server { status: 503 }))
        ));
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_rejection_marks_error_without_queueing() {
        let fx = fixture(true).await;
        let id = fx.linked(1, 3).await;

        let mut adapter = MockAdapter::new();
        adapter.expect_apply().times(1).returning(|_, _| {
            Err(RemoteError::Rejected {
                status: 400,
                message: "invalid progress".into(),
            })
        });

        let result = fx.coordinator(adapter).sync_entry(&id).await;

        assert!(result.is_err());
        let entry = fx.entries.get(&id).await.unwrap();
        assert_eq!(entry.sync_state, SyncState::Error);
        assert!(entry.last_sync_error.unwrap().contains("invalid progress"));
        assert!(fx.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_unlinked_entry_is_not_pushed() {
        let fx = fixture(true).await;
        let id = EntryId::source("mangadex", "abc");
        fx.entries
            .upsert_progress(&id, ProgressPatch::progress(2))
            .await
            .unwrap();

        let mut adapter = MockAdapter::new();
        adapter.expect_apply().never();

        let outcome = fx.coordinator(adapter).sync_entry(&id).await.unwrap();
        assert_eq!(outcome, SyncOutcome::NotLinked);
    }

    #[tokio::test]
    async fn test_missing_credential_defers_without_attempt() {
        let fx = fixture(false).await;
        let id = fx.linked(9, 1).await;

        let mut adapter = MockAdapter::new();
        adapter.expect_apply().never();

        let outcome = fx.coordinator(adapter).sync_entry(&id).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Queued {
                reason: "not authenticated".into()
            }
        );
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_offline_skips_remote_call() {
        let fx = fixture(true).await;
        let id = fx.linked(9, 1).await;

        let mut adapter = MockAdapter::new();
        adapter.expect_apply().never();

        let monitor = Arc::new(ManualNetworkMonitor::new(NetworkStatus::Disconnected));
        let coordinator = SyncCoordinator::new(
            SyncConfig {
                network_awareness: true,
                ..config()
            },
            fx.entries.clone(),
            fx.queue.clone(),
            Arc::new(adapter),
            fx.credentials.clone(),
        )
        .with_network_monitor(monitor);

        let outcome = coordinator.sync_entry(&id).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Queued {
                reason: "offline".into()
            }
        );
        assert_eq!(coordinator.drain().await.unwrap(), DrainStatus::Offline);
    }

    #[tokio::test]
    async fn test_replay_raises_payload_to_local_progress() {
        let fx = fixture(true).await;
        let id = fx.linked(7, 4).await;
        fx.queue
            .enqueue(Mutation::progress_of(&fx.entries.get(&id).await.unwrap()).unwrap())
            .await
            .unwrap();
        fx.entries
            .upsert_progress(&id, ProgressPatch::progress(6))
            .await
            .unwrap();

        let mut adapter = MockAdapter::new();
        adapter
            .expect_apply()
            .withf(|_, mutation| mutation.progress() == Some(6))
            .times(1)
            .returning(|_, _| Ok(()));

        let status = fx.coordinator(adapter).drain().await.unwrap();

        assert!(matches!(status, DrainStatus::Completed(DrainReport { applied: 1, .. })));
        assert_eq!(fx.entries.get(&id).await.unwrap().sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_replay_skips_already_synced_entry() {
        let fx = fixture(true).await;
        let id = fx.linked(7, 4).await;
        fx.queue
            .enqueue(Mutation::progress_of(&fx.entries.get(&id).await.unwrap()).unwrap())
            .await
            .unwrap();
        fx.entries.begin_sync(&id).await.unwrap();
        fx.entries.mark_synced(&id).await.unwrap();

        let mut adapter = MockAdapter::new();
        adapter.expect_apply().never();

        let status = fx.coordinator(adapter).drain().await.unwrap();
        assert!(matches!(status, DrainStatus::Completed(DrainReport { applied: 1, .. })));
        assert!(fx.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_replay_rejection_is_abandoned() {
        let fx = fixture(true).await;
        let first = fx.linked(1, 1).await;
        let second = fx.linked(2, 1).await;
        for id in [&first, &second] {
            fx.queue
                .enqueue(Mutation::progress_of(&fx.entries.get(id).await.unwrap()).unwrap())
                .await
                .unwrap();
        }

        let mut adapter = MockAdapter::new();
        adapter
            .expect_apply()
            .withf(|_, mutation| mutation.remote_id() == 1)
            .returning(|_, _| Err(RemoteError::NotFound));
        adapter
            .expect_apply()
            .withf(|_, mutation| mutation.remote_id() == 2)
            .returning(|_, _| Ok(()));

        let status = fx.coordinator(adapter).drain().await.unwrap();

        assert_eq!(
            status,
            DrainStatus::Completed(DrainReport {
                applied: 1,
                abandoned: 1,
                remaining: 0,
                stopped_early: false
            })
        );
        assert_eq!(fx.entries.get(&first).await.unwrap().sync_state, SyncState::Error);
    }

    #[tokio::test]
    async fn test_rejected_entry_is_not_replayed() {
        let fx = fixture(true).await;
        let id = fx.linked(1, 2).await;
        fx.queue
            .enqueue(Mutation::progress_of(&fx.entries.get(&id).await.unwrap()).unwrap())
            .await
            .unwrap();
        fx.entries
            .upsert_progress(&id, ProgressPatch::progress(3))
            .await
            .unwrap();

        let mut adapter = MockAdapter::new();
        adapter.expect_apply().times(1).returning(|_, _| {
            Err(RemoteError::Rejected {
                status: 400,
                message: "unknown media".into(),
            })
        });
        let coordinator = fx.coordinator(adapter);

        assert!(coordinator.sync_entry(&id).await.is_err());
        assert_eq!(fx.entries.get(&id).await.unwrap().sync_state, SyncState::Error);

        let status = coordinator.drain().await.unwrap();

        assert_eq!(
            status,
            DrainStatus::Completed(DrainReport {
                applied: 0,
                abandoned: 1,
                remaining: 0,
                stopped_early: false
            })
        );
        assert_eq!(fx.entries.get(&id).await.unwrap().sync_state, SyncState::Error);
    }

    #[tokio::test]
    async fn test_drain_without_credential() {
        let fx = fixture(false).await;
        let id = fx.linked(1, 1).await;
        fx.queue
            .enqueue(Mutation::progress_of(&fx.entries.get(&id).await.unwrap()).unwrap())
            .await
            .unwrap();

        let status = fx.coordinator(MockAdapter::new()).drain().await.unwrap();
        assert_eq!(status, DrainStatus::NotAuthenticated);
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_recalibrate_adopts_remote_ahead() {
        let fx = fixture(true).await;
        let id = fx.linked(30, 4).await;

        let mut adapter = MockAdapter::new();
        adapter
            .expect_fetch_entry()
            .with(always(), eq(30), eq(MediaKind::Anime))
            .returning(|_, remote_id, _| {
                Ok(Some(RemoteListEntry {
                    remote_id,
                    progress: 10,
                    progress_volumes: None,
                    status: Some(ListStatus::Paused),
                    updated_at: None,
                }))
            });
        adapter.expect_apply().never();

        let entry = fx.coordinator(adapter).recalibrate(&id).await.unwrap();

        assert_eq!(entry.progress, 10);
        assert_eq!(entry.status, ListStatus::Paused);
        assert_eq!(entry.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_recalibrate_pushes_local_ahead() {
        let fx = fixture(true).await;
        let id = fx.linked(30, 8).await;

        let mut adapter = MockAdapter::new();
        adapter.expect_fetch_entry().returning(|_, remote_id, _| {
            Ok(Some(RemoteListEntry {
                remote_id,
                progress: 5,
                progress_volumes: None,
                status: Some(ListStatus::Current),
                updated_at: None,
            }))
        });
        adapter
            .expect_apply()
            .withf(|_, mutation| mutation.progress() == Some(8))
            .times(1)
            .returning(|_, _| Ok(()));

        let entry = fx.coordinator(adapter).recalibrate(&id).await.unwrap();

        assert_eq!(entry.progress, 8);
        assert_eq!(entry.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_recalibrate_requires_link() {
        let fx = fixture(true).await;
        let unlinked = EntryId::source("mangadex", "zzz");
        fx.entries
            .upsert_progress(&unlinked, ProgressPatch::progress(1))
            .await
            .unwrap();

        let coordinator = fx.coordinator(MockAdapter::new());
        assert!(matches!(
            coordinator.recalibrate(&unlinked).await,
            Err(SyncError::NotLinked { .. })
        ));
    }
}
