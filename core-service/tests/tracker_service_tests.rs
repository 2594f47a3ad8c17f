//! Integration tests for the tracker bootstrap
//!
//! The service is started over the single-document backend (or a scratch
//! SQLite file) with a recording remote, so every path runs without a
//! network.

use async_trait::async_trait;
use bridge_desktop::{ManualNetworkMonitor, MemorySecureStore, ReqwestHttpClient, SqliteSettingsStore};
use bridge_traits::storage::SettingsStore;
use core_auth::Credential;
use core_library::{EntryId, LinkRequest, ListStatus, MediaKind, ProgressPatch, SyncState};
use core_runtime::config::{CoreConfig, StorageBackend, TrackerKind};
use core_service::TrackerService;
use core_sync::{
    DrainStatus, Mutation, RemoteAdapter, RemoteError, RemoteListEntry, SyncOutcome,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Default)]
struct RecordingRemote {
    applied: Mutex<Vec<Mutation>>,
    rejecting: AtomicBool,
}

impl RecordingRemote {
    fn applied(&self) -> Vec<Mutation> {
        self.applied.lock().unwrap().clone()
    }

    fn reject_writes(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteAdapter for RecordingRemote {
    async fn apply(&self, _credential: &Credential, mutation: &Mutation) -> Result<(), RemoteError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "invalid status".to_string(),
            });
        }
        self.applied.lock().unwrap().push(mutation.clone());
        Ok(())
    }

    async fn fetch_entry(
        &self,
        _credential: &Credential,
        _remote_id: u64,
        _media_kind: MediaKind,
    ) -> Result<Option<RemoteListEntry>, RemoteError> {
        Ok(None)
    }
}

struct Fixture {
    settings: Arc<dyn SettingsStore>,
    secure: Arc<MemorySecureStore>,
    remote: Arc<RecordingRemote>,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            settings: Arc::new(SqliteSettingsStore::in_memory().await.unwrap()),
            secure: Arc::new(MemorySecureStore::new()),
            remote: Arc::new(RecordingRemote::default()),
        }
    }

    fn config(&self, backend: StorageBackend, database_path: Option<PathBuf>) -> CoreConfig {
        let mut builder = CoreConfig::builder()
            .storage_backend(backend)
            .settings_store(self.settings.clone())
            .secure_store(self.secure.clone())
            .network_monitor(Arc::new(ManualNetworkMonitor::default()))
            .inter_item_delay(Duration::from_millis(5));
        if let Some(path) = database_path {
            builder = builder.database_path(path);
        }
        builder.build().unwrap()
    }

    async fn start(&self) -> TrackerService {
        TrackerService::start_with_remote(
            self.config(StorageBackend::Document, None),
            self.remote.clone(),
        )
        .await
        .unwrap()
    }
}

fn scratch_database() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("tracker-service-{}-{}.db", std::process::id(), nanos))
}

async fn wait_for_applied(remote: &RecordingRemote, count: usize) {
    for _ in 0..200 {
        if remote.applied().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("remote saw {} writes, expected {}", remote.applied().len(), count);
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_signed_in_progress_is_pushed_immediately() {
    let fixture = Fixture::new().await;
    let tracker = fixture.start().await;
    tracker.sign_in("token").await.unwrap();

    let change = tracker
        .record_progress(&EntryId::remote(21), ProgressPatch::progress(5))
        .await
        .unwrap();

    assert_eq!(change.sync, SyncOutcome::Synced);
    assert_eq!(change.entry.sync_state, SyncState::Synced);
    assert_eq!(fixture.remote.applied().len(), 1);
    assert_eq!(fixture.remote.applied()[0].progress(), Some(5));
    assert_eq!(tracker.pending_mutations().await, 0);

    tracker.shutdown().await;
}

#[tokio::test]
async fn test_signed_out_progress_is_queued_until_sign_in() {
    let fixture = Fixture::new().await;
    let tracker = fixture.start().await;
    assert!(!tracker.is_signed_in().await.unwrap());

    let change = tracker
        .record_progress(&EntryId::remote(21), ProgressPatch::progress(3))
        .await
        .unwrap();

    assert!(matches!(change.sync, SyncOutcome::Queued { .. }));
    assert_eq!(change.entry.sync_state, SyncState::Unsynced);
    assert_eq!(tracker.pending_mutations().await, 1);
    assert!(fixture.remote.applied().is_empty());

    tracker.sign_in("token").await.unwrap();
    wait_for_applied(&fixture.remote, 1).await;

    let entry = tracker.entries().get(&EntryId::remote(21)).await.unwrap();
    assert_eq!(entry.sync_state, SyncState::Synced);
    assert_eq!(tracker.pending_mutations().await, 0);

    tracker.shutdown().await;
}

#[tokio::test]
async fn test_unlinked_entry_is_kept_local() {
    let fixture = Fixture::new().await;
    let tracker = fixture.start().await;
    tracker.sign_in("token").await.unwrap();

    let change = tracker
        .record_progress(&EntryId::source("ext-src", "m-9"), ProgressPatch::progress(4))
        .await
        .unwrap();

    assert_eq!(change.sync, SyncOutcome::NotLinked);
    assert!(fixture.remote.applied().is_empty());

    let linked = tracker
        .link_remote_id(LinkRequest::new("ext-src", "m-9", 100, "Linked Title"))
        .await
        .unwrap();
    assert_eq!(linked.entry.id, EntryId::remote(100));
    assert_eq!(linked.entry.progress, 4);
    assert!(tracker
        .entries()
        .get(&EntryId::source("ext-src", "m-9"))
        .await
        .is_none());

    tracker.shutdown().await;
}

#[tokio::test]
async fn test_link_reports_actual_state_of_entry_not_pushed() {
    let fixture = Fixture::new().await;
    let tracker = fixture.start().await;
    tracker.sign_in("token").await.unwrap();

    fixture.remote.reject_writes(true);
    assert!(tracker
        .record_progress(&EntryId::remote(100), ProgressPatch::progress(6))
        .await
        .is_err());

    let relinked = tracker
        .link_remote_id(LinkRequest::new("ext-src", "m-9", 100, "Linked Title"))
        .await
        .unwrap();
    assert_eq!(
        relinked.sync,
        SyncOutcome::Skipped {
            state: SyncState::Error
        }
    );
    assert_eq!(relinked.entry.sync_state, SyncState::Error);
    assert!(fixture.remote.applied().is_empty());

    fixture.remote.reject_writes(false);
    tracker
        .record_progress(&EntryId::remote(100), ProgressPatch::progress(7))
        .await
        .unwrap();
    let synced = tracker
        .link_remote_id(LinkRequest::new("ext-src", "m-9", 100, "Linked Title"))
        .await
        .unwrap();
    assert_eq!(
        synced.sync,
        SyncOutcome::Skipped {
            state: SyncState::Synced
        }
    );

    tracker.shutdown().await;
}

#[tokio::test]
async fn test_status_override() {
    let fixture = Fixture::new().await;
    let tracker = fixture.start().await;
    tracker.sign_in("token").await.unwrap();

    assert!(tracker
        .set_status(&EntryId::remote(404), ListStatus::Dropped)
        .await
        .unwrap()
        .is_none());

    tracker
        .record_progress(&EntryId::remote(7), ProgressPatch::progress(1))
        .await
        .unwrap();
    let change = tracker
        .set_status(&EntryId::remote(7), ListStatus::Paused)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(change.entry.status, ListStatus::Paused);
    assert!(matches!(
        fixture.remote.applied().last(),
        Some(Mutation::UpdateStatus(update)) if update.status == ListStatus::Paused
    ));

    tracker.shutdown().await;
}

#[tokio::test]
async fn test_document_backend_survives_restart() {
    let fixture = Fixture::new().await;

    let tracker = fixture.start().await;
    tracker
        .record_progress(&EntryId::remote(55), ProgressPatch::progress(9))
        .await
        .unwrap();
    tracker.shutdown().await;
    drop(tracker);

    let restarted = fixture.start().await;
    let entry = restarted.entries().get(&EntryId::remote(55)).await.unwrap();
    assert_eq!(entry.progress, 9);
    assert_eq!(restarted.pending_mutations().await, 1);

    restarted.shutdown().await;
}

#[tokio::test]
async fn test_sqlite_backend_survives_restart() {
    let fixture = Fixture::new().await;
    let path = scratch_database();

    let tracker = TrackerService::start_with_remote(
        fixture.config(StorageBackend::Sqlite, Some(path.clone())),
        fixture.remote.clone(),
    )
    .await
    .unwrap();
    tracker
        .record_progress(&EntryId::remote(12), ProgressPatch::progress(2))
        .await
        .unwrap();
    let category = tracker.categories().create("Weekly").await.unwrap();
    tracker
        .entries()
        .add_category(&EntryId::remote(12), &category.id)
        .await
        .unwrap();
    tracker.shutdown().await;
    drop(tracker);

    let restarted = TrackerService::start_with_remote(
        fixture.config(StorageBackend::Sqlite, Some(path.clone())),
        fixture.remote.clone(),
    )
    .await
    .unwrap();
    let entry = restarted.entries().get(&EntryId::remote(12)).await.unwrap();
    assert_eq!(entry.progress, 2);
    assert!(entry.categories.contains(&category.id));
    assert_eq!(restarted.pending_mutations().await, 1);

    assert!(restarted.delete_category(&category.id).await.unwrap());
    let entry = restarted.entries().get(&EntryId::remote(12)).await.unwrap();
    assert!(entry.categories.is_empty());

    restarted.shutdown().await;
    drop(restarted);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_manual_drain_and_sign_out() {
    let fixture = Fixture::new().await;
    let tracker = fixture.start().await;

    tracker
        .record_progress(&EntryId::remote(1), ProgressPatch::progress(1))
        .await
        .unwrap();
    assert_eq!(tracker.drain().await.unwrap(), DrainStatus::NotAuthenticated);

    tracker.sign_in("token").await.unwrap();
    wait_for_applied(&fixture.remote, 1).await;

    tracker.sign_out().await.unwrap();
    assert!(!tracker.is_signed_in().await.unwrap());

    tracker.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let fixture = Fixture::new().await;
    let tracker = fixture.start().await;
    assert!(tracker.is_running().await);

    tracker.shutdown().await;
    assert!(!tracker.is_running().await);
    tracker.shutdown().await;
}

#[tokio::test]
async fn test_empty_credential_is_rejected() {
    let fixture = Fixture::new().await;
    let tracker = fixture.start().await;

    assert!(tracker.sign_in("   ").await.is_err());
    assert!(!tracker.is_signed_in().await.unwrap());

    tracker.shutdown().await;
}

#[tokio::test]
async fn test_myanimelist_service_receives_progress() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/manga/2/my_list_status"))
        .and(header("authorization", "Bearer mal-token"))
        .and(body_string_contains("num_chapters_read=12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "reading", "num_chapters_read": 12
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fixture = Fixture::new().await;
    let config = CoreConfig::builder()
        .storage_backend(StorageBackend::Document)
        .settings_store(fixture.settings.clone())
        .secure_store(fixture.secure.clone())
        .network_monitor(Arc::new(ManualNetworkMonitor::default()))
        .http_client(Arc::new(ReqwestHttpClient::new().unwrap()))
        .tracker_kind(TrackerKind::MyAnimeList)
        .tracker_endpoint(server.uri())
        .build()
        .unwrap();
    let tracker = TrackerService::start(config).await.unwrap();
    tracker.sign_in("mal-token").await.unwrap();

    let change = tracker
        .record_progress(
            &EntryId::remote(2),
            ProgressPatch::progress(12).with_media_kind(MediaKind::Manga),
        )
        .await
        .unwrap();

    assert_eq!(change.sync, SyncOutcome::Synced);
    assert_eq!(change.entry.sync_state, SyncState::Synced);

    tracker.shutdown().await;
}
