//! # Core Configuration Module
//!
//! The builder assembles a [`CoreConfig`] holding every bridge and setting the
//! tracker needs, and validates it up front so a missing capability fails at
//! startup instead of on the first sync.
//!
//! ## Required Dependencies
//!
//! - `SecureStore` - Holds the tracking-service credential
//! - `SettingsStore` - Preferences, and the backing store for the
//!   single-document persistence format
//!
//! ## Optional Dependencies
//!
//! - `HttpClient` - Needed by remote adapters (desktop default: reqwest)
//! - `NetworkMonitor` - Gates immediate sync and triggers queue drains
//!   (desktop default: TCP reachability probe)
//! - `NotificationSink` - Sync confirmations (desktop default: log)
//! - `Clock` - Defaults to the system clock
//!
//! When the `desktop-shims` feature is enabled, desktop defaults for the
//! stores, HTTP client, network monitor and notification sink are injected
//! when not provided. Network awareness follows whether a monitor is present
//! unless feature flags are set explicitly.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, StorageBackend};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/tracker.db")
//!     .storage_backend(StorageBackend::Sqlite)
//!     .drain_interval(Duration::from_secs(60))
//!     .build()?;
//! ```
//!
//! Without `desktop-shims`, a missing bridge produces an actionable error:
//!
//! ```ignore
//! let err = CoreConfig::builder()
//!     .database_path("/data/tracker.db")
//!     .build()
//!     .unwrap_err();
//! // Capability missing: SecureStore - SecureStore implementation is required ...
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, HttpClient, NetworkMonitor, NotificationSink, SecureStore, SettingsStore, SystemClock,
};
#[cfg(feature = "desktop-shims")]
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default period of the background queue drain.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(60);

/// Default pause between two remote writes during a drain.
pub const DEFAULT_INTER_ITEM_DELAY: Duration = Duration::from_millis(500);

/// Default AniList GraphQL endpoint.
pub const DEFAULT_TRACKER_ENDPOINT: &str = "https://graphql.anilist.co";

/// Default MyAnimeList v2 API base.
pub const DEFAULT_MYANIMELIST_ENDPOINT: &str = "https://api.myanimelist.net/v2";

/// Which remote tracking service receives the writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerKind {
    #[default]
    AniList,
    MyAnimeList,
}

impl TrackerKind {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            TrackerKind::AniList => DEFAULT_TRACKER_ENDPOINT,
            TrackerKind::MyAnimeList => DEFAULT_MYANIMELIST_ENDPOINT,
        }
    }

    pub fn default_credential_key(&self) -> &'static str {
        match self {
            TrackerKind::AniList => "anilist.access_token",
            TrackerKind::MyAnimeList => "myanimelist.access_token",
        }
    }
}

/// Where entries, the mutation queue and categories are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Indexed SQLite tables at `database_path`; one row write per mutation.
    #[default]
    Sqlite,
    /// One JSON document per logical store inside the `SettingsStore`.
    Document,
}

/// Timings of the sync coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimings {
    /// Period of the background queue drain.
    pub drain_interval: Duration,
    /// Pause between two queued items inside one drain pass.
    pub inter_item_delay: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            inter_item_delay: DEFAULT_INTER_ITEM_DELAY,
        }
    }
}

/// Feature flags control optional behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Push each local mutation to the remote right away instead of only
    /// through the queue.
    pub enable_immediate_sync: bool,

    /// Run the periodic drain loop.
    pub enable_background_drain: bool,

    /// Skip remote calls while offline and drain on reconnect
    /// (requires NetworkMonitor).
    pub enable_network_awareness: bool,

    /// Emit a notification for every confirmed sync.
    pub enable_sync_notifications: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_immediate_sync: true,
            enable_background_drain: true,
            enable_network_awareness: false,
            enable_sync_notifications: true,
        }
    }
}

/// Remote tracking service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerServiceConfig {
    pub kind: TrackerKind,
    /// GraphQL endpoint (AniList) or REST API base (MyAnimeList).
    pub endpoint: String,
    /// Key of the access token inside the `SecureStore`.
    pub credential_key: String,
}

impl TrackerServiceConfig {
    pub fn for_kind(kind: TrackerKind) -> Self {
        Self {
            kind,
            endpoint: kind.default_endpoint().to_string(),
            credential_key: kind.default_credential_key().to_string(),
        }
    }
}

impl Default for TrackerServiceConfig {
    fn default() -> Self {
        Self::for_kind(TrackerKind::default())
    }
}

/// Core configuration for the tracker.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite database file (entries, queue, categories)
    pub database_path: PathBuf,

    pub storage_backend: StorageBackend,

    /// Secure credential storage (required)
    pub secure_store: Arc<dyn SecureStore>,

    /// Preferences and document storage (required)
    pub settings_store: Arc<dyn SettingsStore>,

    pub http_client: Option<Arc<dyn HttpClient>>,

    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    pub notification_sink: Option<Arc<dyn NotificationSink>>,

    pub clock: Arc<dyn Clock>,

    pub sync: SyncTimings,

    pub features: FeatureFlags,

    pub tracker: TrackerServiceConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("storage_backend", &self.storage_backend)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field(
                "notification_sink",
                &self
                    .notification_sink
                    .as_ref()
                    .map(|_| "NotificationSink { ... }"),
            )
            .field("sync", &self.sync)
            .field("features", &self.features)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage_backend == StorageBackend::Sqlite
            && self.database_path.as_os_str().is_empty()
        {
            return Err(Error::Config(
                "Database path cannot be empty with the SQLite backend".to_string(),
            ));
        }

        if self.sync.drain_interval < Duration::from_secs(1) {
            return Err(Error::Config(
                "Drain interval must be at least one second".to_string(),
            ));
        }

        if self.sync.inter_item_delay >= self.sync.drain_interval {
            return Err(Error::Config(format!(
                "Inter-item delay ({:?}) must be shorter than the drain interval ({:?})",
                self.sync.inter_item_delay, self.sync.drain_interval
            )));
        }

        if !(self.tracker.endpoint.starts_with("https://")
            || self.tracker.endpoint.starts_with("http://"))
        {
            return Err(Error::Config(format!(
                "Tracker endpoint must be an http(s) URL, got {:?}",
                self.tracker.endpoint
            )));
        }

        if self.tracker.credential_key.trim().is_empty() {
            return Err(Error::Config(
                "Credential key cannot be empty".to_string(),
            ));
        }

        if self.features.enable_network_awareness && self.network_monitor.is_none() {
            return Err(Error::Config(
                "Network awareness enabled but no NetworkMonitor provided. \
                 Disable the feature or inject a NetworkMonitor implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for the tracker credential. \
                 Desktop: enable the 'desktop-shims' feature to use KeyringSecureStore. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for preferences and documents. \
                 Desktop: enable the 'desktop-shims' feature to use SqliteSettingsStore. \
                 Mobile: inject platform-native settings (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Ok(Arc::new(bridge_desktop::KeyringSecureStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

/// Opens `settings.db` next to the database.
///
/// The builder is synchronous, so the store is opened on a private runtime;
/// inside an existing runtime that has to happen on another thread.
#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(database_path: &Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use core_async::runtime::{Builder, Handle};

    let candidate = database_path
        .parent()
        .map(|parent| parent.join("settings.db"))
        .unwrap_or_else(|| PathBuf::from("settings.db"));

    let init_store = |path: PathBuf| -> Result<SqliteSettingsStore> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create runtime for default settings store: {}",
                    e
                ))
            })?;

        runtime
            .block_on(SqliteSettingsStore::open(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    let store = match Handle::try_current() {
        Ok(_) => std::thread::spawn(move || init_store(candidate))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(candidate)?,
    };

    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_database_path: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    match bridge_desktop::ReqwestHttpClient::new() {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "Default HTTP client unavailable");
            None
        }
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    Some(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn provide_default_notification_sink() -> Option<Arc<dyn NotificationSink>> {
    Some(Arc::new(bridge_desktop::LogNotificationSink))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_notification_sink() -> Option<Arc<dyn NotificationSink>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    storage_backend: StorageBackend,
    secure_store: Option<Arc<dyn SecureStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
    clock: Option<Arc<dyn Clock>>,
    sync: SyncTimings,
    features: Option<FeatureFlags>,
    tracker: TrackerServiceConfig,
}

impl CoreConfigBuilder {
    /// Sets the SQLite database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().database_path("/data/tracker.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn storage_backend(mut self, backend: StorageBackend) -> Self {
        self.storage_backend = backend;
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the network monitor. Network awareness turns on with it unless
    /// [`features`](Self::features) sets the flags explicitly.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.sync.drain_interval = interval;
        self
    }

    pub fn inter_item_delay(mut self, delay: Duration) -> Self {
        self.sync.inter_item_delay = delay;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = Some(features);
        self
    }

    /// Selects the tracking service and resets endpoint and credential key
    /// to its defaults; override them afterwards if needed.
    pub fn tracker_kind(mut self, kind: TrackerKind) -> Self {
        self.tracker = TrackerServiceConfig::for_kind(kind);
        self
    }

    pub fn tracker_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.tracker.endpoint = endpoint.into();
        self
    }

    pub fn credential_key(mut self, key: impl Into<String>) -> Self {
        self.tracker.credential_key = key.into();
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Fails when a required bridge is missing and no desktop default can be
    /// provided, or when [`CoreConfig::validate`] rejects the result.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = match (self.database_path, self.storage_backend) {
            (Some(path), _) => path,
            (None, StorageBackend::Document) => PathBuf::new(),
            (None, StorageBackend::Sqlite) => {
                return Err(Error::Config(
                    "Database path is required. Use .database_path() to set it.".to_string(),
                ))
            }
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&database_path)?,
        };

        let network_monitor = self.network_monitor.or_else(provide_default_network_monitor);
        // Explicit flags win; otherwise awareness follows monitor availability.
        let features = self.features.unwrap_or(FeatureFlags {
            enable_network_awareness: network_monitor.is_some(),
            ..FeatureFlags::default()
        });

        let config = CoreConfig {
            database_path,
            storage_backend: self.storage_backend,
            secure_store,
            settings_store,
            http_client: self.http_client.or_else(provide_default_http_client),
            network_monitor,
            notification_sink: self
                .notification_sink
                .or_else(provide_default_notification_sink),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            sync: self.sync,
            features,
            tracker: self.tracker,
        };

        config.validate()?;

        Ok(config)
    }
}
