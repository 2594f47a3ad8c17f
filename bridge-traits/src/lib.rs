//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host implements for the tracker core.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by remote tracking adapters
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity signal that gates and triggers sync
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Keystore)
//! - [`SettingsStore`](storage::SettingsStore) - Key-value storage, also used for the
//!   single-document persistence format
//!
//! ### Platform Integration
//! - [`NotificationSink`](notification::NotificationSink) - User-visible sync confirmations
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! missing, and degrades gracefully when an optional one is (no network
//! monitor means "assume online", no notification sink means "stay quiet").
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across
//! async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod network;
pub mod notification;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use notification::{Notification, NotificationSink};
pub use storage::{SecureStore, SettingsStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
