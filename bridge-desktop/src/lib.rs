//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest`
//! - `SecureStore` using the `keyring` crate, or an in-process map
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `NetworkMonitor` using a TCP reachability probe, or host-driven status
//! - `NotificationSink` forwarding to the log
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let settings = SqliteSettingsStore::open("tracker.db".into()).await?;
//!     let http = ReqwestHttpClient::new()?;
//!     let network = DesktopNetworkMonitor::new();
//!     // Hand them to CoreConfig::builder()
//!     Ok(())
//! }
//! ```

mod http;
mod network;
mod notification;
mod secure_store;
mod settings;

pub use http::ReqwestHttpClient;
pub use network::{DesktopNetworkMonitor, ManualNetworkMonitor, ProbeConfig};
pub use notification::LogNotificationSink;
pub use settings::SqliteSettingsStore;

pub use secure_store::MemorySecureStore;
#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
