//! Network Monitoring Abstraction
//!
//! The sync coordinator asks the monitor whether it is worth attempting a
//! remote write, and listens to its change stream so a transition back to
//! `Connected` drains the pending mutation queue.

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Cellular,
    WiFi,
    Ethernet,
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    /// Status unknown; callers treat this as "try anyway".
    Indeterminate,
}

impl NetworkStatus {
    /// Whether a remote call is worth attempting.
    pub fn is_reachable(self) -> bool {
        !matches!(self, NetworkStatus::Disconnected)
    }
}

/// Network information
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
}

impl NetworkInfo {
    pub fn connected() -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: None,
            is_metered: false,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
        }
    }
}

/// Network monitor trait
///
/// # Platform Support
///
/// - **Desktop**: TCP reachability probe (see `bridge-desktop`)
/// - **Mobile**: Host connectivity manager, injected by the shell
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn should_attempt(monitor: &dyn NetworkMonitor) -> bool {
///     monitor.is_connected().await
/// }
/// ```
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if a remote call is worth attempting.
    ///
    /// A monitor that fails to answer does not block sync: only an explicit
    /// `Disconnected` does.
    async fn is_connected(&self) -> bool {
        match self.get_network_info().await {
            Ok(info) => info.status.is_reachable(),
            Err(_) => true,
        }
    }

    /// Subscribe to network status changes
    ///
    /// Implementations emit an update whenever the status changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait::async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}
