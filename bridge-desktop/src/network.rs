//! Network Monitoring Implementations

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Where and how often the desktop monitor probes.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// `host:port` opened with a plain TCP connect.
    pub address: String,
    pub connect_timeout: Duration,
    /// Polling period of the change stream.
    pub poll_interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            address: "graphql.anilist.co:443".to_string(),
            connect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Desktop network monitor implementation
///
/// Treats "a TCP connection to the tracking service opens" as connectivity.
/// Platform APIs (netlink, SystemConfiguration, WinAPI) would report faster
/// but need extra dependencies.
#[derive(Debug, Clone, Default)]
pub struct DesktopNetworkMonitor {
    config: ProbeConfig,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            self.config.connect_timeout,
            tokio::net::TcpStream::connect(self.config.address.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;
        debug!(status = ?status, address = %self.config.address, "Network probe finished");

        Ok(NetworkInfo {
            status,
            network_type: (status == NetworkStatus::Connected).then_some(NetworkType::Other),
            is_metered: false,
        })
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(PollingChangeStream {
            monitor: self.clone(),
            last_status: None,
        }))
    }
}

/// Polls the probe and yields only on status transitions.
struct PollingChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for PollingChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            tokio::time::sleep(self.monitor.config.poll_interval).await;

            if let Ok(info) = self.monitor.get_network_info().await {
                if self.last_status != Some(info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
        }
    }
}

/// Network monitor driven by the host shell.
///
/// Webview hosts already receive `online`/`offline` events; they forward them
/// through [`ManualNetworkMonitor::set_status`] instead of probing.
#[derive(Debug, Clone)]
pub struct ManualNetworkMonitor {
    sender: watch::Sender<NetworkStatus>,
}

impl ManualNetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn set_status(&self, status: NetworkStatus) {
        self.sender.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    pub fn status(&self) -> NetworkStatus {
        *self.sender.borrow()
    }
}

impl Default for ManualNetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Connected)
    }
}

fn info_for(status: NetworkStatus) -> NetworkInfo {
    NetworkInfo {
        status,
        network_type: None,
        is_metered: false,
    }
}

#[async_trait]
impl NetworkMonitor for ManualNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        Ok(info_for(self.status()))
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(WatchChangeStream {
            receiver: self.sender.subscribe(),
        }))
    }
}

struct WatchChangeStream {
    receiver: watch::Receiver<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for WatchChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        self.receiver.changed().await.ok()?;
        let status = *self.receiver.borrow_and_update();
        Some(info_for(status))
    }
}
