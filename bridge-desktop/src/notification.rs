//! Notification sink that writes to the log.
//!
//! Hosts with a real notification centre inject their own sink; this one
//! keeps headless and CLI hosts from needing one.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    notification::{Notification, NotificationSink},
};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            title = %notification.title,
            body = %notification.body,
            icon = notification.icon.as_deref().unwrap_or(""),
            "Notification"
        );
        Ok(())
    }
}
