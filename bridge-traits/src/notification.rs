//! User-visible notifications.
//!
//! The sync coordinator emits one notification per confirmed remote write.
//! Delivery is best effort: a failing sink is logged and otherwise ignored.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A title/body/icon triple rendered by the host's notification centre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Image URL or host icon name.
    pub icon: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Notification sink trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::notification::{Notification, NotificationSink};
///
/// async fn confirm(sink: &dyn NotificationSink) {
///     let note = Notification::new("Progress synced", "Episode 12 of Frieren");
///     sink.notify(note).await.ok();
/// }
/// ```
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_builder() {
        let note = Notification::new("Synced", "Chapter 40").with_icon("https://img/cover.png");

        assert_eq!(note.title, "Synced");
        assert_eq!(note.body, "Chapter 40");
        assert_eq!(note.icon.as_deref(), Some("https://img/cover.png"));
    }
}
