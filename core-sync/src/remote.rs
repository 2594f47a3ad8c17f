//! # Remote Adapter Contract
//!
//! The narrow interface the sync layer needs from a remote tracking service:
//! apply one [`Mutation`] and, for recalibration, read one list entry back.
//!
//! Failures are classified so the coordinator can decide between "queue and
//! retry" and "surface and stop":
//!
//! | Variant | Retryable | Connectivity |
//! |---|---|---|
//! | `Network`, `Timeout` | yes | yes |
//! | `RateLimited`, `Server`, `Unauthorized` | yes | no |
//! | `Rejected`, `NotFound` | no | no |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_auth::Credential;
use core_library::models::{EntryId, ListStatus, MediaKind, ProgressEntry};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    #[error("Credential rejected by remote service")]
    Unauthorized,

    #[error("Rejected by remote service (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Remote record not found")]
    NotFound,
}

impl RemoteError {
    /// Whether the same write may succeed later without a new local change.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RemoteError::Rejected { .. } | RemoteError::NotFound)
    }

    /// Whether the failure only means "not reachable right now".
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout)
    }

    /// Short label used in queue events.
    pub fn reason(&self) -> String {
        match self {
            RemoteError::Network(_) => "offline".to_string(),
            RemoteError::Timeout => "timeout".to_string(),
            RemoteError::RateLimited { .. } => "rate limited".to_string(),
            RemoteError::Server { status } => format!("HTTP {}", status),
            RemoteError::Unauthorized => "unauthorized".to_string(),
            RemoteError::Rejected { status, .. } => format!("rejected (HTTP {})", status),
            RemoteError::NotFound => "not found".to_string(),
        }
    }
}

// =============================================================================
// Mutations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub entry_id: EntryId,
    pub remote_id: u64,
    #[serde(default)]
    pub media_kind: MediaKind,
    pub progress: u32,
    #[serde(default)]
    pub progress_volumes: Option<u32>,
    pub status: ListStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub entry_id: EntryId,
    pub remote_id: u64,
    #[serde(default)]
    pub media_kind: MediaKind,
    pub status: ListStatus,
}

/// A write destined for the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Mutation {
    UpdateProgress(ProgressUpdate),
    UpdateStatus(StatusUpdate),
}

impl Mutation {
    /// Progress write carrying the entry's current state. `None` when the
    /// entry has no remote id.
    pub fn progress_of(entry: &ProgressEntry) -> Option<Self> {
        Some(Mutation::UpdateProgress(ProgressUpdate {
            entry_id: entry.id.clone(),
            remote_id: entry.remote_id?,
            media_kind: entry.media_kind,
            progress: entry.progress,
            progress_volumes: entry.progress_volumes,
            status: entry.status,
        }))
    }

    /// Status-only write. `None` when the entry has no remote id.
    pub fn status_of(entry: &ProgressEntry) -> Option<Self> {
        Some(Mutation::UpdateStatus(StatusUpdate {
            entry_id: entry.id.clone(),
            remote_id: entry.remote_id?,
            media_kind: entry.media_kind,
            status: entry.status,
        }))
    }

    pub fn entry_id(&self) -> &EntryId {
        match self {
            Mutation::UpdateProgress(update) => &update.entry_id,
            Mutation::UpdateStatus(update) => &update.entry_id,
        }
    }

    pub fn remote_id(&self) -> u64 {
        match self {
            Mutation::UpdateProgress(update) => update.remote_id,
            Mutation::UpdateStatus(update) => update.remote_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::UpdateProgress(_) => "update_progress",
            Mutation::UpdateStatus(_) => "update_status",
        }
    }

    /// Progress carried by the write, if any.
    pub fn progress(&self) -> Option<u32> {
        match self {
            Mutation::UpdateProgress(update) => Some(update.progress),
            Mutation::UpdateStatus(_) => None,
        }
    }

    /// Bring the payload up to `entry`'s current state without ever
    /// lowering the progress it carries.
    pub fn refreshed(self, entry: &ProgressEntry) -> Self {
        match self {
            Mutation::UpdateProgress(mut update) => {
                update.progress = update.progress.max(entry.progress);
                update.progress_volumes = update.progress_volumes.max(entry.progress_volumes);
                update.status = entry.status;
                Mutation::UpdateProgress(update)
            }
            Mutation::UpdateStatus(mut update) => {
                update.status = entry.status;
                Mutation::UpdateStatus(update)
            }
        }
    }
}

/// A list entry as the remote service reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListEntry {
    pub remote_id: u64,
    pub progress: u32,
    pub progress_volumes: Option<u32>,
    pub status: Option<ListStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Deliver one write. Session validity is the adapter's concern.
    async fn apply(&self, credential: &Credential, mutation: &Mutation) -> Result<(), RemoteError>;

    /// Read the user's list entry for `remote_id`; `None` when the user has
    /// no entry for it yet.
    async fn fetch_entry(
        &self,
        credential: &Credential,
        remote_id: u64,
        media_kind: MediaKind,
    ) -> Result<Option<RemoteListEntry>, RemoteError>;
}
