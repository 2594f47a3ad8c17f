//! # Event Bus System
//!
//! Typed, broadcast events that let the UI observe the tracker without
//! polling: entry updates, sync confirmations, queued retries, drain passes.
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Entry Store  ├──────────────>│           │     subscribe    ┌────────────┐
//! └──────────────┘               │ EventBus  ├─────────────────>│ UI / Host  │
//! ┌──────────────┐     emit      │ (broadcast│                  └────────────┘
//! │ Sync Coord.  ├──────────────>│  channel) │
//! └──────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::EntrySynced {
//!     entry_id: "154587".to_string(),
//!     remote_id: 154587,
//!     progress: 12,
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Progress synced");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell `n` events behind; it can
//!   keep receiving.
//! - **`RecvError::Closed`**: every sender is gone; treat as shutdown.
//!
//! Emitting with no subscribers returns an error. Producers in this workspace
//! ignore it: nobody listening is a normal state.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Credential lifecycle for the tracking service
    Auth(AuthEvent),
    /// Remote synchronization
    Sync(SyncEvent),
    /// Local entry store changes
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::EntryRejected { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::EntryQueued { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::EntrySynced { .. })
            | CoreEvent::Sync(SyncEvent::DrainCompleted { .. })
            | CoreEvent::Auth(AuthEvent::CredentialStored { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A credential for `service` was saved; queued work can now drain.
    CredentialStored { service: String },
    /// The credential for `service` was removed (sign-out).
    CredentialCleared { service: String },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::CredentialStored { .. } => "Credential stored",
            AuthEvent::CredentialCleared { .. } => "Credential cleared",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// The remote service confirmed the entry's current progress.
    EntrySynced {
        entry_id: String,
        remote_id: u64,
        progress: u32,
    },
    /// A write could not be delivered and waits in the mutation queue.
    EntryQueued {
        entry_id: String,
        remote_id: u64,
        progress: u32,
        /// Short failure description, e.g. "offline" or "HTTP 503".
        reason: String,
    },
    /// The remote service rejected the write; the entry is in `Error` and
    /// will not be retried until the next local mutation.
    EntryRejected { entry_id: String, message: String },
    /// A queue drain pass began.
    DrainStarted { pending: usize },
    /// A queue drain pass ended.
    DrainCompleted {
        applied: usize,
        abandoned: usize,
        /// Items left in the queue (non-zero when the pass stopped early).
        remaining: usize,
    },
    /// Local state was reconciled against a fresh remote read.
    Recalibrated {
        entry_id: String,
        local_progress: u32,
        remote_progress: u32,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::EntrySynced { .. } => "Progress synced",
            SyncEvent::EntryQueued { .. } => "Progress queued for retry",
            SyncEvent::EntryRejected { .. } => "Progress rejected by remote",
            SyncEvent::DrainStarted { .. } => "Queue drain started",
            SyncEvent::DrainCompleted { .. } => "Queue drain completed",
            SyncEvent::Recalibrated { .. } => "Entry recalibrated",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// Progress or status changed locally.
    EntryUpdated {
        entry_id: String,
        progress: u32,
        status: String,
    },
    /// An entry was bound to a remote id, possibly absorbing `previous_id`.
    EntryLinked {
        entry_id: String,
        remote_id: u64,
        previous_id: Option<String>,
    },
    /// Library membership toggled.
    MembershipChanged { entry_id: String, in_library: bool },
    /// Entry deleted explicitly.
    EntryRemoved { entry_id: String },
    /// Category created, renamed or deleted.
    CategoryChanged {
        category_id: String,
        /// "created", "renamed" or "deleted"
        change_type: String,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::EntryUpdated { .. } => "Entry updated",
            LibraryEvent::EntryLinked { .. } => "Entry linked to remote",
            LibraryEvent::MembershipChanged { .. } => "Library membership changed",
            LibraryEvent::EntryRemoved { .. } => "Entry removed",
            LibraryEvent::CategoryChanged { .. } => "Category changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every clone publishes to the same
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event, returning how many subscribers received it.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates an independent receiver for all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let sync_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        use broadcast::error::TryRecvError;

        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
