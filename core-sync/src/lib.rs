//! # Sync Module
//!
//! Delivers local progress to the remote tracking service.
//!
//! ## Components
//!
//! - **Remote Adapter** (`remote`): the contract a tracking service implements,
//!   the tagged [`Mutation`] payloads and the retryable/fatal error split
//! - **Mutation Queue** (`queue`): durable FIFO of undelivered writes whose
//!   drain stops at the first retryable failure
//! - **Sync Coordinator** (`coordinator`): immediate sync, queue replay,
//!   recalibration and the background loop (timer, reconnect, sign-in)

pub mod coordinator;
pub mod error;
pub mod queue;
pub mod remote;

pub use coordinator::{DrainStatus, SyncConfig, SyncCoordinator, SyncHandle, SyncOutcome};
pub use error::{Result, SyncError};
pub use queue::{
    DocumentMutationQueueRepository, DrainOutcome, DrainReport, MutationId, MutationQueue,
    MutationQueueRepository, QueuedMutation, SqliteMutationQueueRepository, QUEUE_DOCUMENT_KEY,
};
pub use remote::{
    Mutation, ProgressUpdate, RemoteAdapter, RemoteError, RemoteListEntry, StatusUpdate,
};
