//! Cooperative cancellation.
//!
//! Long-running loops (the periodic queue drain, the connectivity listener)
//! select on a [`CancellationToken`] so the host can stop them without
//! aborting an in-flight remote call.

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
