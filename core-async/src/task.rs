//! Task spawning.

pub use tokio::task::{yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the current runtime.
///
/// The spawned task may run on a different thread, so the future must be
/// `Send + 'static`.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
