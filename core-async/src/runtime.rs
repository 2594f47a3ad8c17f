//! Runtime utilities for hosts that do not already drive an executor.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Builds a multi-threaded runtime with all drivers enabled.
pub fn build() -> std::io::Result<Runtime> {
    Builder::new_multi_thread().enable_all().build()
}

/// Runs the provided future to completion on a fresh current-thread runtime.
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
