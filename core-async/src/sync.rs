//! Synchronization primitives.
//!
//! All primitives are async-aware: holding a `Mutex` guard across an `.await`
//! never blocks the executor. `Mutex::try_lock` is what the sync coordinator
//! uses to turn a second concurrent drain request into a no-op.

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OwnedMutexGuard, RwLock,
    RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit, TryLockError,
};
