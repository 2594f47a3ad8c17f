//! Async runtime facade for the tracker core.
//!
//! Every core-* and provider-* crate goes through this crate instead of
//! depending on Tokio directly, so the executor can be swapped or shimmed in
//! one place.
//!
//! # Modules
//!
//! - `task`: Task spawning
//! - `time`: Sleep, intervals and timeouts
//! - `sync`: Async-aware locks and channels
//! - `cancel`: Cooperative cancellation for background loops
//! - `runtime`: Runtime construction for hosts that do not own one
//! - [`select!`]: Wait on several branches, as used by background loops
//!
//! ```rust
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = core_async::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod cancel;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use cancel::CancellationToken;
pub use tokio::select;
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
