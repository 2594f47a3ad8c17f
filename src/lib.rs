//! Workspace entry crate.
//!
//! Re-exports the tracker façade so host applications can depend on
//! `tracker-workspace` and pick the platform shims through its features
//! instead of wiring each crate individually.

pub use core_service::{CoreError, Result, TrackedChange, TrackerService};
