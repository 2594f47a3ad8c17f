//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the tracker core:
//! - Logging and tracing setup
//! - Configuration and capability injection
//! - Event bus for sync and library notifications
//!
//! Every other core crate depends on this one for its configuration types and
//! the [`events::EventBus`] that hosts subscribe to.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
