//! # Library Management Module
//!
//! Owns the persisted progress entries and user categories.
//!
//! ## Overview
//!
//! - [`store::EntryStore`]: in-memory index with a monotonic merge policy,
//!   written through to an [`repositories::EntryRepository`]
//! - [`categories::CategoryStore`]: user categories and the default-category
//!   preference
//! - SQLite schema and connection pooling ([`db`]) for the indexed backend;
//!   the single-document backend stores everything in a
//!   [`SettingsStore`](bridge_traits::SettingsStore)

pub mod categories;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use categories::CategoryStore;
pub use error::{LibraryError, Result};
pub use models::{
    CachedMetadata, Category, EntryId, LinkRequest, ListStatus, MediaKind, ProgressEntry,
    ProgressPatch, Provenance, RemoteSnapshot, SyncState,
};
pub use store::EntryStore;
