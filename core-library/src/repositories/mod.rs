//! # Repository Pattern Implementation
//!
//! Each persisted collection has a repository trait with two
//! implementations:
//!
//! - SQLite (`Sqlite*Repository`): indexed tables, one row per record
//! - Single document (`Document*Repository`): one JSON document per
//!   collection under a well-known key in a
//!   [`SettingsStore`](bridge_traits::SettingsStore)
//!
//! ## Available Repositories
//!
//! - `EntryRepository` - Progress entries
//! - `CategoryRepository` - User categories

pub mod category;
pub mod entry;

pub use category::{
    CategoryRepository, DocumentCategoryRepository, SqliteCategoryRepository,
    CATEGORIES_DOCUMENT_KEY,
};
pub use entry::{
    DocumentEntryRepository, EntryRepository, SqliteEntryRepository, ENTRIES_DOCUMENT_KEY,
};
