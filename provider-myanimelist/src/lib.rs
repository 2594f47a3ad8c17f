//! # MyAnimeList Provider
//!
//! Implements the `RemoteAdapter` contract for the MyAnimeList v2 REST API.
//!
//! Writes are `PATCH /{anime|manga}/{id}/my_list_status` with a form body;
//! reads ask for the `my_list_status` field of one media. Statuses are
//! translated between the tracker's [`ListStatus`](core_library::ListStatus)
//! and MyAnimeList's vocabulary in [`types`].
//!
//! Like the AniList provider, every request is attempted once and failures
//! are classified for the mutation queue.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{MyAnimeListAdapter, DEFAULT_API_BASE};
pub use error::{MalError, Result};
