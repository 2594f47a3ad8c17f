//! # AniList Provider
//!
//! Implements the `RemoteAdapter` contract for the AniList GraphQL API.
//!
//! ## Overview
//!
//! This module provides:
//! - Progress and status writes via the `SaveMediaListEntry` mutation
//! - Reads of the viewer's list entry for recalibration
//! - Classification of HTTP statuses and GraphQL errors into retryable and
//!   fatal [`RemoteError`](core_sync::RemoteError)s
//!
//! Requests go through the host's `HttpClient` bridge and are attempted once;
//! retrying is the mutation queue's job.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{AniListAdapter, DEFAULT_ENDPOINT};
pub use error::{AniListError, Result};
