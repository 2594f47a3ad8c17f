//! # Authentication Module
//!
//! Credential storage for the remote tracking service.
//!
//! The core never performs the OAuth handshake itself. A host obtains an
//! access token however it likes and hands it to [`CredentialStore`], which
//! persists it through the platform [`SecureStore`](bridge_traits::SecureStore).
//! The sync layer only asks whether a credential is present and, if so,
//! passes it to the remote adapter.

pub mod error;
pub mod store;
pub mod types;

pub use error::{AuthError, Result};
pub use store::CredentialStore;
pub use types::Credential;
