use crate::remote::RemoteError;
use core_auth::AuthError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Entry {entry_id} not found")]
    EntryNotFound { entry_id: String },

    #[error("Entry {entry_id} is not linked to a remote id")]
    NotLinked { entry_id: String },
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
