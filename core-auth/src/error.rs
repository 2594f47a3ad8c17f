use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Stored credential under '{key}' is corrupted: {reason}")]
    CredentialCorrupted { key: String, reason: String },

    #[error("Credential serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Not authenticated")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, AuthError>;
