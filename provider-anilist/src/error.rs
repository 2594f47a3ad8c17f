//! Error types for the AniList provider

use bridge_traits::error::BridgeError;
use core_sync::RemoteError;
use std::time::Duration;
use thiserror::Error;

/// AniList provider errors
#[derive(Error, Debug)]
pub enum AniListError {
    /// Access token missing, expired or revoked
    #[error("AniList rejected the access token")]
    Unauthorized,

    /// API request returned an error
    #[error("AniList API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Option<Duration> },

    /// Media or list entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// GraphQL-level error reported with a successful HTTP status
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

/// Result type for AniList operations
pub type Result<T> = std::result::Result<T, AniListError>;

impl AniListError {
    /// Classify a non-2xx response.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 => AniListError::Unauthorized,
            404 => AniListError::NotFound(message),
            429 => AniListError::RateLimitExceeded { retry_after },
            _ => AniListError::ApiError {
                status_code: status,
                message,
            },
        }
    }
}

impl From<BridgeError> for AniListError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Timeout(msg) => AniListError::Timeout(msg),
            other => AniListError::NetworkError(other.to_string()),
        }
    }
}

impl From<AniListError> for RemoteError {
    fn from(error: AniListError) -> Self {
        match error {
            AniListError::Unauthorized => RemoteError::Unauthorized,
            AniListError::ApiError {
                status_code,
                message,
            } => {
                if status_code >= 500 {
                    RemoteError::Server {
                        status: status_code,
                    }
                } else {
                    RemoteError::Rejected {
                        status: status_code,
                        message,
                    }
                }
            }
            AniListError::RateLimitExceeded { retry_after } => {
                RemoteError::RateLimited { retry_after }
            }
            AniListError::NotFound(_) => RemoteError::NotFound,
            AniListError::GraphQl(message) => RemoteError::Rejected {
                status: 400,
                message,
            },
            // A 2xx body we cannot read is not fixed by sending it again.
            AniListError::ParseError(message) => RemoteError::Rejected {
                status: 200,
                message,
            },
            AniListError::NetworkError(message) => RemoteError::Network(message),
            AniListError::Timeout(_) => RemoteError::Timeout,
        }
    }
}
