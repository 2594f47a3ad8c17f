//! Error types for the MyAnimeList provider

use bridge_traits::error::BridgeError;
use core_sync::RemoteError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MalError {
    #[error("MyAnimeList rejected the access token")]
    Unauthorized,

    #[error("MyAnimeList API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Option<Duration> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, MalError>;

impl MalError {
    /// Classify a non-2xx response.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 => MalError::Unauthorized,
            404 => MalError::NotFound(message),
            429 => MalError::RateLimitExceeded { retry_after },
            _ => MalError::ApiError {
                status_code: status,
                message,
            },
        }
    }
}

impl From<BridgeError> for MalError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Timeout(msg) => MalError::Timeout(msg),
            other => MalError::NetworkError(other.to_string()),
        }
    }
}

impl From<MalError> for RemoteError {
    fn from(error: MalError) -> Self {
        match error {
            MalError::Unauthorized => RemoteError::Unauthorized,
            MalError::ApiError {
                status_code,
                message,
            } if status_code < 500 => RemoteError::Rejected {
                status: status_code,
                message,
            },
            MalError::ApiError { status_code, .. } => RemoteError::Server {
                status: status_code,
            },
            MalError::RateLimitExceeded { retry_after } => RemoteError::RateLimited { retry_after },
            MalError::NotFound(_) => RemoteError::NotFound,
            MalError::ParseError(message) => RemoteError::Rejected {
                status: 200,
                message,
            },
            MalError::NetworkError(message) => RemoteError::Network(message),
            MalError::Timeout(_) => RemoteError::Timeout,
        }
    }
}
