use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The host could not reach the other side at all (DNS, refused, reset).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when the failure means "offline" rather than "the request was bad".
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
