use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, Result};

/// Access credential for the remote tracking service.
///
/// The token value is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    access_token: String,
    stored_at: DateTime<Utc>,
}

impl Credential {
    /// Wrap a bearer token. Blank tokens are rejected.
    ///
    /// ```
    /// use core_auth::Credential;
    ///
    /// let credential = Credential::new("abc123").unwrap();
    /// assert_eq!(credential.bearer_header(), "Bearer abc123");
    /// assert!(Credential::new("  ").is_err());
    /// ```
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::issued_at(access_token, Utc::now())
    }

    pub fn issued_at(access_token: impl Into<String>, stored_at: DateTime<Utc>) -> Result<Self> {
        let access_token = access_token.into().trim().to_string();
        if access_token.is_empty() {
            return Err(AuthError::InvalidCredential(
                "access token must not be empty".to_string(),
            ));
        }
        Ok(Self {
            access_token,
            stored_at,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    /// Value for the `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("stored_at", &self.stored_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_trimmed() {
        let credential = Credential::new("  token-value\n").unwrap();
        assert_eq!(credential.access_token(), "token-value");
    }

    #[test]
    fn test_debug_hides_token() {
        let credential = Credential::new("very-secret").unwrap();
        let debug = format!("{:?}", credential);

        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            Credential::new(""),
            Err(AuthError::InvalidCredential(_))
        ));
    }
}
