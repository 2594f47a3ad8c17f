//! Storage Abstractions
//!
//! Secure credential storage and key-value settings storage. The settings
//! store doubles as the backend for the single-document persistence format,
//! where a whole logical store is one JSON string under a well-known key.

use async_trait::async_trait;

use crate::error::Result;

/// Secure storage for secrets such as tracking-service access tokens.
///
/// # Platform Support
///
/// - **Desktop**: OS keychain via the `keyring` crate
/// - **Mobile**: Keychain / Keystore, injected by the shell
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>>;

    async fn clear_all(&self) -> Result<()>;
}

/// Persistent key-value settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>>;

    async fn clear_all(&self) -> Result<()>;
}
