//! Secure Credential Storage

use async_trait::async_trait;
#[cfg(feature = "secure-store")]
use bridge_traits::error::BridgeError;
use bridge_traits::{error::Result, storage::SecureStore};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Keyring-based secure storage implementation
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service (libsecret)
///
/// The keychain cannot enumerate entries, so `list_keys` is always empty and
/// `clear_all` is unsupported.
#[cfg(feature = "secure-store")]
pub struct KeyringSecureStore {
    service_name: String,
}

#[cfg(feature = "secure-store")]
impl KeyringSecureStore {
    pub const DEFAULT_SERVICE: &'static str = "anime-tracker";

    pub fn new() -> Self {
        Self::with_service_name(Self::DEFAULT_SERVICE)
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service_name, key).map_err(Self::map_keyring_error)
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        BridgeError::OperationFailed(format!("Keyring error: {}", e))
    }
}

#[cfg(feature = "secure-store")]
impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "secure-store")]
#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        // Keyring only stores strings.
        self.entry(key)?
            .set_password(&STANDARD.encode(value))
            .map_err(Self::map_keyring_error)?;

        debug!(key = key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        match self.entry(key)?.get_password() {
            Ok(encoded) => {
                let decoded = STANDARD.decode(encoded).map_err(|e| {
                    BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))
                })?;
                Ok(Some(decoded))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(key = key, "Deleted secret from keyring");
                Ok(())
            }
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn clear_all(&self) -> Result<()> {
        Err(BridgeError::NotAvailable(
            "keyring cannot enumerate entries; delete keys individually".to_string(),
        ))
    }
}

/// Process-local secret store.
///
/// Secrets vanish on exit. Used by headless hosts that hand the core a token
/// per session, and by tests.
#[derive(Default)]
pub struct MemorySecureStore {
    secrets: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.secrets
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.secrets.lock().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.secrets.lock().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.secrets.lock().await.keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        self.secrets.lock().await.clear();
        Ok(())
    }
}
