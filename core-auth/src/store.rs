//! Secure credential storage
//!
//! Persists the tracking-service credential through the platform
//! [`SecureStore`]. Token values are never logged.

use crate::error::{AuthError, Result};
use crate::types::Credential;
use bridge_traits::storage::SecureStore;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Credential storage for a single tracking service, addressed by one key in
/// the secure store.
#[derive(Clone)]
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
    key: String,
    event_bus: Option<EventBus>,
}

impl CredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        debug!(key = %key, "Initializing CredentialStore");
        Self {
            secure_store,
            key,
            event_bus: None,
        }
    }

    /// Publish `AuthEvent`s on `event_bus` when the credential changes.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store `credential`, replacing any previous one.
    pub async fn store(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_vec(credential)?;

        self.secure_store
            .set_secret(&self.key, &json)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to store credential");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(key = %self.key, "Credential stored");
        self.publish(AuthEvent::CredentialStored {
            service: self.key.clone(),
        });
        Ok(())
    }

    /// Load the stored credential.
    ///
    /// Corrupted data is deleted and reported as
    /// [`AuthError::CredentialCorrupted`].
    pub async fn load(&self) -> Result<Option<Credential>> {
        let data = self.secure_store.get_secret(&self.key).await.map_err(|e| {
            warn!(key = %self.key, error = %e, "Failed to read credential");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(key = %self.key, "No credential stored");
            return Ok(None);
        };

        match serde_json::from_slice::<Credential>(&data) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored credential is corrupted, removing it");
                if let Err(delete_err) = self.secure_store.delete_secret(&self.key).await {
                    warn!(key = %self.key, error = %delete_err, "Failed to delete corrupted credential");
                }
                Err(AuthError::CredentialCorrupted {
                    key: self.key.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Load the credential, failing with [`AuthError::NotAuthenticated`] when
    /// none is stored.
    pub async fn require(&self) -> Result<Credential> {
        self.load().await?.ok_or(AuthError::NotAuthenticated)
    }

    /// Whether a credential is present. Does not deserialize it.
    pub async fn has_credential(&self) -> Result<bool> {
        self.secure_store
            .has_secret(&self.key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }

    /// Remove the credential. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        self.secure_store
            .delete_secret(&self.key)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to delete credential");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(key = %self.key, "Credential cleared");
        self.publish(AuthEvent::CredentialCleared {
            service: self.key.clone(),
        });
        Ok(())
    }

    fn publish(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is not an error.
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}
