//! OS keyring-backed credential storage implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};

use super::{CredentialStore, Secret, StoreError, expiry_from_ttl, is_expired};

/// What actually goes into the keyring password slot.
///
/// Platform keyrings have no notion of expiry, so the TTL travels with the value.
#[derive(Serialize, Deserialize)]
struct Envelope {
    value: Secret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// OS keyring-backed credential store.
///
/// This store uses the platform's native keyring service:
/// - macOS: Keychain
/// - Linux: Secret Service API (via libsecret)
/// - Windows: Credential Manager
///
/// # Storage Key Format
///
/// Entries are stored under the keyring service `{service_name}/{key}`
/// with user `signbridge`.
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    /// Try to create a new keyring store.
    ///
    /// Returns an error if the keyring backend is not available on this platform.
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        let probe = format!("{}/__probe__", service_name);
        match Entry::new(&probe, "availability_check") {
            Ok(_) => Ok(Self {
                service_name: service_name.to_string(),
            }),
            Err(e) => Err(StoreError::KeyringUnavailable {
                message: format!("keyring backend not available: {}", e),
            }),
        }
    }

    fn create_entry(&self, key: &str) -> Result<Entry, StoreError> {
        let service = format!("{}/{}", self.service_name, key);
        Entry::new(&service, "signbridge").map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        let entry = self.create_entry(key)?;

        let raw = match entry.get_password() {
            Ok(raw) => raw,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(keyring::Error::Ambiguous(_)) => {
                return Err(StoreError::BackendError {
                    message: format!("ambiguous keyring entry for key: {}", key),
                });
            }
            Err(keyring::Error::PlatformFailure(e)) => {
                return Err(StoreError::BackendError {
                    message: format!("platform keyring failure: {}", e),
                });
            }
            Err(e) => {
                return Err(StoreError::BackendError {
                    message: format!("keyring error: {}", e),
                });
            }
        };

        // Values written by hand (e.g. via the OS keychain UI) are plain strings.
        let envelope = match serde_json::from_str::<Envelope>(&raw) {
            Ok(envelope) => envelope,
            Err(_) => return Ok(Some(Secret::new(raw))),
        };

        if is_expired(envelope.expires_at) {
            let _ = entry.delete_credential();
            return Ok(None);
        }

        Ok(Some(envelope.value))
    }

    async fn set(
        &self,
        key: &str,
        secret: &Secret,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let entry = self.create_entry(key)?;
        let envelope = Envelope {
            value: secret.clone(),
            expires_at: expiry_from_ttl(ttl),
        };
        let raw = serde_json::to_string(&envelope)?;

        entry
            .set_password(&raw)
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to set keyring password: {}", e),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let entry = self.create_entry(key)?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendError {
                message: format!("failed to delete keyring entry: {}", e),
            }),
        }
    }
}
