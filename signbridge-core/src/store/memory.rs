//! In-memory credential storage implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{CredentialStore, Secret, StoreError, expiry_from_ttl, is_expired};

#[derive(Clone)]
struct Entry {
    value: Secret,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory credential store.
///
/// This store is not persistent; data is lost when the process exits.
/// Expired entries are hidden on read and dropped on the next write.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store with initial (non-expiring) data.
    pub fn with_data(data: HashMap<String, Secret>) -> Self {
        let data = data
            .into_iter()
            .map(|(k, value)| {
                (
                    k,
                    Entry {
                        value,
                        expires_at: None,
                    },
                )
            })
            .collect();
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys_count", &self.data.read().len())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        let data = self.data.read();
        Ok(data
            .get(key)
            .filter(|entry| !is_expired(entry.expires_at))
            .map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        secret: &Secret,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut data = self.data.write();
        data.retain(|_, entry| !is_expired(entry.expires_at));
        data.insert(
            key.to_string(),
            Entry {
                value: secret.clone(),
                expires_at: expiry_from_ttl(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.write().remove(key);
        Ok(())
    }
}
