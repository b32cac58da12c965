//! Credential storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredentialStore`] - Trait for key-value backends with optional TTL
//! - [`MemoryStore`] - In-memory implementation for tests and ephemeral runs
//! - [`FileStore`] - JSON file shared between the CLI and the daemon
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to select a backend
//!
//! # Storage Key Convention
//!
//! Keys follow the pattern `signbridge/{name}`; see [`keys`] for the ones
//! the proxy reads and writes.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use signbridge_core::store::{CredentialStore, MemoryStore, Secret};
//!
//! let store = MemoryStore::new();
//! store
//!     .set("signbridge/api_key", &Secret::new("pk_live_123"), None)
//!     .await?;
//! store
//!     .set("signbridge/token/pk_live_123", &Secret::new("{...}"), Some(Duration::from_secs(3600)))
//!     .await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

mod file;
mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// Well-known store keys.
pub mod keys {
    /// Plugin API key (not secret on its own, but paired with the secret).
    pub const API_KEY: &str = "signbridge/api_key";
    /// Plugin API secret.
    pub const API_SECRET: &str = "signbridge/api_secret";
    /// Backend base URL.
    pub const BASE_URL: &str = "signbridge/base_url";
    /// Stable per-installation client id.
    pub const CLIENT_ID: &str = "signbridge/client_id";

    /// Cached bearer token for a given API key.
    pub fn token(api_key: &str) -> String {
        format!("signbridge/token/{}", api_key)
    }
}

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is wiped when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret holds an empty (or whitespace-only) value.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Masked form suitable for operator output, e.g. `eyJh…9xQ`.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 3..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested entry was not found.
    #[error("entry not found: {key}")]
    NotFound { key: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Abstraction over key-value backends holding credentials and cached tokens.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory storage
/// - [`FileStore`] - JSON file on disk
/// - [`KeyringStore`] (with `keyring-store` feature) - OS keyring
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or its TTL has elapsed.
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Store a value at the given key, overwriting any existing value.
    ///
    /// With `ttl` set, the entry reads as absent once the TTL has elapsed.
    async fn set(&self, key: &str, secret: &Secret, ttl: Option<Duration>)
    -> Result<(), StoreError>;

    /// Delete a value by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        (**self).get(key).await
    }

    async fn set(
        &self,
        key: &str,
        secret: &Secret,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        (**self).set(key, secret, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Box<T> {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        (**self).get(key).await
    }

    async fn set(
        &self,
        key: &str,
        secret: &Secret,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        (**self).set(key, secret, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

/// Convert an optional TTL into an absolute expiry.
pub(crate) fn expiry_from_ttl(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.map(|ttl| {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    })
}

/// Whether an entry with the given expiry should read as absent.
pub(crate) fn is_expired(expires_at: Option<DateTime<Utc>>) -> bool {
    expires_at.is_some_and(|exp| exp <= Utc::now())
}

/// Which backend [`create_store`] should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local memory; nothing survives a restart.
    Memory,
    /// JSON file, shared between processes on the same host.
    #[default]
    File,
    /// OS keyring.
    Keyring,
}

impl std::str::FromStr for StoreBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            other => Err(StoreError::BackendError {
                message: format!("unknown store backend: {}", other),
            }),
        }
    }
}

/// Create a credential store for the requested backend.
///
/// # Backend Selection Logic
///
/// - `File`: opens `path`, or [`FileStore::default_path`] when `None`
/// - `Keyring`: attempts a [`KeyringStore`]; falls back to [`MemoryStore`]
///   with a warning if the keyring is unavailable or the feature is disabled
/// - `Memory`: returns [`MemoryStore`]
pub fn create_store(
    backend: StoreBackend,
    path: Option<PathBuf>,
) -> Result<Box<dyn CredentialStore>, StoreError> {
    match backend {
        StoreBackend::File => {
            let path = match path {
                Some(path) => path,
                None => FileStore::default_path()?,
            };
            tracing::info!(path = %path.display(), "Using file credential store");
            Ok(Box::new(FileStore::open(path)?))
        }
        StoreBackend::Keyring => {
            #[cfg(feature = "keyring-store")]
            match KeyringStore::try_new("signbridge") {
                Ok(store) => {
                    tracing::info!("Using OS keyring for credential storage");
                    return Ok(Box::new(store));
                }
                Err(e) => {
                    tracing::warn!(
                        "Keyring unavailable ({}), falling back to memory store. \
                         Cached tokens will not persist across restarts.",
                        e
                    );
                }
            }

            #[cfg(not(feature = "keyring-store"))]
            tracing::warn!(
                "Keyring storage requested but keyring-store feature not enabled. \
                 Using memory store."
            );

            Ok(Box::new(MemoryStore::new()))
        }
        StoreBackend::Memory => {
            tracing::debug!("Using in-memory credential storage");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}
