//! Bearer token types.
//!
//! This module provides:
//! - [`CachedToken`] - A bearer token with its absolute expiry
//! - [`AuthError`] - Failures of the credential exchange
//! - [`TokenProvider`] - Trait for obtaining a usable bearer token

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::CorrelationId;
use crate::store::{Secret, StoreError};

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Key, secret or base URL missing.
    #[error("credentials are not configured")]
    NotConfigured,

    /// The exchange endpoint could not be reached or timed out.
    #[error("authentication endpoint unreachable after {elapsed:?}: {message}")]
    Unreachable { message: String, elapsed: Duration },

    /// The backend refused the credential exchange.
    #[error("credential exchange rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A 2xx response without a usable `accessToken`.
    #[error("malformed authentication response: {message}")]
    MalformedResponse { message: String },

    /// Storage error while reading or writing the token cache.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// A bearer token with its absolute expiry.
///
/// Serialized as JSON into the credential store so it outlives the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    /// The bearer token value.
    pub token: Secret,

    /// When the backend stops accepting this token.
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: Secret::new(token),
            expires_at,
        }
    }

    /// Whether the token is still usable `margin` from now.
    ///
    /// A token expiring inside the margin counts as expired so that an
    /// in-flight request does not race its expiry.
    pub fn is_usable(&self, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        match Utc::now().checked_add_signed(margin) {
            Some(deadline) => deadline < self.expires_at,
            None => false,
        }
    }

    /// Time left until expiry, or `None` if already expired.
    pub fn remaining(&self) -> Option<Duration> {
        (self.expires_at - Utc::now()).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// Trait for obtaining a bearer token for backend calls.
///
/// The request proxy depends on this seam rather than on
/// [`TokenAuthenticator`](crate::authenticator::TokenAuthenticator) directly.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a usable bearer token, exchanging credentials if the cached one
    /// is missing or about to expire.
    async fn ensure_token(&self, correlation_id: &CorrelationId) -> Result<Secret, AuthError>;

    /// Forget the cached token so the next call exchanges credentials again.
    async fn invalidate(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usable_with_margin() {
        let token = CachedToken::new("t", Utc::now() + chrono::Duration::minutes(10));
        assert!(token.is_usable(Duration::from_secs(60)));
        assert!(!token.is_usable(Duration::from_secs(15 * 60)));
    }

    #[test]
    fn test_expired_token_not_usable() {
        let token = CachedToken::new("t", Utc::now() - chrono::Duration::seconds(1));
        assert!(!token.is_usable(Duration::ZERO));
        assert!(token.remaining().is_none());
    }

    #[test]
    fn test_cached_token_json_shape() {
        let token = CachedToken::new("abc", DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["token"], "abc");
        assert_eq!(json["expires_at"], "2023-11-14T22:13:20Z");
    }
}
