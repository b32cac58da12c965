//! Credential exchange and bearer token caching.
//!
//! [`TokenAuthenticator`] is the [`TokenProvider`] used by the request proxy.
//!
//! # Features
//!
//! - Reuses the cached token while it is outside the safety margin
//! - Exchanges key/secret at `POST {base_url}/authenticate` otherwise
//! - Persists the new token in the [`CredentialStore`] with a TTL equal to its
//!   remaining lifetime, so the record self-expires
//!
//! Concurrent callers that all miss the cache each perform an exchange. The
//! exchange endpoint is idempotent and cheap, so no single-flight guard is used.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use signbridge_core::{
//!     ClientIdentity, CorrelationId, Credentials, MemoryStore, ProxyConfig,
//!     TokenAuthenticator, TokenProvider, build_http_client,
//! };
//!
//! let config = ProxyConfig::default();
//! let credentials = Credentials::new("pk_live", "sk_live", "https://sign.example.com/api");
//! let identity = ClientIdentity::new("site-1", "signbridge");
//! let http = build_http_client(&config)?;
//!
//! let auth = TokenAuthenticator::new(MemoryStore::new(), credentials, identity, http, &config);
//! let token = auth.ensure_token(&CorrelationId::generate()).await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::{
    config::ProxyConfig,
    model::{ClientIdentity, CorrelationId, Credentials, headers},
    normalize::extract_message,
    store::{CredentialStore, Secret, keys},
    token::{AuthError, CachedToken, TokenProvider},
};

/// Path of the credential exchange endpoint, relative to the base URL.
pub const AUTHENTICATE_PATH: &str = "authenticate";

/// Timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Successful exchange payload.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    access_token: Option<String>,

    #[serde(rename = "expiresAt", alias = "expires_at")]
    expires_at: Option<Value>,

    #[serde(rename = "expiresIn", alias = "expires_in")]
    expires_in: Option<Value>,
}

/// Token authenticator backed by a [`CredentialStore`].
///
/// # Type Parameters
///
/// * `S` - The store holding the cached token record
pub struct TokenAuthenticator<S: CredentialStore> {
    store: S,
    credentials: Credentials,
    identity: ClientIdentity,
    http_client: reqwest::Client,
    margin: Duration,
    default_ttl: Duration,
}

impl<S: CredentialStore> TokenAuthenticator<S> {
    /// Create a new authenticator.
    ///
    /// Margin and default TTL come from `config`.
    pub fn new(
        store: S,
        credentials: Credentials,
        identity: ClientIdentity,
        http_client: reqwest::Client,
        config: &ProxyConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            identity,
            http_client,
            margin: config.token_margin(),
            default_ttl: config.default_token_ttl(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn cache_key(&self) -> String {
        keys::token(self.credentials.key())
    }

    /// Read the cached token record, if any.
    ///
    /// Unreadable records are reported and treated as a miss.
    pub async fn cached_token(&self) -> Option<CachedToken> {
        let raw = match self.store.get(&self.cache_key()).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cached token, re-authenticating");
                return None;
            }
        };

        match serde_json::from_str::<CachedToken>(raw.expose()) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable cached token record");
                None
            }
        }
    }

    /// Persist a freshly issued token with a TTL equal to its remaining lifetime.
    async fn persist(&self, token: &CachedToken) {
        let Some(ttl) = token.remaining() else {
            tracing::debug!("Issued token already expired, not caching");
            return;
        };

        let record = match serde_json::to_string(token) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize token record");
                return;
            }
        };

        if let Err(e) = self
            .store
            .set(&self.cache_key(), &Secret::new(record), Some(ttl))
            .await
        {
            tracing::warn!(error = %e, "Failed to cache access token");
        }
    }

    /// Perform the credential exchange.
    async fn exchange(&self, correlation_id: &CorrelationId) -> Result<CachedToken, AuthError> {
        let url = self
            .credentials
            .endpoint(AUTHENTICATE_PATH)
            .ok_or(AuthError::NotConfigured)?;

        let mut request = self
            .http_client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(headers::API_KEY, self.credentials.key())
            .header(headers::API_SECRET, self.credentials.secret().expose())
            .header(headers::CORRELATION_ID, correlation_id.as_str());
        for (name, value) in self.identity.header_pairs() {
            request = request.header(name, value);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| AuthError::Unreachable {
            message: e.to_string(),
            elapsed: started.elapsed(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::Unreachable {
            message: format!("failed to read response body: {}", e),
            elapsed: started.elapsed(),
        })?;

        if !status.is_success() {
            let message = extract_message(&body)
                .unwrap_or_else(|| fallback_message(status, &body));
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: AuthResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::MalformedResponse {
                message: format!("invalid JSON: {}", e),
            })?;

        let access_token = parsed
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AuthError::MalformedResponse {
                message: "missing accessToken".to_string(),
            })?;

        let lifetime = parsed.expires_in.as_ref().and_then(|value| {
            let lifetime = parse_lifetime(value);
            if lifetime.is_none() {
                tracing::debug!(expires_in = %value, "Ignoring unreadable expiresIn");
            }
            lifetime
        });

        let expires_at = parsed
            .expires_at
            .as_ref()
            .and_then(parse_expiry)
            .or_else(|| lifetime.and_then(|lifetime| add_duration(Utc::now(), lifetime)))
            .or_else(|| add_duration(Utc::now(), self.default_ttl))
            .ok_or_else(|| AuthError::MalformedResponse {
                message: "token expiry out of range".to_string(),
            })?;

        Ok(CachedToken::new(access_token, expires_at))
    }
}

#[async_trait]
impl<S: CredentialStore + 'static> TokenProvider for TokenAuthenticator<S> {
    async fn ensure_token(&self, correlation_id: &CorrelationId) -> Result<Secret, AuthError> {
        if !self.credentials.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        if let Some(cached) = self.cached_token().await {
            if cached.is_usable(self.margin) {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    expires_at = %cached.expires_at,
                    "Using cached access token"
                );
                return Ok(cached.token);
            }
            tracing::debug!(
                correlation_id = %correlation_id,
                expires_at = %cached.expires_at,
                "Cached access token inside expiry margin"
            );
        }

        let started = Instant::now();
        match self.exchange(correlation_id).await {
            Ok(token) => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    expires_at = %token.expires_at,
                    "Obtained new access token"
                );
                self.persist(&token).await;
                Ok(token.token)
            }
            Err(e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Credential exchange failed"
                );
                Err(e)
            }
        }
    }

    async fn invalidate(&self) {
        if let Err(e) = self.store.delete(&self.cache_key()).await {
            tracing::warn!(error = %e, "Failed to clear cached access token");
        } else {
            tracing::debug!("Cleared cached access token");
        }
    }
}

/// Parse `expiresAt` as RFC 3339 or a unix timestamp (seconds or millis).
fn parse_expiry(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                return Some(dt.with_timezone(&Utc));
            }
            s.trim().parse::<i64>().ok().and_then(from_unix)
        }
        Value::Number(n) => n.as_i64().and_then(from_unix),
        _ => None,
    }
}

/// Parse `expiresIn` seconds, given as a JSON number or a numeric string.
fn parse_lifetime(value: &Value) -> Option<Duration> {
    let secs = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    Duration::try_from_secs_f64(secs).ok()
}

fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    if ts.abs() >= MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(ts)
    } else {
        DateTime::from_timestamp(ts, 0)
    }
}

fn add_duration(base: DateTime<Utc>, d: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| base.checked_add_signed(d))
}

fn fallback_message(status: reqwest::StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 200 {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("authentication failed")
        .to_string()
}
