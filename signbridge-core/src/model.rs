//! Domain model types for Signbridge.
//!
//! This module defines the core types used throughout Signbridge:
//! - [`Credentials`] - The plugin's key/secret pair and backend base URL
//! - [`CorrelationId`] - Per-request id threaded through headers and logs
//! - [`ClientIdentity`] - Values for the client identification headers

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ProxyConfig;
use crate::store::{CredentialStore, Secret, StoreError, keys};

/// Header names sent to the backend.
pub mod headers {
    pub const API_KEY: &str = "X-Api-Key";
    pub const API_SECRET: &str = "X-Api-Secret";
    pub const CORRELATION_ID: &str = "X-Correlation-Id";
    pub const IDEMPOTENCY_KEY: &str = "X-Idempotency-Key";
    pub const REQUEST_SOURCE: &str = "X-Request-Source";
    pub const CLIENT_VERSION: &str = "X-Client-Version";
    pub const CLIENT_ID: &str = "X-Client-Id";
}

/// The plugin's long-lived credentials.
///
/// Built once at startup. An incomplete set is still a valid value: the
/// proxy reports `NotConfigured` for it instead of failing construction.
#[derive(Clone)]
pub struct Credentials {
    key: String,
    secret: Secret,
    base_url: Option<Url>,
}

impl Credentials {
    /// Create credentials from raw values.
    ///
    /// An unparsable `base_url` leaves the credentials unconfigured.
    pub fn new(key: impl Into<String>, secret: impl Into<String>, base_url: &str) -> Self {
        let base_url = match Url::parse(base_url.trim()) {
            Ok(url) => Some(url),
            Err(e) => {
                if !base_url.trim().is_empty() {
                    tracing::warn!(base_url, error = %e, "Ignoring invalid backend base URL");
                }
                None
            }
        };

        Self {
            key: key.into().trim().to_string(),
            secret: Secret::new(secret.into().trim()),
            base_url,
        }
    }

    /// Resolve credentials from configuration, falling back to the store.
    ///
    /// Explicit configuration values win over stored ones.
    pub async fn resolve<S>(config: &ProxyConfig, store: &S) -> Result<Self, StoreError>
    where
        S: CredentialStore + ?Sized,
    {
        let key = match non_blank(config.api_key.as_deref()) {
            Some(key) => key.to_string(),
            None => stored(store, keys::API_KEY).await?,
        };
        let secret = match non_blank(config.api_secret.as_deref()) {
            Some(secret) => secret.to_string(),
            None => stored(store, keys::API_SECRET).await?,
        };
        let base_url = match non_blank(config.base_url.as_deref()) {
            Some(url) => url.to_string(),
            None => stored(store, keys::BASE_URL).await?,
        };

        Ok(Self::new(key, secret, &base_url))
    }

    /// Both key and secret present, and a usable base URL.
    pub fn is_configured(&self) -> bool {
        !self.key.is_empty() && !self.secret.is_blank() && self.base_url.is_some()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Join a backend path onto the base URL, keeping any base path prefix.
    ///
    /// `endpoint("/authenticate")` on `https://host/api/v1` yields
    /// `https://host/api/v1/authenticate`.
    pub fn endpoint(&self, path: &str) -> Option<Url> {
        let base = self.base_url.as_ref()?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).ok()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &self.secret)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn stored<S>(store: &S, key: &str) -> Result<String, StoreError>
where
    S: CredentialStore + ?Sized,
{
    Ok(store
        .get(key)
        .await?
        .map(|s| s.expose().to_string())
        .unwrap_or_default())
}

/// Longest caller-supplied correlation id or idempotency key.
const MAX_CALLER_ID_LEN: usize = 128;

/// Non-empty, at most 128 chars from `[A-Za-z0-9._:-]`.
fn is_safe_caller_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CALLER_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
}

/// Whether an idempotency key may be forwarded to the backend as a header.
pub fn is_valid_idempotency_key(key: &str) -> bool {
    is_safe_caller_id(key)
}

/// Identifier threaded through every outbound header and log line of one
/// inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Honour the caller's id when it is safe to echo into headers and logs,
    /// otherwise generate one.
    ///
    /// # Examples
    ///
    /// ```
    /// use signbridge_core::CorrelationId;
    ///
    /// let id = CorrelationId::from_caller(Some("req-42"));
    /// assert_eq!(id.as_str(), "req-42");
    ///
    /// let generated = CorrelationId::from_caller(Some("bad id\n"));
    /// assert_ne!(generated.as_str(), "bad id\n");
    /// ```
    pub fn from_caller(supplied: Option<&str>) -> Self {
        match supplied.map(str::trim) {
            Some(id) if is_safe_caller_id(id) => Self(id.to_string()),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values for the client identification headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Stable per-installation id.
    pub client_id: String,
    /// Version of this client.
    pub version: String,
    /// Request-source label.
    pub source: String,
}

impl ClientIdentity {
    /// Build an identity with the crate version.
    pub fn new(client_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            source: source.into(),
        }
    }

    /// Resolve the client id from configuration, then the store; generate and
    /// persist one on first run.
    pub async fn resolve<S>(config: &ProxyConfig, store: &S) -> Result<Self, StoreError>
    where
        S: CredentialStore + ?Sized,
    {
        if let Some(id) = non_blank(config.client_id.as_deref()) {
            return Ok(Self::new(id, config.request_source.clone()));
        }

        if let Some(id) = store.get(keys::CLIENT_ID).await? {
            if !id.is_blank() {
                return Ok(Self::new(id.expose(), config.request_source.clone()));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        store.set(keys::CLIENT_ID, &Secret::new(id.clone()), None).await?;
        tracing::info!(client_id = %id, "Generated installation client id");

        Ok(Self::new(id, config.request_source.clone()))
    }

    /// Header pairs identifying this client.
    pub fn header_pairs(&self) -> [(&'static str, &str); 3] {
        [
            (headers::REQUEST_SOURCE, self.source.as_str()),
            (headers::CLIENT_VERSION, self.version.as_str()),
            (headers::CLIENT_ID, self.client_id.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_credentials_configured() {
        let creds = Credentials::new("pk", "sk", "https://sign.example.com");
        assert!(creds.is_configured());

        assert!(!Credentials::new("", "sk", "https://sign.example.com").is_configured());
        assert!(!Credentials::new("pk", "  ", "https://sign.example.com").is_configured());
        assert!(!Credentials::new("pk", "sk", "not a url").is_configured());
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = Credentials::new("pk", "very-secret", "https://sign.example.com");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("pk"));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let creds = Credentials::new("pk", "sk", "https://sign.example.com/api/v1/");
        assert_eq!(
            creds.endpoint("/authenticate").unwrap().as_str(),
            "https://sign.example.com/api/v1/authenticate"
        );
        assert_eq!(
            creds.endpoint("signing-requests/42").unwrap().as_str(),
            "https://sign.example.com/api/v1/signing-requests/42"
        );
    }

    #[tokio::test]
    async fn test_resolve_prefers_config_over_store() {
        let store = MemoryStore::new();
        store
            .set(keys::API_KEY, &Secret::new("stored-key"), None)
            .await
            .unwrap();
        store
            .set(keys::API_SECRET, &Secret::new("stored-secret"), None)
            .await
            .unwrap();
        store
            .set(keys::BASE_URL, &Secret::new("https://stored.example.com"), None)
            .await
            .unwrap();

        let config = ProxyConfig {
            api_key: Some("config-key".to_string()),
            ..ProxyConfig::default()
        };
        let creds = Credentials::resolve(&config, &store).await.unwrap();

        assert_eq!(creds.key(), "config-key");
        assert_eq!(creds.secret().expose(), "stored-secret");
        assert_eq!(creds.base_url().unwrap().host_str(), Some("stored.example.com"));
    }

    #[tokio::test]
    async fn test_resolve_empty_store_is_unconfigured() {
        let store = MemoryStore::new();
        let creds = Credentials::resolve(&ProxyConfig::default(), &store)
            .await
            .unwrap();
        assert!(!creds.is_configured());
    }

    #[test]
    fn test_correlation_id_rules() {
        assert_eq!(CorrelationId::from_caller(Some(" abc-123 ")).as_str(), "abc-123");

        let long = "a".repeat(129);
        assert_ne!(CorrelationId::from_caller(Some(&long)).as_str(), long);
        assert_ne!(CorrelationId::from_caller(Some("")).as_str(), "");
        assert_ne!(CorrelationId::from_caller(Some("a b")).as_str(), "a b");

        let a = CorrelationId::from_caller(None);
        let b = CorrelationId::from_caller(None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_idempotency_key_rules() {
        assert!(is_valid_idempotency_key("order-42:attempt.1"));
        assert!(!is_valid_idempotency_key(""));
        assert!(!is_valid_idempotency_key("idem\nkey"));
        assert!(!is_valid_idempotency_key("idem key"));
        assert!(!is_valid_idempotency_key(&"k".repeat(129)));
    }

    #[tokio::test]
    async fn test_client_identity_generated_once() {
        let store = MemoryStore::new();
        let config = ProxyConfig::default();

        let first = ClientIdentity::resolve(&config, &store).await.unwrap();
        let second = ClientIdentity::resolve(&config, &store).await.unwrap();

        assert_eq!(first.client_id, second.client_id);
        assert_eq!(first.source, "signbridge");
        assert_eq!(first.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_client_identity_from_config() {
        let store = MemoryStore::new();
        let config = ProxyConfig {
            client_id: Some("site-7".to_string()),
            ..ProxyConfig::default()
        };

        let identity = ClientIdentity::resolve(&config, &store).await.unwrap();
        assert_eq!(identity.client_id, "site-7");
        assert!(store.get(keys::CLIENT_ID).await.unwrap().is_none());
    }
}
