//! Proxy configuration.
//!
//! [`ProxyConfig`] is the `[backend]` table of the daemon's TOML file and is
//! also built directly by the CLI. Every field has a default so a partial
//! file deserializes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default backend request timeout. Signing operations can be slow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout for backend calls.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Tokens expiring within this many seconds are treated as already expired.
pub const DEFAULT_TOKEN_MARGIN_SECS: u64 = 60;

/// Lifetime assumed for a token when the backend omits `expiresAt`.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Default value of the request-source header.
pub const DEFAULT_REQUEST_SOURCE: &str = "signbridge";

/// Backend error codes that indicate an admin must reconfigure something.
pub const DEFAULT_CONFIG_ERROR_CODES: &[&str] =
    &["INTEGRATION_NOT_CONFIGURED", "TENANT_NOT_CONFIGURED"];

/// Settings for the token authenticator and request proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Backend base URL. Falls back to the credential store when unset.
    pub base_url: Option<String>,

    /// Plugin API key. Falls back to the credential store when unset.
    pub api_key: Option<String>,

    /// Plugin API secret. Falls back to the credential store when unset.
    #[serde(skip_serializing)]
    pub api_secret: Option<String>,

    /// Overall timeout for a backend call, in seconds.
    pub timeout_secs: u64,

    /// Connect timeout for a backend call, in seconds.
    pub connect_timeout_secs: u64,

    /// Safety margin applied to cached token expiry, in seconds.
    pub token_margin_secs: u64,

    /// Token lifetime assumed when the backend omits `expiresAt`, in seconds.
    pub default_token_ttl_secs: u64,

    /// Fixed per-installation client id. Generated and persisted when unset.
    pub client_id: Option<String>,

    /// Value sent in the request-source header.
    pub request_source: String,

    /// Backend error codes surfaced as 400 instead of a 5xx.
    pub config_error_codes: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            api_secret: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            token_margin_secs: DEFAULT_TOKEN_MARGIN_SECS,
            default_token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            client_id: None,
            request_source: DEFAULT_REQUEST_SOURCE.to_string(),
            config_error_codes: DEFAULT_CONFIG_ERROR_CODES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn token_margin(&self) -> Duration {
        Duration::from_secs(self.token_margin_secs)
    }

    pub fn default_token_ttl(&self) -> Duration {
        Duration::from_secs(self.default_token_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.token_margin(), Duration::from_secs(60));
        assert_eq!(config.default_token_ttl(), Duration::from_secs(3600));
        assert!(
            config
                .config_error_codes
                .contains(&"INTEGRATION_NOT_CONFIGURED".to_string())
        );
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: ProxyConfig = serde_json::from_str(
            r#"{"base_url": "https://sign.example.com/api", "timeout_secs": 5}"#,
        )
        .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://sign.example.com/api"));
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.request_source, "signbridge");
    }

    #[test]
    fn test_secret_not_serialized() {
        let config = ProxyConfig {
            api_secret: Some("hunter2".to_string()),
            ..ProxyConfig::default()
        };
        let out = serde_json::to_string(&config).unwrap();
        assert!(!out.contains("hunter2"));
    }
}
