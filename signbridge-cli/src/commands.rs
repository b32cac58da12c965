//! Command implementations, kept separate from argument parsing so they can
//! be exercised against an in-memory store.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Method;
use signbridge_core::{
    CorrelationId, CredentialStore, Credentials, ProxyConfig, ProxyRequest, ProxyResult,
    RequestProxy, Secret, TokenAuthenticator, TokenProvider, store::keys,
};

pub type CliProxy<S> = RequestProxy<TokenAuthenticator<S>>;

/// Persist backend credentials into `store`.
///
/// Any token cached for `key` is dropped so the next call authenticates
/// with the new secret.
pub async fn configure<S>(store: &S, base_url: &str, key: &str, secret: &str) -> Result<()>
where
    S: CredentialStore + ?Sized,
{
    let credentials = Credentials::new(key, secret, base_url);
    if !credentials.is_configured() {
        bail!("A non-empty key, secret and a valid base URL are required");
    }

    store
        .set(keys::BASE_URL, &Secret::new(base_url.trim()), None)
        .await
        .context("Failed to store base URL")?;
    store
        .set(keys::API_KEY, &Secret::new(credentials.key()), None)
        .await
        .context("Failed to store API key")?;
    store
        .set(keys::API_SECRET, credentials.secret(), None)
        .await
        .context("Failed to store API secret")?;
    store
        .delete(&keys::token(credentials.key()))
        .await
        .context("Failed to clear cached token")?;

    tracing::info!(key = credentials.key(), "Stored backend credentials");
    Ok(())
}

/// Wire a proxy over `store`.
pub async fn open_proxy<S>(config: &ProxyConfig, store: S) -> Result<CliProxy<S>>
where
    S: CredentialStore + 'static,
{
    RequestProxy::from_config(config, store)
        .await
        .context("Failed to initialise request proxy")
}

/// Obtain a bearer token and return it masked for display.
pub async fn authenticate<S>(proxy: &CliProxy<S>) -> Result<String>
where
    S: CredentialStore + 'static,
{
    if !proxy.is_configured() {
        bail!("Credentials are not configured. Run `signbridge configure` first.");
    }

    let token = proxy
        .tokens()
        .ensure_token(&CorrelationId::generate())
        .await
        .context("Authentication failed")?;
    Ok(token.masked())
}

/// Run one proxied call.
///
/// `body` is caller-spelled JSON and is renamed to backend fields before
/// sending.
pub async fn call<S>(
    proxy: &CliProxy<S>,
    method: &str,
    path: &str,
    body: Option<&str>,
    idempotency_key: Option<String>,
) -> Result<ProxyResult>
where
    S: CredentialStore + 'static,
{
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;

    let mut request = ProxyRequest::new(method, path).with_idempotency_key(idempotency_key);
    if let Some(raw) = body {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("--body is not valid JSON")?;
        request = request.with_body(proxy.mapper().map_request(value));
    }

    Ok(proxy.proxy(request).await)
}

/// What `status` reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub configured: bool,
    pub key: Option<String>,
    pub base_url: Option<String>,
    /// Remaining lifetime of the cached token, if one exists.
    pub token_remaining: Option<Duration>,
}

pub async fn status<S>(proxy: &CliProxy<S>) -> StatusReport
where
    S: CredentialStore + 'static,
{
    let credentials = proxy.tokens().credentials();
    let key = Some(credentials.key())
        .filter(|k| !k.is_empty())
        .map(|k| Secret::new(k).masked());

    StatusReport {
        configured: proxy.is_configured(),
        key,
        base_url: credentials.base_url().map(|u| u.to_string()),
        token_remaining: proxy
            .tokens()
            .cached_token()
            .await
            .and_then(|t| t.remaining()),
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.configured {
            writeln!(f, "Credentials: configured")?;
        } else {
            writeln!(f, "Credentials: not configured")?;
        }
        if let Some(key) = &self.key {
            writeln!(f, "  Key:      {}", key)?;
        }
        if let Some(url) = &self.base_url {
            writeln!(f, "  Base URL: {}", url)?;
        }
        match self.token_remaining {
            Some(remaining) => write!(f, "Token: cached, expires in {}s", remaining.as_secs()),
            None => write!(f, "Token: none cached"),
        }
    }
}
