//! Authenticated request proxy.
//!
//! [`RequestProxy`] forwards a caller's request to the backend with the
//! bearer token, client identification and correlation headers attached,
//! and turns whatever comes back into a [`ProxyResult`].
//!
//! The proxy never retries. Retrying is the caller's decision, guided by
//! [`Failure::is_retryable`].

use std::time::Duration;

use reqwest::{
    Method,
    header::{self, HeaderMap, HeaderName, HeaderValue},
};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::{
    authenticator::TokenAuthenticator,
    config::ProxyConfig,
    error::SignbridgeError,
    mapping::FieldMapper,
    model::{ClientIdentity, CorrelationId, Credentials, headers, is_valid_idempotency_key},
    normalize::{Failure, FailureKind, Normalizer},
    store::CredentialStore,
    token::TokenProvider,
};

/// Caller headers that are never forwarded as given. Everything the proxy
/// sets itself is here, so a caller value can neither override nor repeat it.
const RESERVED_HEADERS: &[&str] = &[
    "authorization",
    "x-correlation-id",
    "x-api-key",
    "x-api-secret",
    "host",
    "content-length",
    "content-type",
    "accept",
    "x-idempotency-key",
    "x-request-source",
    "x-client-version",
    "x-client-id",
];

/// Build the HTTP client shared by the authenticator and the proxy.
pub fn build_http_client(config: &ProxyConfig) -> Result<reqwest::Client, SignbridgeError> {
    Ok(reqwest::Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(concat!("signbridge/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// A request to forward to the backend.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub correlation_id: Option<String>,
    pub idempotency_key: Option<String>,
}

impl ProxyRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            correlation_id: None,
            idempotency_key: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Caller-supplied correlation id; replaced by a generated one if unusable.
    pub fn with_correlation_id(mut self, id: Option<impl Into<String>>) -> Self {
        self.correlation_id = id.map(Into::into);
        self
    }

    /// Key the backend uses to deduplicate retried creation calls.
    ///
    /// Blank keys are dropped. Other keys are checked when the request is
    /// sent.
    pub fn with_idempotency_key(mut self, key: Option<impl Into<String>>) -> Self {
        self.idempotency_key = key
            .map(Into::into)
            .map(|k: String| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self
    }
}

/// A successful backend response, already field-mapped.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Value,
    pub correlation_id: CorrelationId,
}

/// Outcome of a proxied call.
pub type ProxyResult = Result<ProxyResponse, Failure>;

/// The authenticated proxy.
///
/// # Type Parameters
///
/// * `T` - Source of bearer tokens, normally [`TokenAuthenticator`]
pub struct RequestProxy<T: TokenProvider> {
    tokens: T,
    credentials: Credentials,
    identity: ClientIdentity,
    http_client: reqwest::Client,
    normalizer: Normalizer,
    mapper: FieldMapper,
    timeout: Duration,
}

impl<S: CredentialStore + 'static> RequestProxy<TokenAuthenticator<S>> {
    /// Wire a proxy from configuration and a credential store.
    ///
    /// Resolves credentials and the installation client id, builds the shared
    /// HTTP client and a [`TokenAuthenticator`] over `store`.
    pub async fn from_config(config: &ProxyConfig, store: S) -> Result<Self, SignbridgeError> {
        let credentials = Credentials::resolve(config, &store).await?;
        let identity = ClientIdentity::resolve(config, &store).await?;
        let http_client = build_http_client(config)?;

        if !credentials.is_configured() {
            tracing::warn!("Signing backend credentials are not configured; calls will fail");
        }

        let tokens = TokenAuthenticator::new(
            store,
            credentials.clone(),
            identity.clone(),
            http_client.clone(),
            config,
        );

        Ok(Self::new(tokens, credentials, identity, http_client, config))
    }
}

impl<T: TokenProvider> RequestProxy<T> {
    pub fn new(
        tokens: T,
        credentials: Credentials,
        identity: ClientIdentity,
        http_client: reqwest::Client,
        config: &ProxyConfig,
    ) -> Self {
        Self {
            tokens,
            credentials,
            identity,
            http_client,
            normalizer: Normalizer::new(&config.config_error_codes),
            mapper: FieldMapper::default(),
            timeout: config.timeout(),
        }
    }

    /// Replace the default field mapping table.
    pub fn with_mapper(mut self, mapper: FieldMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_configured()
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    pub fn mapper(&self) -> &FieldMapper {
        &self.mapper
    }

    /// Forward `request` to the backend.
    pub async fn proxy(&self, request: ProxyRequest) -> ProxyResult {
        let correlation_id = CorrelationId::from_caller(request.correlation_id.as_deref());
        let started = Instant::now();

        tracing::debug!(
            correlation_id = %correlation_id,
            method = %request.method,
            path = %request.path,
            "Proxy call started"
        );

        let result = self.execute(&request, &correlation_id, started).await;
        log_outcome(&request, &correlation_id, started.elapsed(), &result);
        result
    }

    async fn execute(
        &self,
        request: &ProxyRequest,
        correlation_id: &CorrelationId,
        started: Instant,
    ) -> ProxyResult {
        if !self.credentials.is_configured() {
            return Err(Failure::not_configured(correlation_id));
        }

        // Checked before authenticating so a bad request costs no exchange.
        let caller_headers = caller_headers(request, correlation_id)?;

        let token = self
            .tokens
            .ensure_token(correlation_id)
            .await
            .map_err(|e| Failure::from_auth_error(&e, correlation_id).with_elapsed(started.elapsed()))?;

        let url = self
            .credentials
            .endpoint(&request.path)
            .ok_or_else(|| Failure::not_configured(correlation_id))?;

        let mut outbound = self
            .http_client
            .request(request.method.clone(), url)
            .timeout(self.timeout)
            .bearer_auth(token.expose())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .header(headers::CORRELATION_ID, correlation_id.as_str());
        for (name, value) in self.identity.header_pairs() {
            outbound = outbound.header(name, value);
        }
        let mut outbound = outbound.headers(caller_headers);
        if let Some(body) = &request.body {
            outbound = outbound.json(body);
        }

        let outbound = outbound.build().map_err(|e| {
            Failure::invalid_request(correlation_id, "The request could not be built")
                .with_elapsed(started.elapsed())
                .with_detail(e.to_string())
        })?;

        let response = self.http_client.execute(outbound).await.map_err(|e| {
            Failure::unreachable(correlation_id, started.elapsed(), e.is_timeout(), e.to_string())
        })?;

        let status = response.status().as_u16();
        let raw = response.text().await.map_err(|e| {
            Failure::unreachable(
                correlation_id,
                started.elapsed(),
                e.is_timeout(),
                format!("failed to read response body: {}", e),
            )
        })?;

        if status >= 400 {
            if status == 401 {
                // The backend no longer accepts our token; next call re-authenticates.
                self.tokens.invalidate().await;
            }
            tracing::debug!(correlation_id = %correlation_id, status, body = %raw, "Backend error body");
            return Err(self
                .normalizer
                .normalize(status, &raw, correlation_id)
                .with_elapsed(started.elapsed()));
        }

        let body = if raw.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&raw).map_err(|e| {
                tracing::debug!(correlation_id = %correlation_id, status, body = %raw, "Unparsable backend body");
                Failure::malformed(correlation_id, status, e.to_string())
                    .with_elapsed(started.elapsed())
            })?
        };

        Ok(ProxyResponse {
            status,
            body: self.mapper.map_response(body),
            correlation_id: correlation_id.clone(),
        })
    }
}

/// Validate the idempotency key and the caller's extra headers.
///
/// Reserved names are dropped. A key, name or value that cannot travel as an
/// HTTP header fails the request.
fn caller_headers(
    request: &ProxyRequest,
    correlation_id: &CorrelationId,
) -> Result<HeaderMap, Failure> {
    let mut map = HeaderMap::new();

    if let Some(key) = &request.idempotency_key {
        let value = HeaderValue::from_str(key)
            .ok()
            .filter(|_| is_valid_idempotency_key(key))
            .ok_or_else(|| {
                Failure::invalid_request(
                    correlation_id,
                    "Idempotency key must be 1-128 characters from [A-Za-z0-9._:-]",
                )
            })?;
        map.insert(headers::IDEMPOTENCY_KEY, value);
    }

    for (name, value) in &request.headers {
        if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            tracing::debug!(
                correlation_id = %correlation_id,
                header = %name,
                "Dropping reserved caller header"
            );
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            Failure::invalid_request(correlation_id, format!("Invalid header name: {:?}", name))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            Failure::invalid_request(correlation_id, format!("Invalid value for header {}", name))
        })?;
        map.append(name, value);
    }

    Ok(map)
}

/// One log line per call: the primary operational signal.
fn log_outcome(
    request: &ProxyRequest,
    correlation_id: &CorrelationId,
    elapsed: Duration,
    result: &ProxyResult,
) {
    let duration_ms = elapsed.as_millis() as u64;
    match result {
        Ok(response) => tracing::info!(
            correlation_id = %correlation_id,
            method = %request.method,
            path = %request.path,
            status = response.status,
            duration_ms,
            "Proxy call completed"
        ),
        Err(failure) if failure.kind == FailureKind::InvalidRequest => tracing::warn!(
            correlation_id = %correlation_id,
            method = %request.method,
            path = %request.path,
            message = %failure.message,
            "Proxy call refused before sending"
        ),
        Err(failure) if failure.kind == FailureKind::BackendRejected => {
            tracing::warn!(
                correlation_id = %correlation_id,
                method = %request.method,
                path = %request.path,
                status = failure.http_status,
                backend_status = failure.backend_status,
                code = failure.code.as_deref(),
                duration_ms,
                message = %failure.message,
                "Backend rejected proxy call"
            )
        }
        Err(failure) => tracing::error!(
            correlation_id = %correlation_id,
            method = %request.method,
            path = %request.path,
            status = failure.http_status,
            kind = %failure.kind,
            duration_ms,
            detail = failure.detail.as_deref(),
            "Proxy call failed"
        ),
    }
}
