//! HTTP handlers for the browser-facing API.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use signbridge_core::{
    CorrelationId, CredentialStore, Failure, ProxyRequest, ProxyResult, RequestProxy,
    TokenAuthenticator, create_store, is_valid_idempotency_key, model::headers,
};
use tracing::{debug, info};

use super::types::{ErrorBody, HealthResponse, SigningRequest, is_valid_request_id};
use crate::config::DaemonConfig;

/// Inbound header carrying the caller's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Type alias for the proxy used by the daemon.
pub type DaemonProxy = RequestProxy<TokenAuthenticator<Box<dyn CredentialStore>>>;

/// State shared across HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    pub proxy: Arc<DaemonProxy>,
}

impl ApiState {
    pub fn new(proxy: DaemonProxy) -> Self {
        Self {
            proxy: Arc::new(proxy),
        }
    }

    /// Open the configured store and wire the proxy over it.
    pub async fn from_config(config: &DaemonConfig) -> Result<Self> {
        let store = create_store(config.store, config.store_path.clone())
            .context("Failed to open credential store")?;
        let proxy = RequestProxy::from_config(&config.backend, store)
            .await
            .context("Failed to initialise request proxy")?;

        info!(configured = proxy.is_configured(), "API state initialised");
        Ok(Self::new(proxy))
    }
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        configured: state.proxy.is_configured(),
    })
}

/// POST /api/signing-requests
pub async fn create_signing_request(
    State(state): State<ApiState>,
    inbound: HeaderMap,
    payload: Result<Json<SigningRequest>, JsonRejection>,
) -> Response {
    let header_cid = header_value(&inbound, headers::CORRELATION_ID);

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected signing request body");
            return invalid(rejection.body_text(), header_cid.as_deref());
        }
    };

    let correlation_id = header_cid.or_else(|| request.correlation_id.clone());
    if let Err(message) = request.validate() {
        return invalid(message, correlation_id.as_deref());
    }

    let idempotency_key = request
        .idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| header_value(&inbound, IDEMPOTENCY_KEY_HEADER));
    if idempotency_key
        .as_deref()
        .is_some_and(|k| !is_valid_idempotency_key(k))
    {
        return invalid(
            "Idempotency key must be 1-128 characters from [A-Za-z0-9._:-]",
            correlation_id.as_deref(),
        );
    }
    let body = state.proxy.mapper().map_request(request.caller_payload());

    let result = state
        .proxy
        .proxy(
            ProxyRequest::post("/signing-requests", body)
                .with_correlation_id(correlation_id)
                .with_idempotency_key(idempotency_key),
        )
        .await;
    proxy_response(result)
}

/// GET /api/signing-requests/:id
pub async fn get_signing_request(
    State(state): State<ApiState>,
    inbound: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let correlation_id = header_value(&inbound, headers::CORRELATION_ID);
    if !is_valid_request_id(&id) {
        return invalid("Invalid signing request id", correlation_id.as_deref());
    }

    let result = state
        .proxy
        .proxy(
            ProxyRequest::get(format!("/signing-requests/{}", id))
                .with_correlation_id(correlation_id),
        )
        .await;
    proxy_response(result)
}

/// DELETE /api/signing-requests/:id
pub async fn cancel_signing_request(
    State(state): State<ApiState>,
    inbound: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let correlation_id = header_value(&inbound, headers::CORRELATION_ID);
    if !is_valid_request_id(&id) {
        return invalid("Invalid signing request id", correlation_id.as_deref());
    }

    let result = state
        .proxy
        .proxy(
            ProxyRequest::delete(format!("/signing-requests/{}", id))
                .with_correlation_id(correlation_id),
        )
        .await;
    proxy_response(result)
}

/// Turn a proxy outcome into an HTTP response, echoing the correlation id.
fn proxy_response(result: ProxyResult) -> Response {
    match result {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
            let cid = [(headers::CORRELATION_ID, response.correlation_id.to_string())];
            if status == StatusCode::NO_CONTENT {
                (status, cid).into_response()
            } else {
                (status, cid, Json(response.body)).into_response()
            }
        }
        Err(failure) => {
            let status =
                StatusCode::from_u16(failure.http_status).unwrap_or(StatusCode::BAD_GATEWAY);
            let cid = [(headers::CORRELATION_ID, failure.correlation_id.to_string())];
            (status, cid, Json(ErrorBody::from(&failure))).into_response()
        }
    }
}

fn invalid(message: impl Into<String>, correlation_id: Option<&str>) -> Response {
    let correlation_id = CorrelationId::from_caller(correlation_id);
    proxy_response(Err(Failure::invalid_request(&correlation_id, message)))
}

fn header_value(inbound: &HeaderMap, name: &str) -> Option<String> {
    inbound
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
