//! Backend error normalization.
//!
//! Every non-success outcome of a proxied call ends up as a [`Failure`]. For
//! backend responses with status >= 400, [`Normalizer::normalize`] extracts a
//! human message and an optional machine-readable code from whatever JSON
//! shape the backend used.
//!
//! Message extraction tries an ordered list of extractors and keeps the
//! first non-empty result:
//!
//! 1. `message`
//! 2. `error` (string, or the `message` of an object, or the compact object)
//! 3. `errors` as `{field: [msg, ...]}`, flattened to `field: a, b; other: c`
//! 4. `title` / `detail` (problem+json)
//!
//! When nothing matches the raw body text is used, then the status reason.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::CorrelationId;
use crate::token::AuthError;

/// Longest raw body excerpt used as a fallback message.
const MAX_RAW_MESSAGE_LEN: usize = 500;

/// Shown when the backend gives nothing usable.
const GENERIC_MESSAGE: &str = "The signing service returned an error";

/// Failure taxonomy returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Key/secret/base URL missing. An admin must fix configuration.
    NotConfigured,
    /// The credential exchange was rejected or malformed.
    AuthFailed,
    /// Network failure or timeout. Safe to retry with backoff.
    Unreachable,
    /// The backend answered with an error status.
    BackendRejected,
    /// The backend answered 2xx with a body that is not JSON.
    MalformedResponse,
    /// The caller's request cannot be sent as given. Never retryable.
    InvalidRequest,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotConfigured => "not_configured",
            Self::AuthFailed => "auth_failed",
            Self::Unreachable => "unreachable",
            Self::BackendRejected => "backend_rejected",
            Self::MalformedResponse => "malformed_response",
            Self::InvalidRequest => "invalid_request",
        };
        f.write_str(s)
    }
}

/// A normalized proxy failure.
///
/// Serializes to the caller-facing error contract; `detail` is internal and
/// only appears in logs.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{kind} ({http_status}): {message}")]
pub struct Failure {
    pub kind: FailureKind,

    /// Status the caller should answer with.
    pub http_status: u16,

    /// Status the backend actually returned, if it was reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_status: Option<u16>,

    /// Machine-readable backend code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// User-presentable message.
    pub message: String,

    pub correlation_id: CorrelationId,

    #[serde(
        rename = "elapsed_ms",
        serialize_with = "serialize_elapsed",
        skip_serializing_if = "Option::is_none"
    )]
    pub elapsed: Option<Duration>,

    /// Internal error text (transport errors, raw bodies).
    #[serde(skip)]
    pub detail: Option<String>,
}

fn serialize_elapsed<S: serde::Serializer>(
    elapsed: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match elapsed {
        Some(d) => serializer.serialize_u64(d.as_millis() as u64),
        None => serializer.serialize_none(),
    }
}

impl Failure {
    fn new(kind: FailureKind, http_status: u16, message: impl Into<String>, correlation_id: &CorrelationId) -> Self {
        Self {
            kind,
            http_status,
            backend_status: None,
            code: None,
            message: message.into(),
            correlation_id: correlation_id.clone(),
            elapsed: None,
            detail: None,
        }
    }

    /// Credentials are missing.
    pub fn not_configured(correlation_id: &CorrelationId) -> Self {
        Self::new(
            FailureKind::NotConfigured,
            500,
            "The signing integration is not configured",
            correlation_id,
        )
    }

    /// Transport failure or timeout after `elapsed`.
    pub fn unreachable(
        correlation_id: &CorrelationId,
        elapsed: Duration,
        timed_out: bool,
        detail: impl Into<String>,
    ) -> Self {
        let (status, message) = if timed_out {
            (504, "The signing service did not respond in time")
        } else {
            (502, "The signing service could not be reached")
        };
        let mut failure = Self::new(FailureKind::Unreachable, status, message, correlation_id);
        failure.elapsed = Some(elapsed);
        failure.detail = Some(detail.into());
        failure
    }

    /// The request was refused before anything reached the backend.
    pub fn invalid_request(correlation_id: &CorrelationId, message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidRequest, 400, message, correlation_id)
    }

    /// 2xx response whose body is not JSON.
    pub fn malformed(correlation_id: &CorrelationId, backend_status: u16, detail: impl Into<String>) -> Self {
        let mut failure = Self::new(
            FailureKind::MalformedResponse,
            502,
            "The signing service returned an unreadable response",
            correlation_id,
        );
        failure.backend_status = Some(backend_status);
        failure.detail = Some(detail.into());
        failure
    }

    /// Wrap a token acquisition failure.
    pub fn from_auth_error(error: &AuthError, correlation_id: &CorrelationId) -> Self {
        match error {
            AuthError::NotConfigured => Self::not_configured(correlation_id),
            AuthError::Unreachable { message, elapsed } => {
                let mut failure = Self::new(
                    FailureKind::AuthFailed,
                    502,
                    "Could not reach the signing service to authenticate",
                    correlation_id,
                );
                failure.elapsed = Some(*elapsed);
                failure.detail = Some(message.clone());
                failure
            }
            AuthError::Rejected { status, message } => {
                let mut failure = Self::new(
                    FailureKind::AuthFailed,
                    502,
                    "The signing service rejected the integration credentials",
                    correlation_id,
                );
                failure.backend_status = Some(*status);
                failure.detail = Some(message.clone());
                failure
            }
            AuthError::MalformedResponse { message } => {
                let mut failure = Self::new(
                    FailureKind::AuthFailed,
                    502,
                    "The signing service returned an invalid authentication response",
                    correlation_id,
                );
                failure.detail = Some(message.clone());
                failure
            }
            AuthError::Store(e) => {
                let mut failure = Self::new(
                    FailureKind::AuthFailed,
                    500,
                    "Could not access the token cache",
                    correlation_id,
                );
                failure.detail = Some(e.to_string());
                failure
            }
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        if self.elapsed.is_none() {
            self.elapsed = Some(elapsed);
        }
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Whether a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            FailureKind::Unreachable => true,
            FailureKind::BackendRejected => {
                matches!(self.http_status, 429 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

/// Pulls a message out of one JSON error shape.
type MessageExtractor = fn(&Map<String, Value>) -> Option<String>;

/// Tried in order; first non-empty wins.
const MESSAGE_EXTRACTORS: &[MessageExtractor] = &[
    message_field,
    error_field,
    errors_field,
    problem_fields,
];

fn message_field(obj: &Map<String, Value>) -> Option<String> {
    non_empty_str(obj.get("message")?)
}

fn error_field(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("error")? {
        Value::Object(inner) => inner
            .get("message")
            .and_then(non_empty_str)
            .or_else(|| Some(Value::Object(inner.clone()).to_string())),
        other => non_empty_str(other),
    }
}

fn errors_field(obj: &Map<String, Value>) -> Option<String> {
    let flattened = match obj.get("errors")? {
        Value::Object(fields) => fields
            .iter()
            .filter_map(|(field, msgs)| {
                let msgs = match msgs {
                    Value::Array(items) => items
                        .iter()
                        .filter_map(non_empty_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                    other => non_empty_str(other).unwrap_or_default(),
                };
                (!msgs.is_empty()).then(|| format!("{}: {}", field, msgs))
            })
            .collect::<Vec<_>>()
            .join("; "),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(inner) => inner.get("message").and_then(non_empty_str),
                other => non_empty_str(other),
            })
            .collect::<Vec<_>>()
            .join("; "),
        other => non_empty_str(other).unwrap_or_default(),
    };
    (!flattened.is_empty()).then_some(flattened)
}

fn problem_fields(obj: &Map<String, Value>) -> Option<String> {
    obj.get("detail")
        .and_then(non_empty_str)
        .or_else(|| obj.get("title").and_then(non_empty_str))
}

/// String values as-is, numbers and booleans stringified; everything else is no message.
fn non_empty_str(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Extract a message from a JSON error body using the ordered extractors.
///
/// Returns `None` when the body is not a JSON object or no extractor matches.
pub fn extract_message(raw_body: &str) -> Option<String> {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw_body) else {
        return None;
    };
    MESSAGE_EXTRACTORS.iter().find_map(|extract| extract(&obj))
}

/// Extract a machine-readable code: `errorCode`, `code`, then `error.code`.
pub fn extract_code(raw_body: &str) -> Option<String> {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw_body) else {
        return None;
    };
    obj.get("errorCode")
        .and_then(non_empty_str)
        .or_else(|| obj.get("code").and_then(non_empty_str))
        .or_else(|| match obj.get("error") {
            Some(Value::Object(inner)) => inner.get("code").and_then(non_empty_str),
            _ => None,
        })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Maps backend error responses to [`Failure`]s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Upper-cased codes that mean "an admin must reconfigure something".
    config_error_codes: Vec<String>,
}

impl Normalizer {
    pub fn new<I, T>(config_error_codes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            config_error_codes: config_error_codes
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    fn is_config_error(&self, code: &str) -> bool {
        let code = code.to_ascii_uppercase();
        self.config_error_codes.iter().any(|c| *c == code)
    }

    /// Normalize a backend error response (status >= 400).
    pub fn normalize(&self, http_status: u16, raw_body: &str, correlation_id: &CorrelationId) -> Failure {
        let code = extract_code(raw_body);

        let message = extract_message(raw_body).unwrap_or_else(|| {
            let trimmed = raw_body.trim();
            if !trimmed.is_empty() {
                truncate(trimmed, MAX_RAW_MESSAGE_LEN)
            } else {
                reqwest::StatusCode::from_u16(http_status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or(GENERIC_MESSAGE)
                    .to_string()
            }
        });

        // Configuration problems must not look like transient unavailability.
        let surfaced_status = match &code {
            Some(code) if http_status >= 500 && self.is_config_error(code) => 400,
            _ => http_status,
        };

        Failure {
            kind: FailureKind::BackendRejected,
            http_status: surfaced_status,
            backend_status: Some(http_status),
            code,
            message,
            correlation_id: correlation_id.clone(),
            elapsed: None,
            detail: (!raw_body.is_empty()).then(|| truncate(raw_body, MAX_RAW_MESSAGE_LEN)),
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONFIG_ERROR_CODES)
    }
}
