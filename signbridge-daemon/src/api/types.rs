//! Request and response bodies of the browser-facing API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use signbridge_core::Failure;

/// Longest signing request id accepted in a path.
const MAX_REQUEST_ID_LEN: usize = 128;

/// The person who will sign.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Signer {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
}

/// Body of `POST /api/signing-requests`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningRequest {
    pub signer: Signer,
    pub product_id: String,
    pub supplier_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl SigningRequest {
    /// Check the fields the backend cannot do without.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("signer.first_name", &self.signer.first_name),
            ("signer.last_name", &self.signer.last_name),
            ("product_id", &self.product_id),
            ("supplier_id", &self.supplier_id),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("Missing required fields: {}", missing.join(", ")))
        }
    }

    /// Flatten into caller-spelled fields, ready for `FieldMapper::map_request`.
    ///
    /// Routing fields (`idempotency_key`, `correlation_id`) travel as headers
    /// and are left out.
    pub fn caller_payload(&self) -> Value {
        let mut body = Map::new();
        let mut put = |name: &str, value: Option<&str>| {
            if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
                body.insert(name.to_string(), Value::String(v.to_string()));
            }
        };

        put("signer_first_name", Some(self.signer.first_name.as_str()));
        put("signer_last_name", Some(self.signer.last_name.as_str()));
        put("signer_email", self.signer.email.as_deref());
        put("signer_phone", self.signer.phone.as_deref());
        put("signer_national_id", self.signer.national_id.as_deref());
        put("product_id", Some(self.product_id.as_str()));
        put("supplier_id", Some(self.supplier_id.as_str()));
        put("redirect_url", self.redirect_url.as_deref());

        if let Some(metadata) = &self.metadata {
            body.insert("metadata".to_string(), metadata.clone());
        }

        Value::Object(body)
    }
}

/// Whether `id` may be spliced into a backend path.
pub fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}

/// Error envelope: `{"error": {...}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody<T: Serialize> {
    pub error: T,
}

impl From<&Failure> for ErrorBody<Failure> {
    fn from(failure: &Failure) -> Self {
        Self {
            error: failure.clone(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub configured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use signbridge_core::CorrelationId;

    fn sample() -> SigningRequest {
        serde_json::from_value(json!({
            "signer": {"first_name": "Kari", "last_name": "Nordmann", "email": "kari@example.com"},
            "product_id": "p-1",
            "supplier_id": "s-1",
            "metadata": {"order": 42},
            "idempotency_key": "idem-1"
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_lists_missing_fields() {
        let mut req = sample();
        req.signer.last_name = "  ".to_string();
        req.supplier_id.clear();

        let err = req.validate().unwrap_err();
        assert!(err.contains("signer.last_name"));
        assert!(err.contains("supplier_id"));
        assert!(!err.contains("product_id"));
    }

    #[test]
    fn test_caller_payload_skips_routing_fields() {
        let payload = sample().caller_payload();

        assert_eq!(payload["signer_first_name"], "Kari");
        assert_eq!(payload["signer_email"], "kari@example.com");
        assert_eq!(payload["metadata"], json!({"order": 42}));
        assert!(payload.get("signer_phone").is_none());
        assert!(payload.get("idempotency_key").is_none());
    }

    #[test]
    fn test_request_id_rules() {
        assert!(is_valid_request_id("req_42-a"));
        assert!(!is_valid_request_id(""));
        assert!(!is_valid_request_id("../admin"));
        assert!(!is_valid_request_id(&"a".repeat(129)));
    }

    #[test]
    fn test_invalid_request_shape() {
        let failure = Failure::invalid_request(&CorrelationId::from_caller(Some("cid-1")), "bad");
        let value = serde_json::to_value(ErrorBody::from(&failure)).unwrap();
        assert_eq!(value["error"]["kind"], "invalid_request");
        assert_eq!(value["error"]["http_status"], 400);
        assert_eq!(value["error"]["correlation_id"], "cid-1");
    }
}
