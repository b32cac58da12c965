//! Field name mapping between the backend and browser contracts.
//!
//! The backend speaks PascalCase (`SigningUrl`); browser code expects
//! snake_case (`signing_url`). Responses gain caller-facing aliases while
//! keeping the original fields, so older consumers keep working.
//!
//! Values under opaque keys (caller `metadata` by default) belong to the
//! caller and pass through untouched in both directions. The key itself is
//! still mapped.

use serde_json::{Map, Value};

/// Fixed (backend field, caller field) table.
const DEFAULT_PAIRS: &[(&str, &str)] = &[
    ("RequestId", "request_id"),
    ("SigningUrl", "signing_url"),
    ("Status", "status"),
    ("ExpiresAt", "expires_at"),
    ("CreatedAt", "created_at"),
    ("CompletedAt", "completed_at"),
    ("SignerName", "signer_name"),
    ("SignerFirstName", "signer_first_name"),
    ("SignerLastName", "signer_last_name"),
    ("SignerNationalId", "signer_national_id"),
    ("SignerEmail", "signer_email"),
    ("SignerPhone", "signer_phone"),
    ("ProductId", "product_id"),
    ("SupplierId", "supplier_id"),
    ("DocumentUrl", "document_url"),
    ("RedirectUrl", "redirect_url"),
    ("Metadata", "metadata"),
];

/// Keys whose values are never traversed.
const DEFAULT_OPAQUE_KEYS: &[&str] = &["Metadata", "metadata"];

/// Bidirectional field mapper.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    pairs: Vec<(String, String)>,
    opaque: Vec<String>,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new(DEFAULT_PAIRS.iter().copied())
            .with_opaque_keys(DEFAULT_OPAQUE_KEYS.iter().copied())
    }
}

impl FieldMapper {
    pub fn new<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(backend, caller)| (backend.into(), caller.into()))
                .collect(),
            opaque: Vec::new(),
        }
    }

    /// Leave the values under `keys` exactly as given.
    pub fn with_opaque_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.opaque.extend(keys.into_iter().map(Into::into));
        self
    }

    fn is_opaque(&self, key: &str) -> bool {
        self.opaque.iter().any(|k| k == key)
    }

    /// Add caller-facing aliases to a backend payload.
    ///
    /// Recurses through objects and arrays except under opaque keys. Original
    /// fields stay; an alias the backend already sent is never overwritten.
    ///
    /// ```
    /// use serde_json::json;
    /// use signbridge_core::FieldMapper;
    ///
    /// let out = FieldMapper::default().map_response(json!({"SigningUrl": "https://x"}));
    /// assert_eq!(out["SigningUrl"], out["signing_url"]);
    /// ```
    pub fn map_response(&self, value: Value) -> Value {
        match value {
            Value::Object(obj) => {
                let mut mapped: Map<String, Value> = obj
                    .into_iter()
                    .map(|(k, v)| {
                        let v = if self.is_opaque(&k) { v } else { self.map_response(v) };
                        (k, v)
                    })
                    .collect();
                for (backend, caller) in &self.pairs {
                    if mapped.contains_key(caller) {
                        continue;
                    }
                    if let Some(v) = mapped.get(backend).cloned() {
                        mapped.insert(caller.clone(), v);
                    }
                }
                Value::Object(mapped)
            }
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.map_response(v)).collect())
            }
            other => other,
        }
    }

    /// Rename caller fields to backend fields in a browser-supplied payload.
    ///
    /// Recurses through objects and arrays except under opaque keys. If both
    /// spellings are present the backend spelling wins and the caller spelling
    /// is dropped.
    pub fn map_request(&self, value: Value) -> Value {
        match value {
            Value::Object(obj) => {
                let mut mapped: Map<String, Value> = obj
                    .into_iter()
                    .map(|(k, v)| {
                        let v = if self.is_opaque(&k) { v } else { self.map_request(v) };
                        (k, v)
                    })
                    .collect();
                for (backend, caller) in &self.pairs {
                    if let Some(v) = mapped.remove(caller) {
                        if !mapped.contains_key(backend) {
                            mapped.insert(backend.clone(), v);
                        }
                    }
                }
                Value::Object(mapped)
            }
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.map_request(v)).collect())
            }
            other => other,
        }
    }
}
