//! Top-level error types for Signbridge.
//!
//! Per-call outcomes use [`Failure`](crate::normalize::Failure); this type
//! covers setup (store access, HTTP client construction, configuration).

use thiserror::Error;

use crate::store::StoreError;
use crate::token::AuthError;

/// Top-level error type encompassing all Signbridge setup errors.
#[derive(Debug, Error)]
pub enum SignbridgeError {
    /// Error from credential store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from token operations.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}
