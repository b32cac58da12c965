//! # Signbridge Core
//!
//! Authenticated proxy between a browser-facing signing workflow and the
//! signing backend. The browser never sees the plugin's key/secret pair.
//!
//! This crate provides:
//! - A [`CredentialStore`] abstraction with memory, file and keyring backends
//! - [`TokenAuthenticator`], which exchanges key/secret for a cached bearer token
//! - [`RequestProxy`], which forwards calls with auth and correlation headers
//! - [`Normalizer`], which maps backend errors into a stable [`Failure`] contract
//! - [`FieldMapper`], which adds caller-facing field aliases to responses
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use signbridge_core::{MemoryStore, ProxyConfig, ProxyRequest, RequestProxy};
//!
//! let config = ProxyConfig {
//!     base_url: Some("https://sign.example.com/api".into()),
//!     api_key: Some("pk_live".into()),
//!     api_secret: Some("sk_live".into()),
//!     ..ProxyConfig::default()
//! };
//! let proxy = RequestProxy::from_config(&config, MemoryStore::new()).await?;
//!
//! match proxy.proxy(ProxyRequest::get("/signing-requests/42")).await {
//!     Ok(response) => println!("{}", response.body),
//!     Err(failure) => eprintln!("{} ({})", failure.message, failure.correlation_id),
//! }
//! ```

pub mod authenticator;
pub mod config;
pub mod error;
pub mod mapping;
pub mod model;
pub mod normalize;
pub mod proxy;
pub mod store;
pub mod token;

// Re-export commonly used types at crate root
pub use model::{
    ClientIdentity,
    CorrelationId,
    Credentials,
    is_valid_idempotency_key,
};

pub use store::{
    CredentialStore,
    FileStore,
    MemoryStore,
    Secret,
    StoreBackend,
    StoreError,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use token::{
    AuthError,
    CachedToken,
    TokenProvider,
};

pub use authenticator::TokenAuthenticator;

pub use proxy::{
    ProxyRequest,
    ProxyResponse,
    ProxyResult,
    RequestProxy,
    build_http_client,
};

pub use normalize::{
    Failure,
    FailureKind,
    Normalizer,
};

pub use mapping::FieldMapper;

pub use config::ProxyConfig;

pub use error::SignbridgeError;
