//! Browser-facing HTTP API.
//!
//! Browser code calls these routes; the daemon attaches credentials and
//! forwards them to the signing backend.

pub mod handlers;
pub mod server;
pub mod types;

pub use handlers::{ApiState, DaemonProxy};
pub use server::{ServerConfig, ServerHandle, router, start_server};
pub use types::{HealthResponse, Signer, SigningRequest};
