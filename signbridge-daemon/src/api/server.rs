//! HTTP server setup and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use super::handlers::{
    ApiState, cancel_signing_request, create_signing_request, get_signing_request, health,
};
use crate::config::DaemonConfig;

/// Settings for the listening socket.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind. Port 0 picks a free port.
    pub listen_addr: SocketAddr,

    /// Browser origins allowed by CORS. Empty disables the CORS layer.
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            allowed_origins: Vec::new(),
        }
    }
}

impl From<&DaemonConfig> for ServerConfig {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            listen_addr: config.listen_addr,
            allowed_origins: config.allowed_origins.clone(),
        }
    }
}

/// Handle to a running HTTP server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    join_handle: Arc<Mutex<Option<JoinHandle<std::io::Result<()>>>>>,
}

impl ServerHandle {
    /// Address the server actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn stop(&self) -> Result<()> {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.join_handle.lock().await.take() {
            handle
                .await
                .context("Server task panicked")?
                .context("Server terminated with an error")?;
        }

        Ok(())
    }
}

/// Build the API router.
pub fn router(state: ApiState, allowed_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/api/signing-requests", post(create_signing_request))
        .route(
            "/api/signing-requests/:id",
            get(get_signing_request).delete(cancel_signing_request),
        )
        .with_state(state);

    match cors_layer(allowed_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    let correlation = HeaderName::from_static("x-correlation-id");
    let idempotency = HeaderName::from_static("idempotency-key");

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, correlation.clone(), idempotency])
            .expose_headers([correlation]),
    )
}

/// Start the HTTP server.
///
/// # Parameters
///
/// - `config`: Listening address and CORS origins
/// - `state`: API state shared across handlers
///
/// # Returns
///
/// A handle to the running server that can be used to stop it.
pub async fn start_server(config: &ServerConfig, state: ApiState) -> Result<ServerHandle> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read bound address")?;

    let app = router(state, &config.allowed_origins);
    let (tx, rx) = oneshot::channel::<()>();

    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
                debug!("Server shutdown signal received");
            })
            .await
    });

    info!(addr = %local_addr, "HTTP server listening");

    Ok(ServerHandle {
        local_addr,
        shutdown: Arc::new(Mutex::new(Some(tx))),
        join_handle: Arc::new(Mutex::new(Some(server_task))),
    })
}
