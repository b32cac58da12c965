//! Daemon configuration handling.
//!
//! Read from `--config <path>` or `daemon.toml` in the platform config
//! directory. A missing file yields defaults. The credential pair and base URL
//! can also come from the environment so they never need to be written to disk.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use signbridge_core::{ProxyConfig, StoreBackend};

pub const ENV_API_KEY: &str = "SIGNBRIDGE_API_KEY";
pub const ENV_API_SECRET: &str = "SIGNBRIDGE_API_SECRET";
pub const ENV_BASE_URL: &str = "SIGNBRIDGE_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the browser-facing HTTP server listens on.
    pub listen_addr: SocketAddr,

    /// Where credentials and the cached token live.
    pub store: StoreBackend,

    /// File path for the `file` store. Platform default when unset.
    pub store_path: Option<PathBuf>,

    /// Logging level (overridden by `RUST_LOG`).
    pub log_level: String,

    /// Browser origins allowed to call the API. Empty disables CORS headers.
    pub allowed_origins: Vec<String>,

    /// Backend connection settings.
    pub backend: ProxyConfig,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            store: StoreBackend::File,
            store_path: None,
            log_level: "info".to_string(),
            allowed_origins: Vec::new(),
            backend: ProxyConfig::default(),
            config_path: PathBuf::new(),
        }
    }
}

impl DaemonConfig {
    /// Apply `SIGNBRIDGE_*` environment overrides.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.backend.api_key = Some(key);
        }
        if let Some(secret) = lookup(ENV_API_SECRET) {
            self.backend.api_secret = Some(secret);
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.backend.base_url = Some(url);
        }
    }
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("daemon.toml"))
        .unwrap_or_else(|| PathBuf::from("signbridge-daemon.toml"))
}

/// Load configuration from `path` (or the default location), then apply
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<DaemonConfig> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else if path.is_some() {
        anyhow::bail!("Config file {:?} does not exist", config_path);
    } else {
        DaemonConfig::default()
    };

    config.config_path = config_path;
    config.apply_env(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()));

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "signbridge")
}
