//! Signbridge CLI
//!
//! Command-line interface for configuring the signing backend credentials
//! and exercising the proxy without a browser.
//!
//! # Usage
//!
//! ```bash
//! # Store credentials (secret is read from stdin when omitted)
//! signbridge configure --base-url https://sign.example.com/api --key pk_live
//!
//! # Check the credential exchange
//! signbridge authenticate
//!
//! # Make a proxied call
//! signbridge call GET /signing-requests/42
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use signbridge_core::{ProxyConfig, StoreBackend, create_store};
use tracing_subscriber::FmtSubscriber;

mod commands;

const ENV_API_KEY: &str = "SIGNBRIDGE_API_KEY";
const ENV_API_SECRET: &str = "SIGNBRIDGE_API_SECRET";
const ENV_BASE_URL: &str = "SIGNBRIDGE_BASE_URL";

#[derive(Parser)]
#[command(name = "signbridge")]
#[command(about = "Configure and exercise the Signbridge signing proxy")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Credential store backend (file, keyring, memory)
    #[arg(long, global = true, default_value = "file")]
    store: StoreBackend,

    /// Path of the file store
    #[arg(long, global = true)]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the backend base URL, API key and secret
    Configure {
        /// Backend base URL (e.g., https://sign.example.com/api)
        #[arg(long)]
        base_url: String,

        /// API key
        #[arg(long)]
        key: String,

        /// API secret; read from stdin when omitted
        #[arg(long)]
        secret: Option<String>,
    },

    /// Exchange the credentials for a bearer token
    Authenticate,

    /// Make one proxied call and print the result
    Call {
        /// HTTP method (GET, POST, DELETE, ...)
        method: String,

        /// Backend path (e.g., /signing-requests/42)
        path: String,

        /// JSON body with caller-spelled fields
        #[arg(short, long)]
        body: Option<String>,

        /// Idempotency key for creation calls
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Show whether credentials and a cached token exist
    Status,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.verbose {
        FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(io::stderr)
            .init();
    }

    let store = create_store(cli.store, cli.store_path.clone())
        .context("Failed to open credential store")?;

    match cli.command {
        Commands::Configure {
            base_url,
            key,
            secret,
        } => {
            let secret = match secret {
                Some(secret) => secret,
                None => prompt_secret()?,
            };
            commands::configure(store.as_ref(), &base_url, &key, &secret).await?;
            println!("Stored credentials for key {}", key);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Authenticate => {
            let proxy = commands::open_proxy(&env_config(), store).await?;
            let masked = commands::authenticate(&proxy).await?;
            println!("Authenticated. Token: {}", masked);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Call {
            method,
            path,
            body,
            idempotency_key,
        } => {
            let proxy = commands::open_proxy(&env_config(), store).await?;
            match commands::call(&proxy, &method, &path, body.as_deref(), idempotency_key).await? {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(&response.body)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(failure) => {
                    let body = serde_json::json!({ "error": failure });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Status => {
            let proxy = commands::open_proxy(&env_config(), store).await?;
            println!("{}", commands::status(&proxy).await);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Proxy configuration from `SIGNBRIDGE_*` variables; anything unset falls
/// back to the store.
fn env_config() -> ProxyConfig {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    ProxyConfig {
        api_key: var(ENV_API_KEY),
        api_secret: var(ENV_API_SECRET),
        base_url: var(ENV_BASE_URL),
        ..ProxyConfig::default()
    }
}

fn prompt_secret() -> Result<String> {
    eprint!("API secret: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read secret from stdin")?;
    Ok(line.trim().to_string())
}
