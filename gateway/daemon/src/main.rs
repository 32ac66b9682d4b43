//! Gateway Daemon
//!
//! Standalone server process for the campus chat gateway. Runs two
//! listeners out of one process: the auth HTTP API and the WebSocket
//! model relay.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (auth on :8093, relay on :8092, Ollama provider)
//! GATEWAY_VAULT_SECRET=... gateway-daemon
//!
//! # Hosted provider
//! GATEWAY_PROVIDER=together TOGETHER_API_KEY=... gateway-daemon
//!
//! # With verbose logging
//! RUST_LOG=debug gateway-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `GATEWAY_CONFIG`: TOML config file path
//! - `GATEWAY_HTTP_BIND` / `GATEWAY_RELAY_BIND`: listener addresses
//! - `GATEWAY_DB`: SQLite credential database path
//! - `GATEWAY_VAULT_SECRET`: secret the credential vault key derives from
//! - `GATEWAY_PROVIDER`: `together`, `ollama`, or `huggingface`
//! - `TOGETHER_API_KEY` / `HF_TOKEN`: provider credentials
//! - `OLLAMA_HOST` / `OLLAMA_PORT` / `OLLAMA_MODEL`: Ollama settings
//! - `RUST_LOG`: log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: graceful shutdown (removes the PID file)

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use gateway_core::api::{self, ApiState};
use gateway_core::{
    load_config_from_path, provider_from_config, AuthService, CredentialStore, InputValidator,
    RelayServer, Vault,
};

/// Campus chat gateway daemon: auth API + model relay.
#[derive(Debug, Parser)]
#[command(name = "gateway-daemon", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the auth API bind address
    #[arg(long)]
    http_bind: Option<String>,

    /// Override the relay bind address
    #[arg(long)]
    relay_bind: Option<String>,
}

/// Get the default PID file path.
///
/// Uses XDG_RUNTIME_DIR if available, otherwise /tmp/campus-gateway-$UID/.
fn default_pid_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir)
            .join("campus-gateway")
            .join("gateway.pid")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/campus-gateway-{uid}/gateway.pid"))
    }
}

/// Write the PID file.
fn write_pid_file(path: &PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pid = std::process::id();
    let mut file = fs::File::create(path)?;
    writeln!(file, "{pid}")?;

    info!(pid = pid, path = ?path, "PID file created");
    Ok(())
}

/// Remove the PID file.
fn remove_pid_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = ?path, "Failed to remove PID file");
        } else {
            info!(path = ?path, "PID file removed");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gateway_daemon=info".parse()?)
                .add_directive("gateway_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("Starting gateway daemon");
    info!("PID: {}", std::process::id());

    let pid_path = default_pid_path();
    write_pid_file(&pid_path)
        .with_context(|| format!("Failed to write PID file at {pid_path:?}"))?;

    let run_result = run(cli).await;

    remove_pid_file(&pid_path);
    run_result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config_from_path(cli.config.or_else(gateway_core::default_config_path))
        .context("Failed to load configuration")?;
    if let Some(bind) = cli.http_bind {
        config.http_bind = bind;
    }
    if let Some(bind) = cli.relay_bind {
        config.relay_bind = bind;
    }

    let vault_secret = config.vault_secret.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "No vault secret configured. Set GATEWAY_VAULT_SECRET (or [auth] vault_secret \
             in the config file); stored portal credentials are encrypted with a key \
             derived from it."
        )
    })?;

    let store = CredentialStore::open(&config.db_path)
        .with_context(|| format!("Failed to open credential store at {:?}", config.db_path))?;
    info!(path = ?config.db_path, "Credential store open");

    let auth = Arc::new(AuthService::new(
        store,
        Vault::derive(&vault_secret),
        InputValidator::new(config.limits.clone()),
        config.session_ttl_secs,
    ));

    let provider: Arc<dyn gateway_core::ProviderClient> =
        Arc::from(provider_from_config(&config.provider, &config.generation)?);
    info!(provider = provider.name(), "Provider selected");

    // Auth API listener
    let http_listener = tokio::net::TcpListener::bind(&config.http_bind)
        .await
        .with_context(|| format!("Failed to bind auth API to {}", config.http_bind))?;
    info!(addr = %http_listener.local_addr()?, "Auth API listening");

    let app = api::router(ApiState {
        auth: Arc::clone(&auth),
    });

    let http_shutdown = Arc::new(Notify::new());
    let http_shutdown_task = Arc::clone(&http_shutdown);
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, app)
            .with_graceful_shutdown(async move { http_shutdown_task.notified().await })
            .await
    });

    // Relay listener
    let relay_listener = RelayServer::bind(&config.relay_bind)
        .await
        .with_context(|| format!("Failed to bind relay to {}", config.relay_bind))?;

    let relay = RelayServer::new(auth, provider, config.limits.clone());
    let relay_shutdown = Arc::new(Notify::new());
    let relay_shutdown_task = Arc::clone(&relay_shutdown);
    let relay_task =
        tokio::spawn(async move { relay.run(relay_listener, relay_shutdown_task).await });

    // Wait for a shutdown signal, then stop both listeners
    wait_for_signal().await;
    info!("Shutting down");
    http_shutdown.notify_one();
    relay_shutdown.notify_one();

    match http_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Auth API exited with error"),
        Err(e) => error!(error = %e, "Auth API task failed"),
    }
    match relay_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Relay exited with error"),
        Err(e) => error!(error = %e, "Relay task failed"),
    }

    info!("Gateway daemon stopped cleanly");
    Ok(())
}

/// Block until Ctrl+C or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
