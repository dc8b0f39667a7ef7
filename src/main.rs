//! Secure access gateway (SRA)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ request id ─▶ trace ─▶ concurrency limit ─▶ timeout
//!                                                                   │
//!                                                                   ▼
//!                     ┌──────────────────── security filter ───────────────────┐
//!                     │ logout matcher ─▶ public matcher ─▶ CSRF matcher/token  │
//!                     └──────────┬───────────────────────────────┬─────────────┘
//!                                │ 302 post-logout               │
//!                                ▼                               ▼
//!                             Client                       proxy handler ─────▶ Upstream
//!
//!     route registry (ArcSwap) ──refresh event──▶ cache invalidation
//!     config watcher / SIGHUP ──▶ route registry
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use sra_gateway::config::{load_config, ConfigWatcher, SraConfig};
use sra_gateway::lifecycle::signals;
use sra_gateway::observability::{logging, metrics};
use sra_gateway::{HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "sra-gateway", version, about = "Secure access gateway")]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SraConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sra-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();

    // Hot reload: file watcher plus SIGHUP, both feeding the same channel
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let notify_watcher = match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(error = %e, "Config file watching disabled");
                    None
                }
            };
            tokio::spawn(signals::reload_on_hangup(move || watcher.reload(), shutdown.subscribe()));
            (updates, notify_watcher)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config);
    let server_shutdown = shutdown.subscribe();
    let server_task =
        tokio::spawn(async move { server.run(listener, config_updates, server_shutdown).await });

    signals::wait_for_termination().await;
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
