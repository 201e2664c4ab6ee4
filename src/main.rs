//! Fragment gateway.
//!
//! Serves HTML pages assembled at request time from a template and the
//! fragments it references.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │               FRAGMENT GATEWAY               │
//!                     │                                              │
//!   Client Request    │  ┌────────┐   ┌──────────────┐               │
//!   ──────────────────┼─▶│  http  │──▶│ orchestrator │──▶ context ───┼──── Context
//!                     │  │ server │   │              │──▶ template   │     Service
//!                     │  └────────┘   └──────┬───────┘               │
//!                     │                      │ fragment tags         │
//!                     │                      ▼                       │
//!                     │               ┌──────────────┐               │
//!                     │               │ fragment     │───────────────┼──── Fragment
//!                     │               │ units        │               │     Services
//!                     │               └──────┬───────┘               │
//!   Client Response   │  ┌────────┐   ┌──────┴───────┐               │
//!   ◀─────────────────┼──│ length │◀──│  sequential  │               │
//!                     │  │ count  │   │  writer      │               │
//!                     │  └────────┘   └──────────────┘               │
//!                     └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use fragment_gateway::config::{load_config, GatewayConfig};
use fragment_gateway::http::HttpServer;
use fragment_gateway::lifecycle::{signals, Shutdown};
use fragment_gateway::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "fragment-gateway", version, about = "Compose HTML pages from fragments")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("fragment-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        templates = %config.templates.directory,
        fragment_tag = %config.fragments.tag,
        fragment_timeout_ms = config.fragments.timeout_ms,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);

    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
