//! AppConfig Gate
//!
//! A small HTTP service whose endpoints are gated by feature flags pulled
//! from a local configuration agent.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                 APPCONFIG GATE                   │
//!                 │                                                  │
//!   Client ──────▶│  http::server ──▶ handlers ──▶ ConfigHandle      │
//!                 │                                   │ (lock-free)  │
//!                 │                                   ▼              │
//!                 │                            ConfigSnapshot (Arc)  │
//!                 │                                   ▲              │
//!                 │                                   │ merge        │
//!                 │  sync::synchronizer (background task, every 30s) │
//!                 │          │                                       │
//!                 └──────────┼───────────────────────────────────────┘
//!                            ▼
//!                 sync::fetcher ── GET ──▶ configuration agent (:2772)
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use appconfig_gate::config::load_config;
use appconfig_gate::http::HttpServer;
use appconfig_gate::lifecycle::{self, Shutdown};
use appconfig_gate::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "appconfig-gate")]
#[command(about = "Feature-gated HTTP service backed by a configuration agent", long_about = None)]
struct Args {
    /// Path to a TOML settings file. Defaults apply when omitted.
    #[arg(short, long, env = "APPCONFIG_GATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability.log_filter);

    tracing::info!("appconfig-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        application = %config.agent.application,
        environment = %config.agent.environment,
        profile = %config.agent.profile,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Initial fetch happens here, before the listener exists.
    let sync = lifecycle::start_sync(&config).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, sync.handle, sync.stats);
    let server_shutdown = shutdown.subscribe();
    shutdown.trigger_on(lifecycle::signals::shutdown_signal());

    server.run(listener, server_shutdown).await?;

    sync.task.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
