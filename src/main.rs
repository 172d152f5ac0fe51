//! AIS Stream Relay
//!
//! Relays a single upstream AIS feed to many WebSocket subscribers.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                  AIS RELAY                    │
//!   AISStream (wss)    │  ┌──────────┐    ┌─────────────┐              │
//!   ───────────────────┼─▶│ upstream │───▶│ broadcaster │              │
//!                      │  │   link   │    └──────┬──────┘              │
//!                      │  └────┬─────┘           │ per-subscriber      │
//!                      │       │ backoff         ▼ bounded queues      │
//!                      │  ┌────┴─────┐    ┌─────────────┐              │
//!                      │  │resilience│    │  registry   │              │
//!                      │  └──────────┘    └──────┬──────┘              │
//!                      │                         ▼                     │
//!   Subscribers (ws)   │                  ┌─────────────┐              │
//!   ◀──────────────────┼──────────────────│ http server │◀── /health   │
//!                      │                  └─────────────┘    /status   │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use ais_relay::config::load_config;
use ais_relay::lifecycle::{wait_for_stop_signal, Shutdown};
use ais_relay::observability::{logging, metrics};
use ais_relay::relay::{Broadcaster, RelayState, SubscriberRegistry, UpstreamLink};
use ais_relay::resilience::ReconnectPolicy;
use ais_relay::RelayServer;

#[derive(Parser)]
#[command(name = "ais-relay")]
#[command(about = "Relay an AIS WebSocket feed to many subscribers", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Malformed configuration is fatal before anything connects.
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ais-relay: {e}");
            std::process::exit(2);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!("ais-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        regions = config.upstream.bounding_boxes.len(),
        strategy = ?config.reconnect.strategy,
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

    let state = Arc::new(RelayState::new());
    let registry = Arc::new(SubscriberRegistry::new(config.downstream.send_queue_capacity));
    let broadcaster = Arc::new(Broadcaster::new(registry, state));

    let upstream = UpstreamLink::spawn(
        config.upstream.clone(),
        ReconnectPolicy::from(&config.reconnect),
        broadcaster.clone(),
        config.observability.log_every_n_messages,
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    let server = RelayServer::new(config, broadcaster.clone());
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    upstream.connect().await;

    let signal = wait_for_stop_signal().await?;
    tracing::info!(signal = ?signal, "Shutting down gracefully");

    upstream.stop().await;
    broadcaster.close_all();
    shutdown.trigger();

    match server_task.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
