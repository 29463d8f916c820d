//! mm-relay - MIDI CC fan-out relay
//!
//! Receives CC values and channel moves from bridges, remembers the last
//! value per (device, channel, cc) and streams broadcasts to every viewer.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mm_common::config::load_toml_config;
use mm_relay::{build_router, AppState};

/// Command-line arguments for mm-relay
#[derive(Parser, Debug)]
#[command(name = "mm-relay")]
#[command(about = "MIDI CC fan-out relay for MIDImachine")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides [relay] port)
    #[arg(short, long, env = "MIDIMACHINE_RELAY_PORT")]
    port: Option<u16>,

    /// Interface to bind (overrides [relay] host)
    #[arg(long, env = "MIDIMACHINE_RELAY_HOST")]
    host: Option<String>,

    /// Bootstrap TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_toml_config(args.config.as_deref());

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mm_relay={},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MIDImachine relay (mm-relay) v{}", env!("CARGO_PKG_VERSION"));

    let host = args.host.unwrap_or(config.relay.host);
    let port = args.port.unwrap_or(config.relay.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

    let state = AppState::new(config.relay.event_capacity);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("mm-relay listening on http://{}", addr);
    info!("Event stream: http://{}/api/events", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
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
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
