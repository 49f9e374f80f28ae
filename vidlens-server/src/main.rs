//! vidlens-server - video search enrichment service
//!
//! Serves the WebSocket client protocol, lookup endpoints and the event stream
//! on top of the supervised worker tree.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidlens_common::config::{ConfigOverrides, ServiceConfig};
use vidlens_common::events::EventBus;

use vidlens_server::workers::{Supervisor, WorkerSettings};
use vidlens_server::youtube::YouTubeClient;
use vidlens_server::{build_router, AppState};

/// Command-line arguments for vidlens-server
#[derive(Parser, Debug)]
#[command(name = "vidlens-server")]
#[command(about = "Video search enrichment service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// YouTube Data API key
    #[arg(long)]
    api_key: Option<String>,

    /// YouTube Data API base URL
    #[arg(long)]
    api_base_url: Option<String>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        Self {
            config_path: args.config,
            bind_address: args.bind,
            port: args.port,
            api_key: args.api_key,
            api_base_url: args.api_base_url,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::resolve(&args.into()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "vidlens_server={level},vidlens_common={level},tower_http={level}",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vidlens-server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if config.api_key.is_none() {
        warn!("No YouTube API key configured; searches will return empty results");
    }

    let source = YouTubeClient::from_config(&config).context("Failed to build YouTube client")?;

    // Create event bus for SSE broadcasting
    let events = EventBus::new(100);
    let supervisor = Supervisor::start(WorkerSettings::from(&config), Arc::new(source), events);

    let app = build_router(AppState::new(supervisor.clone()));

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("WebSocket: ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    supervisor.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
