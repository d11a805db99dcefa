//! Vaultwatch Server
//!
//! Storage monitoring backend with WebSocket API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use vaultwatch::catalog::GeometryCatalog;
use vaultwatch::config::AppConfig;
use vaultwatch::monitor;
use vaultwatch::notify::{BroadcastNotifier, FanoutNotifier, LogNotifier, Notifier};
use vaultwatch::server::{create_router, spawn_forwarders, AppState};

/// Vaultwatch Storage Monitoring Server
#[derive(Parser, Debug)]
#[command(name = "vaultwatch")]
#[command(about = "Vaultwatch Storage Monitoring Server", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./vaultwatch.toml")]
    config: PathBuf,

    /// Server host address (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Observed storage identifier (overrides configuration)
    #[arg(long)]
    storage: Option<String>,

    /// Don't request a storage snapshot at startup
    #[arg(long)]
    no_initial_request: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vaultwatch=info,tower_http=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments
    let args = Args::parse();

    info!("Starting Vaultwatch server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(Some(&args.config))?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.storage.is_some() {
        config.storage.id = args.storage;
    }

    // Build the geometry catalog once; it is read-only afterwards
    let catalog = Arc::new(GeometryCatalog::builtin().with_templates(&config.templates));
    info!("Geometry catalog has {} module templates", catalog.models().count());

    // Notifications go to the log and to subscribed dashboard clients
    let broadcast_notifier = BroadcastNotifier::new(256);
    let notifier: Arc<dyn Notifier> = Arc::new(
        FanoutNotifier::new()
            .with(Arc::new(LogNotifier))
            .with(Arc::new(broadcast_notifier.clone())),
    );

    let initial_storage = if args.no_initial_request || !config.storage.request_on_start {
        None
    } else {
        config.storage.id.clone()
    };
    if let Some(storage_id) = &initial_storage {
        info!("Observing storage {storage_id}");
    }

    // Start the monitor loop
    let (upstream_tx, upstream_rx) = mpsc::channel(64);
    let (monitor_handle, monitor_join) =
        monitor::spawn(catalog, notifier, upstream_tx, initial_storage);

    // Wire the server to the monitor
    let state = AppState::new(monitor_handle.clone());
    spawn_forwarders(state.clone(), broadcast_notifier, upstream_rx);

    // Create router
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the monitor loop
    let _ = monitor_handle.shutdown().await;
    let _ = monitor_join.await;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
