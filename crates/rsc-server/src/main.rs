//! rsc-server: Main Entry Point

use clap::Parser;
use rsc_server::{AppState, Cli};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from /etc/rsc/environment (if exists)
    rsc_core::config::load_environment();

    let config = Cli::parse().into_config()?;

    let json_logs = config.json_logs;
    tracing_subscriber::registry()
        .with(json_logs.then(|| fmt::layer().json()))
        .with((!json_logs).then(|| fmt::layer().compact()))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rsc_server=debug")),
        )
        .init();

    info!("Initializing application state...");
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config).await?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Tool executor listening on {}", listener.local_addr()?);

    rsc_server::serve(listener, state, shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

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
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
