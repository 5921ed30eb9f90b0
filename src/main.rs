//! Unicorn Server - Entry Point

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info};

use unicorn_server::{Config, Server, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            eprintln!("usage: unicorn-server [password] [listen_addr]");
            std::process::exit(1);
        }
    };

    unicorn_server::util::init_tracing("info")?;

    info!(
        version = VERSION,
        listen = %config.listen_addr,
        "Starting Unicorn server"
    );

    let server = Server::new(Arc::new(config))?;

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            server.shutdown();
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
