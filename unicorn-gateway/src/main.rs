//! Unicorn Gateway - Entry Point

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use unicorn_gateway::{Config, Socks5Gateway, VERSION};

/// Local SOCKS5 gateway for the Unicorn tunnel
#[derive(Parser)]
#[command(name = "unicorn-gateway")]
#[command(version = VERSION)]
#[command(about = "SOCKS5 gateway forwarding sessions over an encrypted uplink")]
struct Cli {
    /// SOCKS5 listen endpoint, local_host:local_port
    listen: String,
    /// Remote endpoint and shared secret, server_host:server_port:password
    server: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::parse(&cli.listen, &cli.server) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            eprintln!(
                "example argument line: 127.0.0.1:1080 tunnel.example.net:1240:secret"
            );
            std::process::exit(1);
        }
    };

    unicorn_server::util::init_tracing("info")?;

    info!(
        version = VERSION,
        listen = %config.listen_addr,
        server_host = %config.server.host,
        server_port = config.server.port,
        "Starting Unicorn gateway"
    );

    let gateway = Socks5Gateway::bind(Arc::new(config)).await?;

    // Run gateway with graceful shutdown
    tokio::select! {
        result = gateway.run() => {
            if let Err(e) = result {
                error!(error = %e, "Gateway error");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Gateway stopped");
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
