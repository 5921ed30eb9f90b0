//! Tunnel listener
//!
//! Accept loop for encrypted uplinks, one spawned session per client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::SessionRegistry;
use crate::metrics::METRICS;
use crate::util::create_tcp_listener;

use super::session::SessionHandler;

/// How often relay load is logged.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Unicorn tunnel server
pub struct Server {
    listener: TcpListener,
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    shutdown_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Bind the listener and prepare the session registry.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let listener = create_tcp_listener(config.listen_addr)
            .with_context(|| format!("bind tunnel listener to {}", config.listen_addr))?;
        let registry = SessionRegistry::new(config.max_sessions);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            listener,
            config,
            registry,
            shutdown_rx,
            shutdown_tx,
        })
    }

    /// The bound listen address (useful with an ephemeral port).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!(listen = %self.local_addr()?, "server accepting uplinks");

        // Periodic visibility into relay load.
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATS_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let snap = METRICS.snapshot();
                debug!(
                    active = registry.active(),
                    up_bytes = snap.bytes_received,
                    down_bytes = snap.bytes_sent,
                    datagrams = snap.datagrams_forwarded + snap.datagrams_returned,
                    "relay stats"
                );
            }
        });

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, client_addr)) => {
                            if self.registry.is_full() {
                                warn!(client = %client_addr, "uplink rejected: at capacity");
                                METRICS.session_rejected();
                                continue;
                            }

                            debug!(client = %client_addr, "uplink accepted");
                            let handler = SessionHandler::new(
                                self.registry.clone(),
                                self.config.clone(),
                            );
                            tokio::spawn(async move {
                                if let Err(e) = handler.handle(stream, client_addr).await {
                                    debug!(client = %client_addr, error = %e, "session ended");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Stop accepting and tell live sessions to wind down.
    pub fn shutdown(&self) {
        info!(active = self.registry.active(), "initiating shutdown");
        let _ = self.shutdown_tx.send(true);
        self.registry.signal_shutdown();
    }
}
