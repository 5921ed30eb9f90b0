//! Per-uplink session state machine
//!
//! Every inbound byte is decrypted at the session boundary. The first
//! decrypted bytes must form a signed request frame; only then does
//! the session cause any outbound side effect, moving from `WaitCmd`
//! into exactly one of `TcpTunnel` or `UdpTunnel`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::cipher::SessionCipher;
use crate::config::Config;
use crate::connection::{SessionId, SessionPhase, SessionRegistry};
use crate::metrics::METRICS;
use crate::protocol::{self, FrameError};
use crate::proxy::{run_tcp_tunnel, run_udp_association};

/// Cap on buffered ciphertext while awaiting a complete request frame.
const MAX_PENDING_HEADER: usize = 512;

/// Handles a single accepted uplink.
pub struct SessionHandler {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl SessionHandler {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<Config>) -> Self {
        Self { registry, config }
    }

    /// Drive the session to completion and unregister it.
    pub async fn handle(self, stream: TcpStream, client_addr: SocketAddr) -> Result<()> {
        let id = match self.registry.register(client_addr) {
            Some(id) => id,
            None => {
                warn!(client = %client_addr, "session rejected: registry full");
                return Ok(());
            }
        };
        METRICS.session_opened();

        let result = self.run(id, stream, client_addr).await;

        self.registry.unregister(id);
        METRICS.session_closed();

        result
    }

    async fn run(
        &self,
        id: SessionId,
        mut stream: TcpStream,
        client_addr: SocketAddr,
    ) -> Result<()> {
        let _ = stream.set_nodelay(true);
        let local_addr = stream.local_addr().context("session local address")?;

        let mut cipher = SessionCipher::new(&self.config.secret);
        let mut shutdown_rx = self.registry.subscribe_shutdown();

        // WaitCmd: accumulate decrypted bytes until one frame parses.
        let mut pending = BytesMut::with_capacity(256);
        let request = loop {
            let mut chunk = [0u8; 256];
            let n = tokio::select! {
                read = stream.read(&mut chunk) => read.context("uplink read")?,
                _ = shutdown_rx.recv() => bail!("server shutting down"),
            };
            if n == 0 {
                bail!("uplink closed before a complete request");
            }
            cipher.decrypt(&mut chunk[..n]);
            pending.extend_from_slice(&chunk[..n]);

            match protocol::decode_request(&pending) {
                Ok(request) => break request,
                Err(FrameError::Truncated) if pending.len() <= MAX_PENDING_HEADER => {}
                Err(e) => {
                    METRICS.frame_rejected();
                    bail!("request frame rejected: {e}");
                }
            }
        };

        debug!(
            session = %id,
            client = %client_addr,
            command = request.command,
            target = %request.addr,
            port = request.port,
            "request frame accepted"
        );

        let leftover = pending.split_off(request.consumed).freeze();

        match request.command {
            // CONNECT just like the BIND command
            protocol::CMD_CONNECT | protocol::CMD_BIND => {
                self.registry.set_phase(id, SessionPhase::TcpTunnel);
                run_tcp_tunnel(request, leftover, stream, cipher).await
            }
            protocol::CMD_UDP_ASSOCIATE => {
                self.registry.set_phase(id, SessionPhase::UdpTunnel);
                run_udp_association(
                    request,
                    stream,
                    cipher,
                    local_addr,
                    client_addr,
                    &self.config.secret,
                )
                .await
            }
            other => {
                METRICS.frame_rejected();
                bail!("unknown command {other}");
            }
        }
    }
}
