//! TCP tunnel relay
//!
//! Dials the true target and pumps bytes both ways. The client side of
//! the pair is enciphered; the target side is plain transport.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::cipher::SessionCipher;
use crate::metrics::METRICS;
use crate::protocol::{self, Request};

/// Outbound dial deadline.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(15);

const RELAY_BUF_SIZE: usize = 16384;

/// Dial the requested target and relay until either side closes.
///
/// On success the client first receives an encrypted reply frame
/// naming the dialed peer; on failure it receives the
/// host-unreachable reply and the session ends. `leftover` carries any
/// bytes that arrived after the request header and is flushed to the
/// target before streaming begins.
pub async fn run_tcp_tunnel(
    request: Request,
    leftover: Bytes,
    mut client: TcpStream,
    mut cipher: SessionCipher,
) -> Result<()> {
    let host = request.addr.to_string();
    let port = request.port;

    let mut target =
        match timeout(DIAL_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                reject_unreachable(&mut client, &mut cipher).await;
                return Err(e).with_context(|| format!("dial {host}:{port}"));
            }
            Err(_) => {
                METRICS.dial_timeout();
                reject_unreachable(&mut client, &mut cipher).await;
                bail!("dial {host}:{port} timed out");
            }
        };
    let _ = target.set_nodelay(true);

    let peer = target.peer_addr().context("target peer address")?;
    let mut reply = protocol::encode_reply(protocol::ERR_NONE, peer);
    cipher.encrypt(&mut reply);
    client.write_all(&reply).await.context("write reply frame")?;

    debug!(target = %peer, "tcp tunnel established");

    if !leftover.is_empty() {
        target
            .write_all(&leftover)
            .await
            .context("flush early bytes to target")?;
    }

    let (mut enc, mut dec) = cipher.into_halves();
    let (mut client_read, mut client_write) = client.into_split();
    let (mut target_read, mut target_write) = target.into_split();

    let client_to_target = async {
        let mut buf = vec![0u8; RELAY_BUF_SIZE];
        let mut total: u64 = 0;

        loop {
            match client_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    dec.apply(&mut buf[..n]);
                    if target_write.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                    total += n as u64;
                    METRICS.bytes_rx(n as u64);
                }
                Err(_) => break,
            }
        }
        let _ = target_write.shutdown().await;
        total
    };

    let target_to_client = async {
        let mut buf = vec![0u8; RELAY_BUF_SIZE];
        let mut total: u64 = 0;

        loop {
            match target_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    enc.apply(&mut buf[..n]);
                    if client_write.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                    total += n as u64;
                    METRICS.bytes_tx(n as u64);
                }
                Err(_) => break,
            }
        }
        let _ = client_write.shutdown().await;
        total
    };

    let (up_bytes, down_bytes) = tokio::join!(client_to_target, target_to_client);

    debug!(target = %peer, up_bytes, down_bytes, "tcp tunnel closed");

    Ok(())
}

/// Send the encrypted host-unreachable reply; errors are moot since
/// the session is closing anyway.
async fn reject_unreachable(client: &mut TcpStream, cipher: &mut SessionCipher) {
    let mut reply = protocol::unreachable_reply();
    cipher.encrypt(&mut reply);
    let _ = client.write_all(&reply).await;
}
