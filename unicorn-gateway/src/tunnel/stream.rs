//! Encrypted uplink streaming
//!
//! Dials the remote server, sends the enciphered request frame, then
//! stitches the client and uplink byte streams together.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use unicorn_server::cipher::SessionCipher;
use unicorn_server::protocol::{self, TargetAddr};

use crate::config::ServerEndpoint;

/// Uplink dial deadline.
pub const UPLINK_TIMEOUT: Duration = Duration::from_secs(15);

/// Fixed success reply delivered to the SOCKS5 client in place of the
/// server's first frame: success, bound at 0.0.0.0:0. Skipping the
/// round trip of the real bound address lets streaming start as soon
/// as the server answers at all.
pub const SYNTHETIC_REPLY: [u8; 10] = [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];

const RELAY_BUF_SIZE: usize = 16384;

/// Open the uplink for one client session and stream until either
/// side closes. A dial failure or timeout closes the client without a
/// SOCKS5 failure reply.
pub async fn open_and_stream(
    client: TcpStream,
    server: &ServerEndpoint,
    command: u8,
    addr: TargetAddr,
    port: u16,
) -> Result<()> {
    let mut cipher = SessionCipher::new(&server.secret);
    let mut frame =
        protocol::encode_request(command, &addr, port).context("encode request frame")?;
    cipher.encrypt(&mut frame);

    let mut uplink = timeout(
        UPLINK_TIMEOUT,
        TcpStream::connect((server.host.as_str(), server.port)),
    )
    .await
    .map_err(|_| anyhow!("uplink dial to {}:{} timed out", server.host, server.port))?
    .with_context(|| format!("uplink dial to {}:{}", server.host, server.port))?;
    let _ = uplink.set_nodelay(true);

    uplink
        .write_all(&frame)
        .await
        .context("send request frame")?;

    debug!(target = %addr, port, "uplink established, streaming");

    stream_between(client, uplink, cipher).await;

    Ok(())
}

/// The STREAMING phase: client bytes are enciphered onto the uplink;
/// uplink bytes are deciphered back, with the first chunk replaced by
/// the synthetic reply.
async fn stream_between(client: TcpStream, uplink: TcpStream, cipher: SessionCipher) {
    let (mut enc, mut dec) = cipher.into_halves();
    let (mut client_read, mut client_write) = client.into_split();
    let (mut uplink_read, mut uplink_write) = uplink.into_split();

    let upstream = async {
        let mut buf = vec![0u8; RELAY_BUF_SIZE];
        loop {
            match client_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    enc.apply(&mut buf[..n]);
                    if uplink_write.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = uplink_write.shutdown().await;
    };

    let downstream = async {
        let mut buf = vec![0u8; RELAY_BUF_SIZE];
        let mut first_chunk = true;
        loop {
            match uplink_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    // Decipher even the chunk being replaced so the
                    // keystream stays aligned with the server's.
                    dec.apply(&mut buf[..n]);
                    let out: &[u8] = if first_chunk {
                        first_chunk = false;
                        &SYNTHETIC_REPLY
                    } else {
                        &buf[..n]
                    };
                    if client_write.write_all(out).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = client_write.shutdown().await;
    };

    tokio::join!(upstream, downstream);
}
