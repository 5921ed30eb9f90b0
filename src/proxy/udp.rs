//! UDP association relay
//!
//! One datagram socket per association, demultiplexed purely by source
//! address — there is no table of outstanding requests. Datagrams from
//! the recorded client endpoint are decrypted, parsed as inner frames
//! and forwarded plain to the frame's target; datagrams from anyone
//! else are wrapped in an encrypted envelope frame and returned to the
//! client. A client behind a symmetric NAT therefore breaks the
//! association, and datagram loss or reordering desynchronizes the
//! relay keystream; both are protocol limitations, not bugs to fix
//! here.

use std::net::{IpAddr, SocketAddr};

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tracing::debug;

use crate::cipher::SessionCipher;
use crate::metrics::METRICS;
use crate::protocol::{self, Request, TargetAddr};
use crate::util::create_udp_socket;

const DATAGRAM_BUF_SIZE: usize = 65536;

/// Serve a UDP association until the TCP liveness channel drops.
///
/// The request names the endpoint client datagrams will come from
/// (`0.0.0.0` meaning "the TCP peer's address"). The relay socket
/// binds an ephemeral port on the same interface the TCP session
/// arrived on, and its address is sent back in the reply frame.
pub async fn run_udp_association(
    request: Request,
    mut client: TcpStream,
    mut cipher: SessionCipher,
    local_addr: SocketAddr,
    client_addr: SocketAddr,
    secret: &str,
) -> Result<()> {
    let expected = match resolve_expected_source(&request, client_addr).await {
        Ok(addr) => addr,
        Err(e) => {
            reject(&mut client, &mut cipher).await;
            return Err(e);
        }
    };

    let socket = match create_udp_socket(SocketAddr::new(local_addr.ip(), 0)) {
        Ok(socket) => socket,
        Err(e) => {
            reject(&mut client, &mut cipher).await;
            return Err(e.context("bind relay socket"));
        }
    };
    let bound = socket.local_addr().context("relay socket address")?;

    let mut reply = protocol::encode_reply(protocol::ERR_NONE, bound);
    cipher.encrypt(&mut reply);
    client.write_all(&reply).await.context("write reply frame")?;

    debug!(relay = %bound, client = %expected, "udp association established");

    // The association gets its own keystream pair; the TCP session's
    // pair stays with the liveness channel.
    let mut relay_cipher = SessionCipher::new(secret);

    let mut lease_buf = vec![0u8; 4096];
    let mut dgram_buf = vec![0u8; DATAGRAM_BUF_SIZE];

    loop {
        tokio::select! {
            read = client.read(&mut lease_buf) => {
                match read {
                    // Lease dropped: tear the association down.
                    Ok(0) | Err(_) => break,
                    // Payload on the lease is discarded, but the
                    // keystream still advances over it.
                    Ok(n) => cipher.decrypt(&mut lease_buf[..n]),
                }
            }
            received = socket.recv_from(&mut dgram_buf) => {
                let (n, src) = received.context("relay socket receive")?;
                if src == expected {
                    relay_cipher.decrypt(&mut dgram_buf[..n]);
                    match protocol::decode_request(&dgram_buf[..n]) {
                        Ok(frame) => {
                            forward_to_target(&socket, &frame, &dgram_buf[frame.consumed..n]).await;
                        }
                        Err(e) => {
                            METRICS.frame_rejected();
                            debug!(error = %e, "dropping client datagram");
                        }
                    }
                } else {
                    let mut envelope = protocol::encode_datagram(src, &dgram_buf[..n]);
                    relay_cipher.encrypt(&mut envelope);
                    match socket.send_to(&envelope, expected).await {
                        Ok(_) => METRICS.datagram_returned(),
                        Err(e) => debug!(error = %e, "envelope send failed"),
                    }
                }
            }
        }
    }

    debug!(relay = %bound, "udp association closed");

    Ok(())
}

/// Send one decapsulated datagram on its way to the target.
async fn forward_to_target(socket: &UdpSocket, frame: &Request, payload: &[u8]) {
    let target = match resolve_target(&frame.addr, frame.port).await {
        Ok(target) => target,
        Err(e) => {
            debug!(error = %e, "dropping datagram for unresolvable target");
            return;
        }
    };

    match socket.send_to(payload, target).await {
        Ok(_) => METRICS.datagram_forwarded(),
        Err(e) => debug!(target = %target, error = %e, "datagram forward failed"),
    }
}

async fn resolve_target(addr: &TargetAddr, port: u16) -> Result<SocketAddr> {
    match addr {
        TargetAddr::Ipv4(ip) => Ok(SocketAddr::new(IpAddr::V4(*ip), port)),
        TargetAddr::Ipv6(ip) => Ok(SocketAddr::new(IpAddr::V6(*ip), port)),
        TargetAddr::Domain(host) => lookup_host((host.as_str(), port))
            .await
            .with_context(|| format!("resolve {host}"))?
            .next()
            .ok_or_else(|| anyhow!("no address for {host}")),
    }
}

/// Where client datagrams will come from. The client announces its
/// own endpoint in the associate request; `0.0.0.0` substitutes the
/// TCP peer's address.
async fn resolve_expected_source(
    request: &Request,
    tcp_peer: SocketAddr,
) -> Result<SocketAddr> {
    let ip = match &request.addr {
        TargetAddr::Ipv4(ip) if ip.is_unspecified() => tcp_peer.ip(),
        TargetAddr::Ipv4(ip) => IpAddr::V4(*ip),
        TargetAddr::Ipv6(ip) => IpAddr::V6(*ip),
        TargetAddr::Domain(host) => lookup_host((host.as_str(), request.port))
            .await
            .with_context(|| format!("resolve client endpoint {host}"))?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| anyhow!("no address for client endpoint {host}"))?,
    };
    Ok(SocketAddr::new(ip, request.port))
}

async fn reject(client: &mut TcpStream, cipher: &mut SessionCipher) {
    let mut reply = protocol::unreachable_reply();
    cipher.encrypt(&mut reply);
    let _ = client.write_all(&reply).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unspecified_client_host_substitutes_tcp_peer() {
        let request = Request {
            command: protocol::CMD_UDP_ASSOCIATE,
            addr: TargetAddr::Ipv4("0.0.0.0".parse().unwrap()),
            port: 5353,
            consumed: 11,
        };
        let tcp_peer: SocketAddr = "192.0.2.9:61000".parse().unwrap();
        let expected = resolve_expected_source(&request, tcp_peer).await.unwrap();
        assert_eq!(expected, "192.0.2.9:5353".parse().unwrap());
    }

    #[tokio::test]
    async fn announced_client_endpoint_is_kept() {
        let request = Request {
            command: protocol::CMD_UDP_ASSOCIATE,
            addr: TargetAddr::Ipv4("198.51.100.4".parse().unwrap()),
            port: 40000,
            consumed: 11,
        };
        let tcp_peer: SocketAddr = "192.0.2.9:61000".parse().unwrap();
        let expected = resolve_expected_source(&request, tcp_peer).await.unwrap();
        assert_eq!(expected, "198.51.100.4:40000".parse().unwrap());
    }
}
