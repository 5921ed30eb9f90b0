//! SOCKS5 front end
//!
//! RFC 1928 subset: no-auth negotiation and the request parse. Every
//! accepted request is forwarded through the encrypted uplink; the
//! reply the client sees is the fixed synthetic success frame (see
//! the tunnel module).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use unicorn_server::protocol::TargetAddr;

use crate::config::Config;
use crate::tunnel;

/// SOCKS5 version
pub const VERSION: u8 = 0x05;

/// Authentication methods
pub const AUTH_NONE: u8 = 0x00;
pub const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

/// Commands
pub const CMD_CONNECT: u8 = 0x01;
pub const CMD_BIND: u8 = 0x02;
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

/// Address types
pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// SOCKS5 gateway server
pub struct Socks5Gateway {
    config: Arc<Config>,
    listener: TcpListener,
}

impl Socks5Gateway {
    /// Bind the SOCKS5 listener.
    pub async fn bind(config: Arc<Config>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("failed to bind SOCKS5 listener to {}", config.listen_addr))?;
        Ok(Self { config, listener })
    }

    /// The bound listen address (useful with an ephemeral port).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop.
    pub async fn run(&self) -> Result<()> {
        info!(listen = %self.local_addr()?, "SOCKS5 gateway listening");

        loop {
            match self.listener.accept().await {
                Ok((stream, client_addr)) => {
                    debug!(client = %client_addr, "client connected");
                    let config = self.config.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, config).await {
                            debug!(client = %client_addr, error = %e, "client session ended");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Negotiate, parse the request and hand the stream to the tunnel.
async fn handle_client(mut stream: TcpStream, config: Arc<Config>) -> Result<()> {
    // Greeting: VER NMETHODS METHODS...
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != VERSION {
        bail!("not a SOCKS5 greeting (version {})", header[0]);
    }

    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;
    if !methods.contains(&AUTH_NONE) {
        stream.write_all(&[VERSION, AUTH_NO_ACCEPTABLE]).await?;
        bail!("client offers no acceptable auth method");
    }
    stream.write_all(&[VERSION, AUTH_NONE]).await?;

    // Request: VER CMD RSV ATYP ADDR PORT
    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    if request[0] != VERSION {
        bail!("invalid request version {}", request[0]);
    }

    let command = request[1];
    if !matches!(command, CMD_CONNECT | CMD_BIND | CMD_UDP_ASSOCIATE) {
        bail!("unsupported command {command}");
    }

    let (addr, port) = read_target(&mut stream, request[3]).await?;

    debug!(command, target = %addr, port, "request accepted");

    tunnel::open_and_stream(stream, &config.server, command, addr, port).await
}

/// Read the request's address and port per the ATYP byte.
async fn read_target<R>(stream: &mut R, atyp: u8) -> Result<(TargetAddr, u16)>
where
    R: AsyncRead + Unpin,
{
    let addr = match atyp {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            TargetAddr::Ipv4(octets.into())
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            stream.read_exact(&mut name).await?;
            TargetAddr::Domain(String::from_utf8(name).context("domain is not valid UTF-8")?)
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            TargetAddr::Ipv6(octets.into())
        }
        other => bail!("unsupported address type {other}"),
    };

    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    Ok((addr, u16::from_be_bytes(port)))
}
