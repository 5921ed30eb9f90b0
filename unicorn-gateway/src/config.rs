//! Gateway configuration
//!
//! Parsed from the two positional CLI arguments:
//! `local_host:local_port` and `server_host:server_port:password`.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};

/// Root configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// SOCKS5 listen endpoint.
    pub listen_addr: SocketAddr,
    /// Remote server endpoint and shared secret.
    pub server: ServerEndpoint,
}

/// Remote endpoint specification
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub secret: String,
}

impl Config {
    /// Parse both positional arguments.
    pub fn parse(listen: &str, server: &str) -> Result<Self> {
        let listen_addr = listen.parse().with_context(|| {
            format!("invalid listen endpoint {listen:?} (expected local_host:local_port)")
        })?;
        let server = ServerEndpoint::parse(server)?;
        Ok(Self {
            listen_addr,
            server,
        })
    }
}

impl ServerEndpoint {
    /// Parse `server_host:server_port:password`. Anything after the
    /// second colon belongs to the password.
    fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.splitn(3, ':');
        let (Some(host), Some(port), Some(secret)) =
            (parts.next(), parts.next(), parts.next())
        else {
            bail!("invalid server endpoint {raw:?} (expected server_host:server_port:password)");
        };

        if host.is_empty() {
            bail!("server host must not be empty");
        }
        if secret.is_empty() {
            bail!("password must not be empty");
        }
        let port = port
            .parse()
            .with_context(|| format!("invalid server port {port:?}"))?;

        Ok(Self {
            host: host.to_string(),
            port,
            secret: secret.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_argument_line_parses() {
        let config =
            Config::parse("127.0.0.1:1080", "tunnel.example.net:1240:hunter2").unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:1080".parse().unwrap());
        assert_eq!(config.server.host, "tunnel.example.net");
        assert_eq!(config.server.port, 1240);
        assert_eq!(config.server.secret, "hunter2");
    }

    #[test]
    fn password_may_contain_colons() {
        let config = Config::parse("127.0.0.1:1080", "10.0.0.1:1240:a:b:c").unwrap();
        assert_eq!(config.server.secret, "a:b:c");
    }

    #[test]
    fn listen_endpoint_must_be_ip_and_port() {
        assert!(Config::parse("nonsense", "10.0.0.1:1240:pw").is_err());
        assert!(Config::parse("127.0.0.1", "10.0.0.1:1240:pw").is_err());
    }

    #[test]
    fn server_endpoint_needs_all_three_fields() {
        assert!(Config::parse("127.0.0.1:1080", "10.0.0.1:1240").is_err());
        assert!(Config::parse("127.0.0.1:1080", "10.0.0.1").is_err());
        assert!(Config::parse("127.0.0.1:1080", ":1240:pw").is_err());
        assert!(Config::parse("127.0.0.1:1080", "10.0.0.1:1240:").is_err());
    }

    #[test]
    fn bad_server_port_is_rejected() {
        assert!(Config::parse("127.0.0.1:1080", "10.0.0.1:http:pw").is_err());
        assert!(Config::parse("127.0.0.1:1080", "10.0.0.1:99999:pw").is_err());
    }
}
