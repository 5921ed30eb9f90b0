//! Server configuration.
//!
//! The server takes at most two positional arguments: the shared
//! secret and the listen address. Both have compiled-in defaults, the
//! reference deployment being `0.0.0.0:1240` with the stock password.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

/// Compiled-in listen endpoint.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:1240";

/// Compiled-in shared secret. Deployments should pass their own.
pub const DEFAULT_SECRET: &str = "password";

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the tunnel listener binds.
    pub listen_addr: SocketAddr,
    /// Shared secret seeding every session's keystreams.
    pub secret: Arc<str>,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
}

impl Config {
    /// Build a config from the positional arguments after the program
    /// name: `[password] [listen_addr]`.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let secret = args.next().unwrap_or_else(|| DEFAULT_SECRET.to_string());
        let listen = args
            .next()
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        if args.next().is_some() {
            bail!("too many arguments");
        }

        let listen_addr = listen
            .parse()
            .with_context(|| format!("invalid listen address {listen:?} (expected ip:port)"))?;

        let config = Self {
            listen_addr,
            secret: secret.into(),
            max_sessions: default_max_sessions(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            bail!("password must not be empty");
        }
        if self.max_sessions == 0 {
            bail!("max_sessions must be > 0");
        }
        Ok(())
    }
}

fn default_max_sessions() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_arguments() {
        let config = Config::from_args(Vec::new()).unwrap();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR.parse().unwrap());
        assert_eq!(&*config.secret, DEFAULT_SECRET);
        assert_eq!(config.max_sessions, 1024);
    }

    #[test]
    fn password_and_listen_addr_override() {
        let args = vec!["hunter2".to_string(), "127.0.0.1:9000".to_string()];
        let config = Config::from_args(args).unwrap();
        assert_eq!(&*config.secret, "hunter2");
        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn bad_listen_addr_is_rejected() {
        let args = vec!["hunter2".to_string(), "not-an-endpoint".to_string()];
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn extra_arguments_are_rejected() {
        let args: Vec<String> =
            vec!["a".into(), "127.0.0.1:1240".into(), "surplus".into()];
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn empty_password_is_rejected() {
        let args = vec![String::new()];
        assert!(Config::from_args(args).is_err());
    }
}
