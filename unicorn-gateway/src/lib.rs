//! Unicorn Gateway Library
//!
//! The local endpoint: an unauthenticated SOCKS5 front for loopback
//! clients, forwarding each accepted session over an encrypted TCP
//! uplink to the remote server.

pub mod config;
pub mod proxy;
pub mod tunnel;

pub use config::Config;
pub use proxy::Socks5Gateway;

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
