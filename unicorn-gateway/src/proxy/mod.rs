//! Client-facing proxy surface
//!
//! The SOCKS5 listener loopback applications talk to.

pub mod socks5;

pub use socks5::Socks5Gateway;
