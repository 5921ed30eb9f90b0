//! Uplink management
//!
//! The encrypted TCP connection from gateway to remote server.

mod stream;

pub use stream::{open_and_stream, SYNTHETIC_REPLY, UPLINK_TIMEOUT};
