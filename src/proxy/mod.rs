//! Outbound relay engines
//!
//! One module per tunnel kind: TCP stream relay and UDP association.

mod tcp;
mod udp;

pub use tcp::{run_tcp_tunnel, DIAL_TIMEOUT};
pub use udp::run_udp_association;
