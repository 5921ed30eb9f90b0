//! Session identity and lifecycle state

use std::net::SocketAddr;
use std::time::Instant;

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Protocol phase of a server-side session.
///
/// A session holds at most one tunnel: it either moves from
/// `WaitCmd` to `TcpTunnel` or to `UdpTunnel`, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Awaiting the first decrypted inner frame.
    WaitCmd,
    /// Relaying a TCP tunnel to the dialed target.
    TcpTunnel,
    /// Holding a UDP association; the TCP side is a liveness lease.
    UdpTunnel,
}

/// Per-session registry entry.
#[derive(Debug)]
pub struct SessionEntry {
    pub id: SessionId,
    pub client_addr: SocketAddr,
    pub phase: SessionPhase,
    pub opened_at: Instant,
}

impl SessionEntry {
    pub fn new(id: SessionId, client_addr: SocketAddr) -> Self {
        Self {
            id,
            client_addr,
            phase: SessionPhase::WaitCmd,
            opened_at: Instant::now(),
        }
    }

    /// Time since the uplink was accepted.
    pub fn duration(&self) -> std::time::Duration {
        self.opened_at.elapsed()
    }
}
