//! Session registry
//!
//! Tracks live sessions for capacity limiting, phase visibility and
//! the shutdown broadcast.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::state::{SessionEntry, SessionId, SessionPhase};

/// Manages all active sessions
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    next_id: AtomicU64,
    max_sessions: usize,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            sessions: DashMap::with_capacity(max_sessions.min(1024)),
            next_id: AtomicU64::new(1),
            max_sessions,
            shutdown_tx,
        })
    }

    /// Register a new session. Returns `None` at capacity.
    pub fn register(&self, client_addr: SocketAddr) -> Option<SessionId> {
        if self.sessions.len() >= self.max_sessions {
            return None;
        }

        let id = SessionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(id, SessionEntry::new(id, client_addr));
        Some(id)
    }

    /// Record a session's move out of `WaitCmd`.
    pub fn set_phase(&self, id: SessionId, phase: SessionPhase) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.phase = phase;
        }
    }

    /// Drop a session from the registry. Idempotent: unregistering an
    /// unknown or already-removed id is a no-op.
    pub fn unregister(&self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some((_, entry)) => {
                debug!(
                    session = %id,
                    client = %entry.client_addr,
                    duration_secs = entry.duration().as_secs_f64(),
                    "session unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub fn active(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is at capacity.
    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    /// Tell every session to wind down.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Receiver for the shutdown broadcast.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4321".parse().unwrap()
    }

    #[test]
    fn register_assigns_unique_ids() {
        let registry = SessionRegistry::new(16);
        let a = registry.register(addr()).unwrap();
        let b = registry.register(addr()).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.active(), 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let registry = SessionRegistry::new(2);
        assert!(registry.register(addr()).is_some());
        assert!(registry.register(addr()).is_some());
        assert!(registry.is_full());
        assert!(registry.register(addr()).is_none());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = SessionRegistry::new(4);
        let id = registry.register(addr()).unwrap();
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert_eq!(registry.active(), 0);
    }

    #[test]
    fn phase_moves_out_of_wait_cmd() {
        let registry = SessionRegistry::new(4);
        let id = registry.register(addr()).unwrap();
        assert_eq!(
            registry.sessions.get(&id).unwrap().phase,
            SessionPhase::WaitCmd
        );
        registry.set_phase(id, SessionPhase::TcpTunnel);
        assert_eq!(
            registry.sessions.get(&id).unwrap().phase,
            SessionPhase::TcpTunnel
        );
    }
}
