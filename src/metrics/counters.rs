//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any session
//! task.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Session metrics
    pub sessions_total: AtomicU64,
    pub sessions_active: AtomicU64,
    pub sessions_rejected: AtomicU64,

    // Traffic metrics
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,

    // UDP relay metrics
    pub datagrams_forwarded: AtomicU64,
    pub datagrams_returned: AtomicU64,

    // Error metrics
    pub frames_rejected: AtomicU64,
    pub dial_timeouts: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            sessions_rejected: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            datagrams_forwarded: AtomicU64::new(0),
            datagrams_returned: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            dial_timeouts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes received from a client uplink.
    #[inline]
    pub fn bytes_rx(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    /// Bytes sent back to a client uplink.
    #[inline]
    pub fn bytes_tx(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn datagram_forwarded(&self) {
        self.datagrams_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn datagram_returned(&self) {
        self.datagrams_returned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dial_timeout(&self) {
        self.dial_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters at once for logging.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            datagrams_forwarded: self.datagrams_forwarded.load(Ordering::Relaxed),
            datagrams_returned: self.datagrams_returned.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            dial_timeouts: self.dial_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub sessions_total: u64,
    pub sessions_active: u64,
    pub sessions_rejected: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub datagrams_forwarded: u64,
    pub datagrams_returned: u64,
    pub frames_rejected: u64,
    pub dial_timeouts: u64,
}
