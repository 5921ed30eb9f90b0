//! Server metrics
//!
//! Hot-path atomic counters, read by the periodic stats log.

mod counters;

pub use counters::{Metrics, MetricsSnapshot, METRICS};
