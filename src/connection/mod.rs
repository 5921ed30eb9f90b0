//! Session tracking
//!
//! Registry of live sessions and their lifecycle state.

mod manager;
mod state;

pub use manager::SessionRegistry;
pub use state::{SessionEntry, SessionId, SessionPhase};
