//! Timer lifecycle engine
//!
//! The engine owns the single timer slot. It never trusts its in-memory copy
//! of the record: every decision is re-derived from the durable store and
//! the wall clock, because a relaunched process may have changed the store
//! underneath it.

pub mod guard;
pub mod lifecycle;
pub mod reconcile;

use std::time::Duration;

pub use guard::{ExpirationContext, ExpirationGuard, ExpireOutcome};
pub use lifecycle::TimerEngine;

/// Tunables for the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Period of the repeating keepalive wake
    pub keepalive_period_secs: u64,
    /// How long a persisted expiration mark suppresses repeat handling.
    /// Must exceed the worst overlap between the countdown and wake latency.
    pub dedup_window: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            keepalive_period_secs: 30,
            dedup_window: Duration::from_secs(5),
        }
    }
}
