//! Deferred-wake port
//!
//! A wake is "at least once, not necessarily exactly once, not necessarily on
//! time". The engine never trusts a wake's payload; every wake is just a
//! prompt to re-derive state from the store.

pub mod recording;
pub mod tokio_port;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use recording::RecordingWakePort;
pub use tokio_port::TokioWakePort;

/// One-shot wake armed at the timer deadline
pub const EXPIRE_WAKE: &str = "sleep-timer.expire";
/// Coarse repeating wake that keeps reconciliation alive
pub const KEEPALIVE_WAKE: &str = "sleep-timer.keepalive";

/// Inbound wake delivered by a port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub name: String,
}

/// A wake as it is remembered across restarts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArmedAlarm {
    Once { name: String, at_epoch_ms: i64 },
    Repeating { name: String, period_secs: u64 },
}

impl ArmedAlarm {
    pub fn name(&self) -> &str {
        match self {
            ArmedAlarm::Once { name, .. } | ArmedAlarm::Repeating { name, .. } => name,
        }
    }
}

#[async_trait]
pub trait WakePort: Send + Sync {
    /// Deliver `name` once at or after `at_epoch_ms`. Re-arming a name replaces it.
    async fn schedule_once(&self, name: &str, at_epoch_ms: i64) -> Result<()>;
    /// Deliver `name` every `period_secs` until cancelled
    async fn schedule_repeating(&self, name: &str, period_secs: u64) -> Result<()>;
    /// Disarm `name`; unknown names are ignored
    async fn cancel(&self, name: &str) -> Result<()>;
}
