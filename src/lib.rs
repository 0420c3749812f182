//! Sleep Timer - a durable single-slot countdown that pauses playback
//!
//! The timer survives process restarts: its deadline lives in a durable
//! store, deferred wakes are re-armed on start, and expiration runs through
//! a guard so pause and notify fire once no matter how many wake sources
//! converge on the same deadline.

pub mod config;
pub mod error;
pub mod state;
pub mod store;
pub mod wake;
pub mod engine;
pub mod api;
pub mod services;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::TimerError;
pub use engine::{EngineSettings, ExpireOutcome, TimerEngine};
pub use state::{AppState, TimerRecord, TimerSnapshot, TimerStatus};
pub use api::create_router;
pub use utils::signals::shutdown_signal;
