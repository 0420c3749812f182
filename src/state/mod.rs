//! State management module
//!
//! The persisted timer record, the snapshots observers see, and the shared
//! application state handed to the HTTP layer.

pub mod app_state;
pub mod timer_record;

// Re-export main types
pub use app_state::AppState;
pub use timer_record::{
    ExpirationMark, LastRun, RunOutcome, TimerRecord, TimerSnapshot, TimerStatus,
    MAX_DURATION_SECONDS,
};
