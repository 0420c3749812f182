//! Error taxonomy shared by the engine, the store and the API layer

use thiserror::Error;

/// Errors surfaced by timer operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("duration must be between 1 and {max} seconds, got {got}")]
    InvalidDuration { got: u64, max: u64 },
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("no active timer")]
    NoActiveTimer,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("action port failure: {0}")]
    ActionPortFailure(String),
}

impl TimerError {
    /// Stable machine-readable code used in API responses
    pub fn code(&self) -> &'static str {
        match self {
            TimerError::InvalidDuration { .. } => "INVALID_DURATION",
            TimerError::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",
            TimerError::NoActiveTimer => "NO_ACTIVE_TIMER",
            TimerError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            TimerError::ActionPortFailure(_) => "ACTION_PORT_FAILURE",
        }
    }
}

pub type Result<T> = std::result::Result<T, TimerError>;
