//! Background tasks module
//!
//! This module contains background tasks that run alongside the HTTP server.

pub mod countdown;
pub mod wake_dispatch;

// Re-export main functions
pub use countdown::countdown_task;
pub use wake_dispatch::wake_dispatch_task;
