//! External collaborators
//!
//! Ports the engine consumes (resource lookup, pause, notify, status
//! broadcast) and their command-line and in-memory implementations.

pub mod broadcast;
pub mod notify;
pub mod playback;
pub mod ports;
pub mod recording;
pub mod retry;
pub mod system;

// Re-export main types
pub use broadcast::ChannelBroadcaster;
pub use notify::{DesktopNotifier, LogNotifier};
pub use playback::PlayerctlController;
pub use ports::{ActionPorts, NotifyAction, PauseAction, ResourceCheck, StatusBroadcast};
pub use recording::RecordingPorts;
pub use retry::retry_with_backoff;
pub use system::*;
