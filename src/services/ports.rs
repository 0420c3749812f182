//! Collaborator ports consumed by the engine

use std::sync::Arc;

use async_trait::async_trait;

use crate::{error::Result, state::TimerSnapshot};

/// Tells whether a controllable resource is still around
#[async_trait]
pub trait ResourceCheck: Send + Sync {
    async fn exists(&self, resource_id: &str) -> Result<bool>;
}

/// Stops playback on a resource. `Ok(false)` means nothing was playing.
#[async_trait]
pub trait PauseAction: Send + Sync {
    async fn pause(&self, resource_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait NotifyAction: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Fan-out of timer snapshots to observers. Never blocks, never fails loudly.
pub trait StatusBroadcast: Send + Sync {
    fn broadcast(&self, snapshot: &TimerSnapshot);
}

/// The full set of collaborators handed to the engine
#[derive(Clone)]
pub struct ActionPorts {
    pub resources: Arc<dyn ResourceCheck>,
    pub pause: Arc<dyn PauseAction>,
    pub notify: Arc<dyn NotifyAction>,
    pub broadcast: Arc<dyn StatusBroadcast>,
}
