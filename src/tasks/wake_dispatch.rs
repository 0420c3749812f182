//! Wake dispatch background task

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{engine::TimerEngine, wake::WakeEvent};

/// Feed every delivered wake into the engine until the port goes away
pub async fn wake_dispatch_task(engine: Arc<TimerEngine>, mut wake_rx: mpsc::Receiver<WakeEvent>) {
    info!("Starting wake dispatch task");

    while let Some(event) = wake_rx.recv().await {
        debug!("Dispatching wake {}", event.name);
        engine.handle_wake(&event.name).await;
    }

    info!("Wake channel closed, dispatch task exiting");
}
