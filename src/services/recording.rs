//! In-memory collaborators that record every call

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use super::ports::{ActionPorts, NotifyAction, PauseAction, ResourceCheck, StatusBroadcast};
use crate::{
    error::{Result, TimerError},
    state::TimerSnapshot,
};

/// Fake player set with call recording
#[derive(Debug, Default)]
pub struct RecordingPlayback {
    resources: Mutex<HashSet<String>>,
    paused: Mutex<Vec<String>>,
    failing: AtomicBool,
    idle: AtomicBool,
    pause_delay_ms: AtomicU64,
}

impl RecordingPlayback {
    pub fn with_resources<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let playback = Self::default();
        if let Ok(mut set) = playback.resources.lock() {
            set.extend(resources.into_iter().map(Into::into));
        }
        playback
    }

    pub fn add_resource(&self, resource_id: &str) {
        if let Ok(mut set) = self.resources.lock() {
            set.insert(resource_id.to_string());
        }
    }

    pub fn remove_resource(&self, resource_id: &str) {
        if let Ok(mut set) = self.resources.lock() {
            set.remove(resource_id);
        }
    }

    /// Make `pause` fail after recording the call
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `pause` report that nothing was playing
    pub fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    /// Make `pause` take this long, to widen race windows in tests
    pub fn set_pause_delay(&self, delay: Duration) {
        self.pause_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn paused(&self) -> Vec<String> {
        self.paused.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn pause_count(&self) -> usize {
        self.paused().len()
    }
}

#[async_trait]
impl ResourceCheck for RecordingPlayback {
    async fn exists(&self, resource_id: &str) -> Result<bool> {
        Ok(self
            .resources
            .lock()
            .map(|set| set.contains(resource_id))
            .unwrap_or(false))
    }
}

#[async_trait]
impl PauseAction for RecordingPlayback {
    async fn pause(&self, resource_id: &str) -> Result<bool> {
        if let Ok(mut paused) = self.paused.lock() {
            paused.push(resource_id.to_string());
        }
        let delay = self.pause_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TimerError::ActionPortFailure(format!(
                "player {} unreachable",
                resource_id
            )));
        }
        if self.idle.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.messages().len()
    }
}

#[async_trait]
impl NotifyAction for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TimerError::ActionPortFailure("notifications disabled".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingBroadcast {
    snapshots: Mutex<Vec<TimerSnapshot>>,
}

impl RecordingBroadcast {
    pub fn snapshots(&self) -> Vec<TimerSnapshot> {
        self.snapshots.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<TimerSnapshot> {
        self.snapshots().pop()
    }
}

impl StatusBroadcast for RecordingBroadcast {
    fn broadcast(&self, snapshot: &TimerSnapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(snapshot.clone());
        }
    }
}

/// All three fakes wired together
#[derive(Debug, Clone)]
pub struct RecordingPorts {
    pub playback: Arc<RecordingPlayback>,
    pub notifier: Arc<RecordingNotifier>,
    pub broadcast: Arc<RecordingBroadcast>,
}

impl RecordingPorts {
    pub fn with_resources<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            playback: Arc::new(RecordingPlayback::with_resources(resources)),
            notifier: Arc::new(RecordingNotifier::default()),
            broadcast: Arc::new(RecordingBroadcast::default()),
        }
    }

    pub fn ports(&self) -> ActionPorts {
        ActionPorts {
            resources: self.playback.clone(),
            pause: self.playback.clone(),
            notify: self.notifier.clone(),
            broadcast: self.broadcast.clone(),
        }
    }
}
