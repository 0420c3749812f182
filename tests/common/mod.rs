#![allow(dead_code)]

use std::sync::Arc;

use sleep_timer::{
    engine::{EngineSettings, TimerEngine},
    services::RecordingPorts,
    store::{DurableStore, MemoryStore, TimerRepository},
    utils::{Clock, ManualClock},
    wake::RecordingWakePort,
};

pub const T0: i64 = 1_700_000_000_000;

pub struct Harness {
    pub engine: Arc<TimerEngine>,
    pub store: Arc<MemoryStore>,
    pub repo: TimerRepository,
    pub wake: Arc<RecordingWakePort>,
    pub ports: RecordingPorts,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Engine over an in-memory store with the players "tab-a" and "tab-b"
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let wake = Arc::new(RecordingWakePort::new());
        let ports = RecordingPorts::with_resources(["tab-a", "tab-b"]);
        let repo = TimerRepository::new(store.clone());
        let engine = build_engine(
            store.clone(),
            wake.clone(),
            &ports,
            clock.clone(),
        );
        Self {
            engine,
            store,
            repo,
            wake,
            ports,
            clock,
        }
    }

    /// A second engine over the same store, as after a process restart
    pub fn relaunch(&self) -> Self {
        let wake = Arc::new(RecordingWakePort::new());
        let ports = RecordingPorts::with_resources(["tab-a", "tab-b"]);
        let engine = build_engine(
            self.store.clone(),
            wake.clone(),
            &ports,
            self.clock.clone(),
        );
        Self {
            engine,
            store: self.store.clone(),
            repo: self.repo.clone(),
            wake,
            ports,
            clock: self.clock.clone(),
        }
    }
}

pub fn build_engine(
    store: Arc<dyn DurableStore>,
    wake: Arc<RecordingWakePort>,
    ports: &RecordingPorts,
    clock: Arc<dyn Clock>,
) -> Arc<TimerEngine> {
    TimerEngine::new(
        TimerRepository::new(store),
        wake,
        ports.ports(),
        clock,
        EngineSettings::default(),
    )
}
