//! Wake port backed by tokio timers
//!
//! In-process timers die with the process, so the armed alarm set is mirrored
//! into the durable store. `restore()` re-arms whatever was armed when the
//! previous process went away; a one-shot whose time already passed fires
//! right away.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, Mutex as AsyncMutex},
    task::JoinHandle,
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{ArmedAlarm, WakeEvent, WakePort};
use crate::{
    error::{Result, TimerError},
    store::{DurableStore, WAKE_ALARMS_KEY},
    utils::Clock,
};

struct Armed {
    alarm: ArmedAlarm,
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    tx: mpsc::Sender<WakeEvent>,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    armed: Mutex<HashMap<String, Armed>>,
    generation: AtomicU64,
    persist_lock: AsyncMutex<()>,
}

pub struct TokioWakePort {
    inner: Arc<Inner>,
}

impl TokioWakePort {
    /// Create a port delivering wakes into `tx`
    pub fn new(
        tx: mpsc::Sender<WakeEvent>,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tx,
                store,
                clock,
                armed: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                persist_lock: AsyncMutex::new(()),
            }),
        }
    }

    /// Re-arm the alarms that were armed when the last process stopped
    pub async fn restore(&self) -> Result<usize> {
        let alarms: Vec<ArmedAlarm> = match self.inner.store.get(WAKE_ALARMS_KEY).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Discarding unreadable wake alarms: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let count = alarms.len();
        for alarm in alarms {
            info!("Restoring wake alarm {:?}", alarm);
            self.arm(alarm)?;
        }
        Ok(count)
    }

    /// Names currently armed in this process
    pub fn armed_names(&self) -> Vec<String> {
        self.inner
            .armed
            .lock()
            .map(|armed| armed.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn arm(&self, alarm: ArmedAlarm) -> Result<()> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let name = alarm.name().to_string();

        // Held across the spawn so a zero-delay wake cannot forget itself
        // before it has been recorded
        let mut armed = self
            .inner
            .armed
            .lock()
            .map_err(|e| TimerError::StoreUnavailable(format!("Failed to lock wake table: {}", e)))?;

        let handle = match &alarm {
            ArmedAlarm::Once { at_epoch_ms, .. } => {
                let delay_ms = at_epoch_ms.saturating_sub(self.inner.clock.now_ms()).max(0);
                let inner = Arc::clone(&self.inner);
                let name = name.clone();
                tokio::spawn(async move {
                    sleep(Duration::from_millis(delay_ms as u64)).await;
                    inner.forget(&name, generation);
                    inner.deliver(&name).await;
                    inner.persist().await;
                })
            }
            ArmedAlarm::Repeating { period_secs, .. } => {
                let period = Duration::from_secs((*period_secs).max(1));
                let inner = Arc::clone(&self.inner);
                let name = name.clone();
                tokio::spawn(async move {
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        inner.deliver(&name).await;
                    }
                })
            }
        };

        if let Some(previous) = armed.insert(name, Armed { alarm, generation, handle }) {
            previous.handle.abort();
        }
        Ok(())
    }
}

impl Inner {
    fn forget(&self, name: &str, generation: u64) {
        if let Ok(mut armed) = self.armed.lock() {
            if armed.get(name).is_some_and(|a| a.generation == generation) {
                armed.remove(name);
            }
        }
    }

    async fn deliver(&self, name: &str) {
        debug!("Wake {} fired", name);
        if self.tx.send(WakeEvent { name: name.to_string() }).await.is_err() {
            debug!("Wake receiver closed, dropping {}", name);
        }
    }

    /// Mirror the armed set into the store. Best effort: the in-process
    /// timers are already armed either way.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let alarms: Vec<ArmedAlarm> = match self.armed.lock() {
            Ok(armed) => armed.values().map(|a| a.alarm.clone()).collect(),
            Err(e) => {
                warn!("Failed to lock wake table: {}", e);
                return;
            }
        };

        let result = if alarms.is_empty() {
            self.store.remove(WAKE_ALARMS_KEY).await
        } else {
            match serde_json::to_value(&alarms) {
                Ok(value) => self.store.set(WAKE_ALARMS_KEY, value).await,
                Err(e) => Err(TimerError::StoreUnavailable(e.to_string())),
            }
        };
        if let Err(e) = result {
            warn!("Failed to persist wake alarms: {}", e);
        }
    }
}

#[async_trait]
impl WakePort for TokioWakePort {
    async fn schedule_once(&self, name: &str, at_epoch_ms: i64) -> Result<()> {
        debug!("Arming one-shot wake {} at {}", name, at_epoch_ms);
        self.arm(ArmedAlarm::Once {
            name: name.to_string(),
            at_epoch_ms,
        })?;
        self.inner.persist().await;
        Ok(())
    }

    async fn schedule_repeating(&self, name: &str, period_secs: u64) -> Result<()> {
        debug!("Arming repeating wake {} every {}s", name, period_secs);
        self.arm(ArmedAlarm::Repeating {
            name: name.to_string(),
            period_secs,
        })?;
        self.inner.persist().await;
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<()> {
        let removed = self
            .inner
            .armed
            .lock()
            .map_err(|e| TimerError::StoreUnavailable(format!("Failed to lock wake table: {}", e)))?
            .remove(name);
        if let Some(armed) = removed {
            debug!("Cancelled wake {}", name);
            armed.handle.abort();
        }
        self.inner.persist().await;
        Ok(())
    }
}

impl Drop for TokioWakePort {
    fn drop(&mut self) {
        if let Ok(armed) = self.inner.armed.lock() {
            for a in armed.values() {
                a.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::MemoryStore, utils::SystemClock};
    use tokio::time::timeout;

    fn port(store: Arc<MemoryStore>) -> (TokioWakePort, mpsc::Receiver<WakeEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (TokioWakePort::new(tx, store, Arc::new(SystemClock)), rx)
    }

    #[tokio::test]
    async fn past_one_shot_fires_immediately() {
        let store = Arc::new(MemoryStore::new());
        let (port, mut rx) = port(Arc::clone(&store));

        port.schedule_once("w", SystemClock.now_ms() - 10_000).await.unwrap();
        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.name, "w");

        // fired one-shots are forgotten, including in the store
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(port.armed_names().is_empty());
        assert_eq!(store.get(WAKE_ALARMS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancelled_wake_never_fires() {
        let store = Arc::new(MemoryStore::new());
        let (port, mut rx) = port(store);

        port.schedule_once("w", SystemClock.now_ms() + 200).await.unwrap();
        port.cancel("w").await.unwrap();
        assert!(timeout(Duration::from_millis(500), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn restore_rearms_persisted_alarms() {
        let store = Arc::new(MemoryStore::new());
        {
            let (first, _rx) = port(Arc::clone(&store));
            first.schedule_repeating("keepalive", 30).await.unwrap();
            first
                .schedule_once("expire", SystemClock.now_ms() + 60_000)
                .await
                .unwrap();
        }

        let (second, _rx) = port(Arc::clone(&store));
        assert_eq!(second.restore().await.unwrap(), 2);
        let mut names = second.armed_names();
        names.sort();
        assert_eq!(names, vec!["expire".to_string(), "keepalive".to_string()]);
    }
}
