//! Wake port that only records what is armed. Nothing ever fires.

use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;

use super::{ArmedAlarm, WakePort};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct RecordingWakePort {
    armed: Mutex<BTreeMap<String, ArmedAlarm>>,
    cancels: Mutex<Vec<String>>,
}

impl RecordingWakePort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alarms armed right now, ordered by name
    pub fn armed(&self) -> Vec<ArmedAlarm> {
        self.armed
            .lock()
            .map(|armed| armed.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn armed_count(&self) -> usize {
        self.armed.lock().map(|armed| armed.len()).unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<ArmedAlarm> {
        self.armed.lock().ok().and_then(|armed| armed.get(name).cloned())
    }

    /// Every name passed to `cancel`, in call order
    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn insert(&self, alarm: ArmedAlarm) {
        if let Ok(mut armed) = self.armed.lock() {
            armed.insert(alarm.name().to_string(), alarm);
        }
    }
}

#[async_trait]
impl WakePort for RecordingWakePort {
    async fn schedule_once(&self, name: &str, at_epoch_ms: i64) -> Result<()> {
        self.insert(ArmedAlarm::Once {
            name: name.to_string(),
            at_epoch_ms,
        });
        Ok(())
    }

    async fn schedule_repeating(&self, name: &str, period_secs: u64) -> Result<()> {
        self.insert(ArmedAlarm::Repeating {
            name: name.to_string(),
            period_secs,
        });
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<()> {
        if let Ok(mut armed) = self.armed.lock() {
            armed.remove(name);
        }
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.push(name.to_string());
        }
        Ok(())
    }
}
