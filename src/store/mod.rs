//! Durable key-value storage
//!
//! The store is the single source of truth whenever no engine is resident in
//! memory. Everything lives in one flat JSON namespace; `TimerRepository`
//! is the only code that knows the well-known keys.

pub mod json_file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    error::{Result, TimerError},
    state::{ExpirationMark, LastRun, TimerRecord},
};

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

pub const TIMER_RECORD_KEY: &str = "timer.record";
pub const LAST_EXPIRATION_KEY: &str = "timer.last_expiration";
pub const LAST_RUN_KEY: &str = "timer.last_run";
pub const WAKE_ALARMS_KEY: &str = "wake.alarms";

/// Flat key-value persistence that survives process restarts
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Typed access to the timer keys
#[derive(Clone)]
pub struct TimerRepository {
    store: Arc<dyn DurableStore>,
}

impl TimerRepository {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn DurableStore> {
        Arc::clone(&self.store)
    }

    pub async fn load_record(&self) -> Result<Option<TimerRecord>> {
        self.load(TIMER_RECORD_KEY).await
    }

    pub async fn save_record(&self, record: &TimerRecord) -> Result<()> {
        self.save(TIMER_RECORD_KEY, record).await
    }

    pub async fn delete_record(&self) -> Result<()> {
        self.store.remove(TIMER_RECORD_KEY).await
    }

    /// Delete the stored record only if it is still the timer identified by `id`.
    /// Returns whether a record was removed.
    pub async fn delete_record_if(&self, id: uuid::Uuid) -> Result<bool> {
        match self.load_record().await? {
            Some(record) if record.id == id => {
                self.delete_record().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn last_expiration(&self) -> Result<Option<ExpirationMark>> {
        self.load(LAST_EXPIRATION_KEY).await
    }

    pub async fn mark_expiration_handled(&self, mark: ExpirationMark) -> Result<()> {
        self.save(LAST_EXPIRATION_KEY, &mark).await
    }

    pub async fn last_run(&self) -> Result<Option<LastRun>> {
        self.load(LAST_RUN_KEY).await
    }

    pub async fn save_last_run(&self, run: &LastRun) -> Result<()> {
        self.save(LAST_RUN_KEY, run).await
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                // A corrupt entry is treated as absent so the slot can recover
                warn!("Discarding unreadable value under {}: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| TimerError::StoreUnavailable(format!("failed to encode {}: {}", key, e)))?;
        self.store.set(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn record_roundtrip_and_conditional_delete() {
        let repo = TimerRepository::new(Arc::new(MemoryStore::new()));
        assert!(repo.load_record().await.unwrap().is_none());

        let record = TimerRecord::new("tab-9".into(), String::new(), 45, 1_000);
        repo.save_record(&record).await.unwrap();
        assert_eq!(repo.load_record().await.unwrap(), Some(record.clone()));

        assert!(!repo.delete_record_if(uuid::Uuid::new_v4()).await.unwrap());
        assert!(repo.load_record().await.unwrap().is_some());
        assert!(repo.delete_record_if(record.id).await.unwrap());
        assert!(repo.load_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(TIMER_RECORD_KEY, json!({"resourceId": 5}))
            .await
            .unwrap();
        let repo = TimerRepository::new(store);
        assert!(repo.load_record().await.unwrap().is_none());
    }
}
