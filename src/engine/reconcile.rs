//! Wake-time state recovery
//!
//! Runs on process start, on every keepalive wake that finds no resident
//! countdown, and in the background when a status poll notices a running
//! timer that nobody in this process is counting down.

use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use super::TimerEngine;
use crate::{
    error::Result,
    state::{RunOutcome, TimerSnapshot, TimerStatus},
    wake::{EXPIRE_WAKE, KEEPALIVE_WAKE},
};

impl TimerEngine {
    /// Rebuild in-memory state from the store and act on it
    pub async fn reconcile(&self) -> Result<TimerSnapshot> {
        let _op = self.op_lock.lock().await;

        let Some(record) = self.repo.load_record().await? else {
            debug!("Reconcile: no timer stored");
            self.disarm_wakes().await;
            self.stop_countdown();
            self.set_cached(None);
            return Ok(TimerSnapshot::inactive());
        };

        let now = self.clock.now_ms();
        match record.status {
            TimerStatus::Paused => {
                debug!("Reconcile: timer {} is paused", record.id);
                // wakes restored from before a restart may still be armed
                self.disarm_wakes().await;
                self.stop_countdown();
                self.set_cached(Some(record.clone()));
                Ok(record.snapshot(now))
            }
            TimerStatus::Expired => {
                let outcome = self.expire_locked().await?;
                debug!("Reconcile: leftover expired timer, {:?}", outcome);
                self.stored_snapshot().await
            }
            TimerStatus::Active if record.is_due(now) => {
                info!("Reconcile: timer {} is past its deadline", record.id);
                self.expire_locked().await?;
                self.stored_snapshot().await
            }
            TimerStatus::Active => {
                if let Ok(false) = self.ports.resources.exists(&record.resource_id).await {
                    info!(
                        "Reconcile: resource {} disappeared, dropping timer {}",
                        record.resource_id, record.id
                    );
                    self.stop_locked(RunOutcome::ResourceGone).await?;
                    return Ok(TimerSnapshot::inactive());
                }

                self.set_cached(Some(record.clone()));
                self.arm_wakes(&record).await;
                if !self.countdown_resident() {
                    self.start_countdown();
                }
                debug!(
                    "Reconcile: timer {} running, {}s left",
                    record.id,
                    record.remaining_at(now)
                );
                Ok(record.snapshot(now))
            }
        }
    }

    /// Entry point for every delivered wake. The name only selects how much
    /// work to do; state always comes from the store.
    pub async fn handle_wake(&self, name: &str) {
        let result = match name {
            EXPIRE_WAKE => self.maybe_expire().await.map(|outcome| {
                debug!("Expiration wake: {:?}", outcome);
            }),
            KEEPALIVE_WAKE if !self.countdown_resident() => self.reconcile().await.map(|_| ()),
            KEEPALIVE_WAKE => self.maybe_expire().await.map(|_| ()),
            other => {
                debug!("Ignoring unknown wake {}", other);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("Handling wake {} failed: {}", name, e);
        }
    }

    /// Reconcile in the background, at most one at a time
    pub(super) fn spawn_reconcile(&self) {
        if self.reconciling.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(engine) = self.weak_self.upgrade() else {
            self.reconciling.store(false, Ordering::SeqCst);
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = engine.reconcile().await {
                warn!("Background reconcile failed: {}", e);
            }
            engine.reconciling.store(false, Ordering::SeqCst);
        });
    }

    async fn stored_snapshot(&self) -> Result<TimerSnapshot> {
        let now = self.clock.now_ms();
        Ok(self
            .repo
            .load_record()
            .await?
            .map(|record| record.snapshot(now))
            .unwrap_or_else(TimerSnapshot::inactive))
    }
}
