//! Public timer operations

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, Weak,
};

use tokio::{sync::Mutex as AsyncMutex, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{EngineSettings, ExpirationContext, ExpirationGuard, ExpireOutcome};
use crate::{
    error::{Result, TimerError},
    services::ActionPorts,
    state::{LastRun, RunOutcome, TimerRecord, TimerSnapshot, TimerStatus, MAX_DURATION_SECONDS},
    store::TimerRepository,
    tasks::countdown_task,
    utils::Clock,
    wake::{WakePort, EXPIRE_WAKE, KEEPALIVE_WAKE},
};

/// Single-slot countdown engine.
///
/// Always handled through an `Arc`; background work (the fast countdown and
/// status-triggered reconciliation) holds only a weak reference.
pub struct TimerEngine {
    pub(super) repo: TimerRepository,
    pub(super) wake: Arc<dyn WakePort>,
    pub(super) ports: ActionPorts,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) settings: EngineSettings,
    pub(super) guard: ExpirationGuard,
    /// Serialises operations so each runs to completion before the next
    pub(super) op_lock: AsyncMutex<()>,
    /// Possibly stale copy of the stored record, used by the countdown
    cached: Mutex<Option<TimerRecord>>,
    countdown: Mutex<Option<(u64, JoinHandle<()>)>>,
    countdown_generation: AtomicU64,
    pub(super) reconciling: AtomicBool,
    pub(super) weak_self: Weak<TimerEngine>,
}

impl TimerEngine {
    pub fn new(
        repo: TimerRepository,
        wake: Arc<dyn WakePort>,
        ports: ActionPorts,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let dedup_window_ms = settings.dedup_window.as_millis() as i64;
        Arc::new_cyclic(|weak_self| Self {
            repo,
            wake,
            ports,
            clock,
            settings,
            guard: ExpirationGuard::new(dedup_window_ms),
            op_lock: AsyncMutex::new(()),
            cached: Mutex::new(None),
            countdown: Mutex::new(None),
            countdown_generation: AtomicU64::new(0),
            reconciling: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn repository(&self) -> &TimerRepository {
        &self.repo
    }

    /// Start a new timer, replacing any existing one
    pub async fn start(
        &self,
        duration_seconds: u64,
        resource_id: &str,
        category: Option<String>,
    ) -> Result<TimerRecord> {
        if !(1..=MAX_DURATION_SECONDS).contains(&duration_seconds) {
            return Err(TimerError::InvalidDuration {
                got: duration_seconds,
                max: MAX_DURATION_SECONDS,
            });
        }

        match self.ports.resources.exists(resource_id).await {
            Ok(true) => {}
            Ok(false) => return Err(TimerError::ResourceNotFound(resource_id.to_string())),
            Err(e) => {
                warn!("Existence check for {} failed: {}", resource_id, e);
                return Err(TimerError::ResourceNotFound(resource_id.to_string()));
            }
        }

        let _op = self.op_lock.lock().await;

        if let Err(e) = self.stop_locked(RunOutcome::Stopped).await {
            warn!("Failed to stop previous timer: {}", e);
        }

        let now = self.clock.now_ms();
        let record = TimerRecord::new(
            resource_id.to_string(),
            category.unwrap_or_default(),
            duration_seconds,
            now,
        );
        self.repo.save_record(&record).await?;
        self.set_cached(Some(record.clone()));

        self.arm_wakes(&record).await;
        self.start_countdown();
        self.ports.broadcast.broadcast(&record.snapshot(now));

        info!(
            "Started {}s timer {} for {}",
            duration_seconds, record.id, record.resource_id
        );
        Ok(record)
    }

    /// Cancel the timer. Stopping an empty slot is not an error.
    pub async fn stop(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        self.stop_locked(RunOutcome::Stopped).await.map(|_| ())
    }

    /// Freeze the countdown. Pausing an already paused timer returns it unchanged.
    pub async fn pause(&self) -> Result<TimerRecord> {
        let _op = self.op_lock.lock().await;

        let mut record = self.repo.load_record().await?.ok_or(TimerError::NoActiveTimer)?;
        let now = self.clock.now_ms();
        match record.status {
            TimerStatus::Paused => {
                debug!("Timer {} already paused", record.id);
                self.set_cached(Some(record.clone()));
                return Ok(record);
            }
            TimerStatus::Expired => return Err(TimerError::NoActiveTimer),
            TimerStatus::Active if record.is_due(now) => {
                self.expire_locked().await?;
                return Err(TimerError::NoActiveTimer);
            }
            TimerStatus::Active => {}
        }

        record.pause_at(now);
        self.repo.save_record(&record).await?;
        self.set_cached(Some(record.clone()));

        // a frozen clock needs no wakes
        self.disarm_wakes().await;
        self.stop_countdown();
        self.ports.broadcast.broadcast(&record.snapshot(now));

        info!("Paused timer {} with {}s left", record.id, record.remaining_seconds);
        Ok(record)
    }

    /// Continue a paused timer. Returns `None` when there is no timer.
    pub async fn resume(&self) -> Result<Option<TimerRecord>> {
        let _op = self.op_lock.lock().await;

        let Some(mut record) = self.repo.load_record().await? else {
            debug!("Resume requested without a timer");
            return Ok(None);
        };
        match record.status {
            TimerStatus::Active => {
                debug!("Timer {} already running", record.id);
                return Ok(Some(record));
            }
            TimerStatus::Expired => return Ok(None),
            TimerStatus::Paused => {}
        }

        let now = self.clock.now_ms();
        record.resume_at(now);
        self.repo.save_record(&record).await?;
        self.set_cached(Some(record.clone()));

        self.arm_wakes(&record).await;
        self.start_countdown();
        self.ports.broadcast.broadcast(&record.snapshot(now));

        info!("Resumed timer {} with {}s left", record.id, record.remaining_seconds);
        Ok(Some(record))
    }

    /// Push the deadline later by `additional_seconds`
    pub async fn extend(&self, additional_seconds: u64) -> Result<TimerRecord> {
        let _op = self.op_lock.lock().await;

        let mut record = self.repo.load_record().await?.ok_or(TimerError::NoActiveTimer)?;
        let now = self.clock.now_ms();
        match record.status {
            TimerStatus::Expired => return Err(TimerError::NoActiveTimer),
            TimerStatus::Active if record.is_due(now) => {
                self.expire_locked().await?;
                return Err(TimerError::NoActiveTimer);
            }
            TimerStatus::Active | TimerStatus::Paused => {}
        }

        if additional_seconds == 0 {
            return Err(TimerError::InvalidDuration {
                got: 0,
                max: MAX_DURATION_SECONDS,
            });
        }
        let new_duration = record.duration_seconds.saturating_add(additional_seconds);
        if new_duration > MAX_DURATION_SECONDS {
            return Err(TimerError::InvalidDuration {
                got: new_duration,
                max: MAX_DURATION_SECONDS,
            });
        }

        record.extend_by(additional_seconds, now);
        self.repo.save_record(&record).await?;
        self.set_cached(Some(record.clone()));

        if record.is_active() {
            if let Err(e) = self
                .wake
                .schedule_once(EXPIRE_WAKE, record.deadline_epoch_ms())
                .await
            {
                warn!("Failed to re-arm expiration wake: {}", e);
            }
        }
        self.ports.broadcast.broadcast(&record.snapshot(now));

        info!(
            "Extended timer {} by {}s to {}s",
            record.id, additional_seconds, record.duration_seconds
        );
        Ok(record)
    }

    /// Authoritative view of the timer, read from the store.
    ///
    /// Cheap enough to poll. Store failures degrade to an inactive snapshot.
    /// If the stored timer is running but nothing in this process is counting
    /// it down, a reconciliation is kicked off in the background.
    pub async fn status(&self) -> TimerSnapshot {
        let record = match self.repo.load_record().await {
            Ok(record) => record,
            Err(e) => {
                warn!("Status read failed, reporting inactive: {}", e);
                return TimerSnapshot::inactive();
            }
        };

        let Some(record) = record else {
            return TimerSnapshot::inactive();
        };

        if record.is_active() && !self.countdown_resident() {
            self.spawn_reconcile();
        }
        record.snapshot(self.clock.now_ms())
    }

    /// Metadata of the most recently finished timer, if readable
    pub async fn last_run(&self) -> Option<LastRun> {
        match self.repo.last_run().await {
            Ok(run) => run,
            Err(e) => {
                warn!("Failed to read last run: {}", e);
                None
            }
        }
    }

    /// Expire the timer if it is due. Safe to call any number of times.
    pub async fn maybe_expire(&self) -> Result<ExpireOutcome> {
        let _op = self.op_lock.lock().await;
        self.expire_locked().await
    }

    /// The timer's resource disappeared; drop the timer without pausing anything
    pub async fn resource_gone(&self, resource_id: &str) -> Result<bool> {
        let _op = self.op_lock.lock().await;
        match self.repo.load_record().await? {
            Some(record) if record.resource_id == resource_id => {
                info!("Resource {} is gone, dropping timer {}", resource_id, record.id);
                self.stop_locked(RunOutcome::ResourceGone).await
            }
            _ => Ok(false),
        }
    }

    /// Whether a fast countdown task is alive in this process
    pub fn countdown_resident(&self) -> bool {
        self.countdown
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|(_, handle)| !handle.is_finished()))
            .unwrap_or(false)
    }

    pub(super) async fn expire_locked(&self) -> Result<ExpireOutcome> {
        let cx = ExpirationContext {
            repo: &self.repo,
            wake: self.wake.as_ref(),
            ports: &self.ports,
            clock: self.clock.as_ref(),
        };
        let outcome = self.guard.maybe_expire(&cx).await?;
        debug!("Expiration check: {:?}", outcome);

        if matches!(
            outcome,
            ExpireOutcome::Expired | ExpireOutcome::StaleCleanup | ExpireOutcome::NoTimer
        ) {
            self.refresh_cache_from_store().await;
        }
        Ok(outcome)
    }

    /// Disarm, delete and announce. Returns whether a record existed.
    pub(super) async fn stop_locked(&self, outcome: RunOutcome) -> Result<bool> {
        self.disarm_wakes().await;
        self.stop_countdown();
        self.set_cached(None);

        let existing = self.repo.load_record().await?;
        if let Some(record) = &existing {
            self.repo.delete_record().await?;
            let now = self.clock.now_ms();
            if let Err(e) = self
                .repo
                .save_last_run(&LastRun::from_record(record, now, outcome))
                .await
            {
                warn!("Failed to record last run: {}", e);
            }
            info!("Stopped timer {} ({:?})", record.id, outcome);
        }

        self.ports.broadcast.broadcast(&TimerSnapshot::inactive());
        Ok(existing.is_some())
    }

    pub(super) async fn arm_wakes(&self, record: &TimerRecord) {
        if let Err(e) = self
            .wake
            .schedule_once(EXPIRE_WAKE, record.deadline_epoch_ms())
            .await
        {
            warn!("Failed to arm expiration wake: {}", e);
        }
        if let Err(e) = self
            .wake
            .schedule_repeating(KEEPALIVE_WAKE, self.settings.keepalive_period_secs)
            .await
        {
            warn!("Failed to arm keepalive wake: {}", e);
        }
    }

    pub(super) async fn disarm_wakes(&self) {
        for name in [EXPIRE_WAKE, KEEPALIVE_WAKE] {
            if let Err(e) = self.wake.cancel(name).await {
                warn!("Failed to cancel wake {}: {}", name, e);
            }
        }
    }

    pub(super) fn set_cached(&self, record: Option<TimerRecord>) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = record;
        }
    }

    async fn refresh_cache_from_store(&self) {
        match self.repo.load_record().await {
            Ok(record) => {
                if record.as_ref().map_or(true, |r| !r.is_active()) {
                    self.stop_countdown();
                }
                self.set_cached(record);
            }
            Err(e) => warn!("Failed to refresh cached timer: {}", e),
        }
    }

    /// Spawn the fast countdown, replacing any running one
    pub(super) fn start_countdown(&self) {
        let generation = self.countdown_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Ok(mut slot) = self.countdown.lock() else {
            warn!("Failed to lock countdown slot");
            return;
        };
        let handle = tokio::spawn(countdown_task(self.weak_self.clone(), generation));
        if let Some((_, previous)) = slot.replace((generation, handle)) {
            previous.abort();
        }
    }

    pub(super) fn stop_countdown(&self) {
        let previous = self.countdown.lock().ok().and_then(|mut slot| slot.take());
        if let Some((_, handle)) = previous {
            handle.abort();
        }
    }

    /// Called by a countdown task that is about to finish on its own, so that
    /// nothing it calls afterwards aborts it
    pub(crate) fn release_countdown(&self, generation: u64) {
        if let Ok(mut slot) = self.countdown.lock() {
            if slot.as_ref().is_some_and(|(g, _)| *g == generation) {
                slot.take();
            }
        }
    }

    /// One countdown step from the cached record: broadcast, then report the
    /// milliseconds left. `None` once the cache no longer holds a running timer.
    pub(crate) fn tick(&self) -> Option<i64> {
        let record = self.cached.lock().ok().and_then(|cached| cached.clone())?;
        if !record.is_active() {
            return None;
        }
        let now = self.clock.now_ms();
        self.ports.broadcast.broadcast(&record.snapshot(now));
        Some(record.remaining_ms_at(now))
    }
}
