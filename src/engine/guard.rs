//! Expiration guard
//!
//! A deadline can be signalled by the in-process countdown, the one-shot
//! wake and the keepalive wake, in any order and possibly after a restart.
//! Two layers keep the pause/notify/cleanup sequence from running twice:
//!
//! 1. an in-memory flag, which covers overlapping calls inside one process
//!    but resets whenever the process is relaunched;
//! 2. a persisted [`ExpirationMark`], written *before* any side effect, which
//!    a relaunched process reads back and honours.
//!
//! If the process dies after the mark but before the pause, the pause is
//! skipped once. Firing pause/notify twice is considered worse.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::{
    error::Result,
    services::ActionPorts,
    state::{ExpirationMark, LastRun, RunOutcome, TimerRecord, TimerSnapshot, TimerStatus},
    store::TimerRepository,
    utils::Clock,
    wake::{WakePort, EXPIRE_WAKE, KEEPALIVE_WAKE},
};

/// What a call to [`ExpirationGuard::maybe_expire`] ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOutcome {
    /// No record, or the record is paused
    NoTimer,
    /// The wake was early or stale; time is left
    NotDue { remaining_seconds: u64 },
    /// Another call in this process is running the expiration
    InProgress,
    /// The persisted mark shows this timer was just handled
    RecentlyHandled,
    /// A previous process marked this timer but never finished; the record
    /// was removed without repeating the side effects
    StaleCleanup,
    /// Side effects ran and the record was deleted
    Expired,
}

/// Everything the guard touches, borrowed from the engine
pub struct ExpirationContext<'a> {
    pub repo: &'a TimerRepository,
    pub wake: &'a dyn WakePort,
    pub ports: &'a ActionPorts,
    pub clock: &'a dyn Clock,
}

#[derive(Debug)]
pub struct ExpirationGuard {
    running: AtomicBool,
    dedup_window_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkState {
    /// No mark for this timer
    Clear,
    /// Marked within the dedup window
    Recent,
    /// Marked long ago and still present
    Stale,
}

/// Releases the in-memory flag however the expiration routine exits
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ExpirationGuard {
    pub fn new(dedup_window_ms: i64) -> Self {
        Self {
            running: AtomicBool::new(false),
            dedup_window_ms,
        }
    }

    pub fn dedup_window_ms(&self) -> i64 {
        self.dedup_window_ms
    }

    /// Whether an expiration is running in this process right now
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Expire the stored timer if, and only if, it is actually due and
    /// nobody else has handled it
    pub async fn maybe_expire(&self, cx: &ExpirationContext<'_>) -> Result<ExpireOutcome> {
        let Some(record) = cx.repo.load_record().await? else {
            return Ok(ExpireOutcome::NoTimer);
        };

        let now = cx.clock.now_ms();
        match record.status {
            TimerStatus::Paused => return Ok(ExpireOutcome::NoTimer),
            TimerStatus::Active => {
                let remaining_seconds = record.remaining_at(now);
                if remaining_seconds > 0 {
                    return Ok(ExpireOutcome::NotDue { remaining_seconds });
                }
            }
            // left behind by an expiration that never finished
            TimerStatus::Expired => {}
        }

        if self.is_running() {
            debug!("Expiration already running for timer {}", record.id);
            return Ok(ExpireOutcome::InProgress);
        }

        if self.mark_state(cx, &record, now).await? == MarkState::Recent {
            return Ok(ExpireOutcome::RecentlyHandled);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(ExpireOutcome::InProgress);
        }
        let _flag = RunningFlag(&self.running);

        // Re-read under the flag: a call that finished while we were
        // suspended above may already have deleted, paused or marked it
        let record = match cx.repo.load_record().await? {
            Some(current) if current.id == record.id => current,
            _ => return Ok(ExpireOutcome::NoTimer),
        };
        let now = cx.clock.now_ms();
        match record.status {
            TimerStatus::Paused => return Ok(ExpireOutcome::NoTimer),
            TimerStatus::Active if record.remaining_at(now) > 0 => {
                return Ok(ExpireOutcome::NotDue {
                    remaining_seconds: record.remaining_at(now),
                })
            }
            _ => {}
        }

        match self.mark_state(cx, &record, now).await? {
            MarkState::Recent => Ok(ExpireOutcome::RecentlyHandled),
            MarkState::Stale => {
                warn!(
                    "Timer {} was marked expired but never cleaned up, removing it",
                    record.id
                );
                disarm(cx.wake).await;
                finish(cx, &record, now).await;
                Ok(ExpireOutcome::StaleCleanup)
            }
            MarkState::Clear => {
                cx.repo
                    .mark_expiration_handled(ExpirationMark {
                        timer_id: record.id,
                        handled_at_ms: now,
                    })
                    .await?;

                self.run_expiration(cx, record, now).await;
                Ok(ExpireOutcome::Expired)
            }
        }
    }

    /// Classify the persisted mark against `record`
    async fn mark_state(
        &self,
        cx: &ExpirationContext<'_>,
        record: &TimerRecord,
        now: i64,
    ) -> Result<MarkState> {
        let Some(mark) = cx.repo.last_expiration().await? else {
            return Ok(MarkState::Clear);
        };
        if mark.timer_id != record.id {
            return Ok(MarkState::Clear);
        }

        let age_ms = now.saturating_sub(mark.handled_at_ms);
        if age_ms < self.dedup_window_ms {
            debug!("Timer {} expiration handled {}ms ago, skipping", record.id, age_ms);
            Ok(MarkState::Recent)
        } else {
            Ok(MarkState::Stale)
        }
    }

    async fn run_expiration(&self, cx: &ExpirationContext<'_>, mut record: TimerRecord, now: i64) {
        info!(
            "Timer {} expired after {}s, pausing {}",
            record.id, record.duration_seconds, record.resource_id
        );

        record.status = TimerStatus::Expired;
        record.remaining_seconds = 0;
        if let Err(e) = cx.repo.save_record(&record).await {
            warn!("Failed to persist expired status: {}", e);
        }
        cx.ports.broadcast.broadcast(&record.snapshot(now));

        disarm(cx.wake).await;

        let message = match cx.ports.pause.pause(&record.resource_id).await {
            Ok(true) => format!("Time is up. Playback paused on {}.", record.resource_id),
            Ok(false) => {
                info!("Nothing was playing on {}", record.resource_id);
                "Time is up.".to_string()
            }
            Err(e) => {
                warn!("Failed to pause {}: {}", record.resource_id, e);
                "Time is up. Playback could not be paused.".to_string()
            }
        };

        if let Err(e) = cx.ports.notify.notify(&message).await {
            warn!("Failed to send expiration notification: {}", e);
        }

        finish(cx, &record, cx.clock.now_ms()).await;
    }
}

async fn disarm(wake: &dyn WakePort) {
    for name in [EXPIRE_WAKE, KEEPALIVE_WAKE] {
        if let Err(e) = wake.cancel(name).await {
            warn!("Failed to cancel wake {}: {}", name, e);
        }
    }
}

/// Terminal cleanup shared by normal and stale expiration
async fn finish(cx: &ExpirationContext<'_>, record: &TimerRecord, now: i64) {
    match cx.repo.delete_record_if(record.id).await {
        Ok(true) => debug!("Timer {} record deleted", record.id),
        Ok(false) => debug!("Timer {} record already replaced", record.id),
        Err(e) => warn!("Failed to delete expired timer {}: {}", record.id, e),
    }
    if let Err(e) = cx
        .repo
        .save_last_run(&LastRun::from_record(record, now, RunOutcome::Expired))
        .await
    {
        warn!("Failed to record last run: {}", e);
    }
    cx.ports.broadcast.broadcast(&TimerSnapshot::inactive());
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        services::RecordingPorts,
        store::MemoryStore,
        utils::ManualClock,
        wake::RecordingWakePort,
    };

    const T0: i64 = 1_700_000_000_000;

    struct Fixture {
        repo: TimerRepository,
        wake: RecordingWakePort,
        recording: RecordingPorts,
        ports: ActionPorts,
        clock: ManualClock,
    }

    impl Fixture {
        fn new() -> Self {
            let recording = RecordingPorts::with_resources(["tab-1"]);
            let ports = recording.ports();
            Self {
                repo: TimerRepository::new(Arc::new(MemoryStore::new())),
                wake: RecordingWakePort::new(),
                recording,
                ports,
                clock: ManualClock::new(T0),
            }
        }

        fn cx(&self) -> ExpirationContext<'_> {
            ExpirationContext {
                repo: &self.repo,
                wake: &self.wake,
                ports: &self.ports,
                clock: &self.clock,
            }
        }

        async fn due_record(&self) -> TimerRecord {
            let record = TimerRecord::new("tab-1".into(), "video".into(), 40, T0 - 50_000);
            self.repo.save_record(&record).await.unwrap();
            record
        }
    }

    #[tokio::test]
    async fn not_due_and_missing_are_no_ops() {
        let fx = Fixture::new();
        let guard = ExpirationGuard::new(5_000);
        assert_eq!(guard.maybe_expire(&fx.cx()).await.unwrap(), ExpireOutcome::NoTimer);

        let record = TimerRecord::new("tab-1".into(), String::new(), 40, T0);
        fx.repo.save_record(&record).await.unwrap();
        assert_eq!(
            guard.maybe_expire(&fx.cx()).await.unwrap(),
            ExpireOutcome::NotDue { remaining_seconds: 40 }
        );
        assert_eq!(fx.recording.playback.pause_count(), 0);
    }

    #[tokio::test]
    async fn repeated_calls_fire_side_effects_once() {
        let fx = Fixture::new();
        let guard = ExpirationGuard::new(5_000);
        fx.due_record().await;

        let first = guard.maybe_expire(&fx.cx()).await.unwrap();
        let second = guard.maybe_expire(&fx.cx()).await.unwrap();
        let third = guard.maybe_expire(&fx.cx()).await.unwrap();

        assert_eq!(first, ExpireOutcome::Expired);
        assert_eq!(second, ExpireOutcome::NoTimer);
        assert_eq!(third, ExpireOutcome::NoTimer);
        assert_eq!(fx.recording.playback.paused(), vec!["tab-1".to_string()]);
        assert_eq!(fx.recording.notifier.count(), 1);
        assert!(fx.repo.load_record().await.unwrap().is_none());
        assert_eq!(
            fx.repo.last_run().await.unwrap().map(|r| r.outcome),
            Some(RunOutcome::Expired)
        );
    }

    #[tokio::test]
    async fn overlapping_calls_are_excluded_in_process() {
        let fx = Fixture::new();
        let guard = ExpirationGuard::new(5_000);
        fx.due_record().await;
        fx.recording.playback.set_pause_delay(Duration::from_millis(50));

        let cx = fx.cx();
        let (a, b, c) = tokio::join!(
            guard.maybe_expire(&cx),
            guard.maybe_expire(&cx),
            guard.maybe_expire(&cx)
        );
        let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];

        assert_eq!(
            outcomes.iter().filter(|o| **o == ExpireOutcome::Expired).count(),
            1
        );
        assert_eq!(fx.recording.playback.pause_count(), 1);
        assert_eq!(fx.recording.notifier.count(), 1);
        assert!(!guard.is_running());
    }

    #[tokio::test]
    async fn persisted_mark_survives_a_restart() {
        let fx = Fixture::new();
        let record = fx.due_record().await;
        // a previous process marked the timer and died before cleanup
        fx.repo
            .mark_expiration_handled(ExpirationMark {
                timer_id: record.id,
                handled_at_ms: T0 - 1_000,
            })
            .await
            .unwrap();

        let fresh_guard = ExpirationGuard::new(5_000);
        assert_eq!(
            fresh_guard.maybe_expire(&fx.cx()).await.unwrap(),
            ExpireOutcome::RecentlyHandled
        );
        assert_eq!(fx.recording.playback.pause_count(), 0);

        // once the window has passed the leftover record is cleaned up quietly
        fx.clock.advance_secs(10);
        assert_eq!(
            fresh_guard.maybe_expire(&fx.cx()).await.unwrap(),
            ExpireOutcome::StaleCleanup
        );
        assert_eq!(fx.recording.playback.pause_count(), 0);
        assert_eq!(fx.recording.notifier.count(), 0);
        assert!(fx.repo.load_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_for_another_timer_does_not_block() {
        let fx = Fixture::new();
        fx.due_record().await;
        fx.repo
            .mark_expiration_handled(ExpirationMark {
                timer_id: uuid::Uuid::new_v4(),
                handled_at_ms: T0,
            })
            .await
            .unwrap();

        let guard = ExpirationGuard::new(5_000);
        assert_eq!(guard.maybe_expire(&fx.cx()).await.unwrap(), ExpireOutcome::Expired);
        assert_eq!(fx.recording.playback.pause_count(), 1);
    }

    #[tokio::test]
    async fn failing_pause_still_cleans_up() {
        let fx = Fixture::new();
        let guard = ExpirationGuard::new(5_000);
        fx.due_record().await;
        fx.wake.schedule_repeating(KEEPALIVE_WAKE, 30).await.unwrap();
        fx.recording.playback.set_failing(true);
        fx.recording.notifier.set_failing(true);

        assert_eq!(guard.maybe_expire(&fx.cx()).await.unwrap(), ExpireOutcome::Expired);
        assert!(fx.repo.load_record().await.unwrap().is_none());
        assert_eq!(fx.wake.armed_count(), 0);
        assert_eq!(
            fx.recording.notifier.messages(),
            vec!["Time is up. Playback could not be paused.".to_string()]
        );
        assert_eq!(fx.recording.broadcast.last(), Some(TimerSnapshot::inactive()));
    }

    #[tokio::test]
    async fn idle_player_gets_a_plain_notice() {
        let fx = Fixture::new();
        let guard = ExpirationGuard::new(5_000);
        fx.due_record().await;
        fx.recording.playback.set_idle(true);

        assert_eq!(guard.maybe_expire(&fx.cx()).await.unwrap(), ExpireOutcome::Expired);
        assert_eq!(fx.recording.notifier.messages(), vec!["Time is up.".to_string()]);
        assert!(fx.repo.load_record().await.unwrap().is_none());
    }
}
