//! Persisted timer record and the snapshots derived from it

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest duration a timer may be started or extended to
pub const MAX_DURATION_SECONDS: u64 = 86_400;

/// Lifecycle status of the single timer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Active,
    Paused,
    /// Terminal; only visible while expiration cleanup is in flight
    Expired,
}

/// The only persisted timer entity.
///
/// `remaining_seconds` is authoritative only while paused. For active
/// records it is a cache; the real value is always recomputed from
/// `started_at_epoch_ms` and `duration_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub id: Uuid,
    pub resource_id: String,
    #[serde(default)]
    pub category: String,
    pub duration_seconds: u64,
    pub remaining_seconds: u64,
    pub started_at_epoch_ms: i64,
    pub status: TimerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at_epoch_ms: Option<i64>,
}

impl TimerRecord {
    /// Create a new active record anchored at `now_ms`
    pub fn new(resource_id: String, category: String, duration_seconds: u64, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id,
            category,
            duration_seconds,
            remaining_seconds: duration_seconds,
            started_at_epoch_ms: now_ms,
            status: TimerStatus::Active,
            paused_at_epoch_ms: None,
        }
    }

    /// Whole seconds elapsed since the start anchor, never negative
    pub fn elapsed_seconds(&self, now_ms: i64) -> u64 {
        let elapsed_ms = now_ms.saturating_sub(self.started_at_epoch_ms).max(0);
        (elapsed_ms / 1000) as u64
    }

    /// Remaining time as of `now_ms`, clamped to `0..=duration_seconds`
    pub fn remaining_at(&self, now_ms: i64) -> u64 {
        match self.status {
            TimerStatus::Active => self
                .duration_seconds
                .saturating_sub(self.elapsed_seconds(now_ms)),
            TimerStatus::Paused => self.remaining_seconds.min(self.duration_seconds),
            TimerStatus::Expired => 0,
        }
    }

    /// Milliseconds left until the deadline; only meaningful while active
    pub fn remaining_ms_at(&self, now_ms: i64) -> i64 {
        self.deadline_epoch_ms().saturating_sub(now_ms).max(0)
    }

    /// Absolute wall-clock deadline for an active record
    pub fn deadline_epoch_ms(&self) -> i64 {
        self.started_at_epoch_ms
            .saturating_add((self.duration_seconds as i64).saturating_mul(1000))
    }

    pub fn is_active(&self) -> bool {
        self.status == TimerStatus::Active
    }

    pub fn is_paused(&self) -> bool {
        self.status == TimerStatus::Paused
    }

    /// Active and out of time
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.is_active() && self.remaining_at(now_ms) == 0
    }

    /// Freeze the countdown at its currently computed value
    pub fn pause_at(&mut self, now_ms: i64) {
        self.remaining_seconds = self.remaining_at(now_ms);
        self.status = TimerStatus::Paused;
        self.paused_at_epoch_ms = Some(now_ms);
    }

    /// Re-anchor the start so that the elapsed time equals
    /// `duration_seconds - remaining_seconds` as of `now_ms`
    pub fn resume_at(&mut self, now_ms: i64) {
        let remaining = self.remaining_seconds.min(self.duration_seconds);
        let consumed_ms = (self.duration_seconds - remaining) as i64 * 1000;
        self.started_at_epoch_ms = now_ms.saturating_sub(consumed_ms);
        self.remaining_seconds = remaining;
        self.status = TimerStatus::Active;
        self.paused_at_epoch_ms = None;
    }

    /// Push the deadline later. Both the total and the remaining time grow.
    pub fn extend_by(&mut self, additional_seconds: u64, now_ms: i64) {
        let remaining = self.remaining_at(now_ms);
        self.duration_seconds = self.duration_seconds.saturating_add(additional_seconds);
        self.remaining_seconds = remaining.saturating_add(additional_seconds);
    }

    /// Observer view of this record as of `now_ms`
    pub fn snapshot(&self, now_ms: i64) -> TimerSnapshot {
        TimerSnapshot {
            active: self.status != TimerStatus::Expired,
            status: Some(self.status),
            remaining_seconds: Some(self.remaining_at(now_ms)),
            duration_seconds: Some(self.duration_seconds),
            resource_id: Some(self.resource_id.clone()),
            category: Some(self.category.clone()),
            deadline_epoch_ms: self.is_active().then(|| self.deadline_epoch_ms()),
        }
    }
}

/// Storage-backed view of the timer handed to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TimerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_epoch_ms: Option<i64>,
}

impl TimerSnapshot {
    /// Snapshot for an empty slot
    pub fn inactive() -> Self {
        Self {
            active: false,
            status: None,
            remaining_seconds: None,
            duration_seconds: None,
            resource_id: None,
            category: None,
            deadline_epoch_ms: None,
        }
    }
}

impl Default for TimerSnapshot {
    fn default() -> Self {
        Self::inactive()
    }
}

/// How a finished timer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Expired,
    Stopped,
    ResourceGone,
}

/// Metadata about the most recently finished timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub resource_id: String,
    pub category: String,
    pub duration_seconds: u64,
    pub started_at_epoch_ms: i64,
    pub ended_at_epoch_ms: i64,
    pub outcome: RunOutcome,
}

impl LastRun {
    pub fn from_record(record: &TimerRecord, ended_at_epoch_ms: i64, outcome: RunOutcome) -> Self {
        Self {
            resource_id: record.resource_id.clone(),
            category: record.category.clone(),
            duration_seconds: record.duration_seconds,
            started_at_epoch_ms: record.started_at_epoch_ms,
            ended_at_epoch_ms,
            outcome,
        }
    }
}

/// Persisted marker written before expiration side effects run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationMark {
    pub timer_id: Uuid,
    pub handled_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn record(duration: u64) -> TimerRecord {
        TimerRecord::new("tab-1".into(), "video".into(), duration, T0)
    }

    #[test]
    fn remaining_is_derived_from_wall_clock() {
        let r = record(30);
        assert_eq!(r.remaining_at(T0), 30);
        assert_eq!(r.remaining_at(T0 + 999), 30);
        assert_eq!(r.remaining_at(T0 + 1_000), 29);
        assert_eq!(r.remaining_at(T0 + 31_000), 0);
        assert!(r.is_due(T0 + 30_000));
        assert!(!r.is_due(T0 + 29_999));
    }

    #[test]
    fn remaining_never_exceeds_duration() {
        let r = record(30);
        // clock moved backwards
        assert_eq!(r.remaining_at(T0 - 60_000), 30);

        let mut paused = record(30);
        paused.pause_at(T0);
        paused.remaining_seconds = 500;
        assert_eq!(paused.remaining_at(T0), 30);
    }

    #[test]
    fn pause_then_resume_reanchors_deadline() {
        let mut r = record(30);
        r.pause_at(T0 + 10_000);
        assert_eq!(r.status, TimerStatus::Paused);
        assert_eq!(r.remaining_seconds, 20);
        assert_eq!(r.paused_at_epoch_ms, Some(T0 + 10_000));

        // frozen while paused
        assert_eq!(r.remaining_at(T0 + 110_000), 20);

        r.resume_at(T0 + 110_000);
        assert_eq!(r.status, TimerStatus::Active);
        assert_eq!(r.paused_at_epoch_ms, None);
        assert_eq!(r.remaining_at(T0 + 110_000), 20);
        assert_eq!(r.deadline_epoch_ms(), T0 + 130_000);
    }

    #[test]
    fn extend_grows_duration_and_remaining() {
        let mut r = record(30);
        r.extend_by(10, T0 + 5_000);
        assert_eq!(r.duration_seconds, 40);
        assert_eq!(r.remaining_seconds, 35);
        assert_eq!(r.remaining_at(T0 + 5_000), 35);

        let mut p = record(30);
        p.pause_at(T0 + 5_000);
        p.extend_by(10, T0 + 50_000);
        assert_eq!(p.duration_seconds, 40);
        assert_eq!(p.remaining_at(T0 + 50_000), 35);
    }

    #[test]
    fn serializes_in_camel_case() {
        let r = record(60);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["resourceId"], "tab-1");
        assert_eq!(json["durationSeconds"], 60);
        assert_eq!(json["status"], "active");
        assert!(json.get("pausedAtEpochMs").is_none());
    }

    #[test]
    fn snapshot_of_paused_record() {
        let mut r = record(60);
        r.pause_at(T0);
        let snap = r.snapshot(T0 + 5_000);
        assert!(snap.active);
        assert_eq!(snap.status, Some(TimerStatus::Paused));
        assert_eq!(snap.remaining_seconds, Some(60));
        assert_eq!(snap.deadline_epoch_ms, None);
    }
}
