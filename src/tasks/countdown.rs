//! Fast in-process countdown
//!
//! Best effort only: it dies with the process and exists for snappy
//! observer updates. Expiry through this path still goes through the guard.

use std::{sync::Weak, time::Duration};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::engine::{ExpireOutcome, TimerEngine};

/// Past the deadline so the wall clock agrees the timer is due
const DEADLINE_SLACK_MS: u64 = 20;

/// Broadcast roughly once per second and expire at the deadline
pub async fn countdown_task(engine: Weak<TimerEngine>, generation: u64) {
    debug!("Countdown {} started", generation);

    loop {
        let Some(engine) = engine.upgrade() else {
            return;
        };

        let Some(remaining_ms) = engine.tick() else {
            debug!("Countdown {} has nothing to count", generation);
            engine.release_countdown(generation);
            return;
        };

        if remaining_ms == 0 {
            engine.release_countdown(generation);
            match engine.maybe_expire().await {
                Ok(ExpireOutcome::NotDue { remaining_seconds }) => {
                    // the store moved the deadline; pick it up from there
                    debug!("Countdown {} was early by {}s", generation, remaining_seconds);
                    if let Err(e) = engine.reconcile().await {
                        warn!("Reconcile after early countdown failed: {}", e);
                    }
                }
                Ok(outcome) => debug!("Countdown {} finished: {:?}", generation, outcome),
                Err(e) => warn!("Countdown expiration failed: {}", e),
            }
            return;
        }

        // Wake just after each whole-second boundary of the remaining time
        let wait_ms = match (remaining_ms % 1000) as u64 {
            0 => 1000,
            partial => partial + DEADLINE_SLACK_MS,
        };
        drop(engine);
        sleep(Duration::from_millis(wait_ms)).await;
    }
}
