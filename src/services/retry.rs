//! Retry with backoff for flaky external collaborators

use std::{fmt::Display, future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

/// Delays used by the command-backed collaborators
pub const DEFAULT_BACKOFF: [Duration; 2] = [Duration::from_millis(250), Duration::from_secs(1)];

/// Run `op`, retrying after each delay in `schedule` until it succeeds or the
/// schedule runs out. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(
    what: &str,
    schedule: &[Duration],
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!("{} succeeded after {} retries", what, attempt);
                }
                return Ok(value);
            }
            Err(e) => match schedule.get(attempt) {
                Some(delay) => {
                    warn!("{} failed: {}, retrying in {:?}", what, e, delay);
                    sleep(*delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let schedule = [Duration::from_millis(1); 3];
        let result: Result<usize, String> = retry_with_backoff("flaky", &schedule, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(format!("attempt {}", n))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_with_last_error() {
        let calls = AtomicUsize::new(0);
        let schedule = [Duration::from_millis(1); 2];
        let result: Result<(), String> = retry_with_backoff("broken", &schedule, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(format!("attempt {}", n))
        })
        .await;
        assert_eq!(result, Err("attempt 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
