use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::Result;

/// Exponential backoff state for idle-poll waits and transient-error retries.
///
/// Starts at `base`, doubles on every `next_delay()` and saturates at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(
        base: Duration,
        max: Duration,
    ) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Returns the delay to wait now and advances the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Run `task` until it succeeds or `max_attempts` is reached, sleeping with
/// exponential backoff between attempts. Returns the last error on
/// exhaustion.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    op_name: &str,
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    task: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    debug_assert!(max_attempts > 0);
    let mut backoff = Backoff::new(base_delay, max_delay);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match task().await {
            Ok(r) => return Ok(r),
            Err(e) if attempts < max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}): {:?}",
                    op_name, attempts, max_attempts, e
                );
                sleep(backoff.next_delay()).await;
            }
            Err(e) => {
                warn!("{} failed after {} attempts", op_name, attempts);
                return Err(e);
            }
        }
    }
}
