//! Fetch pacing
//!
//! [`RateLimiter`] spaces fetch starts; [`Backoff`] spaces retries of one URL.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Upper bound of a single retry delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Enforces a minimum interval between fetch starts
///
/// Clones share the same clock, so one limiter handed to every job spaces
/// fetches across the whole process.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_start: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Arc::new(Mutex::new(None)),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until a fetch may start and claims that start time
    pub async fn until_ready(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        // Holding the lock while sleeping queues waiters in order
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_start = Some(Instant::now());
    }
}

/// Exponential retry delay: `base × 2^(n-1)`, capped
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max: MAX_BACKOFF,
        }
    }

    /// Delay before retry number `retry` (1-based); zero for the first attempt
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base.saturating_mul(factor).min(self.max)
    }
}
