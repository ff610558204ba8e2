//! Small retry policy: a bounded attempt count plus a backoff schedule.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        base: Duration,
        factor: u32,
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after the given 0-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, factor, max } => {
                let mult = factor.max(1).saturating_pow(attempt);
                base.saturating_mul(mult).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Registry lookup after setup: 3 attempts, 2s apart.
    pub const fn registry_default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }

    /// Poll `check` until it yields `true` or attempts run out.
    ///
    /// Sleeps after every negative attempt, including the last one.
    /// Returns the last observed value.
    pub async fn poll_until<F, Fut>(&self, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for attempt in 0..self.max_attempts {
            if check().await {
                return true;
            }
            let delay = self.backoff.delay(attempt);
            debug!(attempt = attempt + 1, max = self.max_attempts, ?delay, "Check negative, retrying");
            tokio::time::sleep(delay).await;
        }
        false
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::registry_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
