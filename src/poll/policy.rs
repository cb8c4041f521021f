//! Fixed-interval retry policy

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded, fixed-interval polling
///
/// Remote durations are controlled by the workflow's sleep, so worst-case
/// latency is predictable and no backoff is applied. Exhaustion is not an
/// error: `poll` returns `None` and leaves the verdict to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of checks before giving up (at least one check always runs)
    pub max_attempts: u32,
    /// Delay between a miss and the next check
    pub interval: Duration,
}

impl RetryPolicy {
    /// Waiting for merge-queue check runs to appear: 6 x 5s
    pub const MERGE_QUEUE_CHECKS: Self = Self::every_five_seconds(6);

    /// Waiting for a single PR to merge: 6 x 5s
    pub const MERGED: Self = Self::every_five_seconds(6);

    /// Waiting for two PRs racing through the queue: 12 x 5s
    pub const ALL_MERGED: Self = Self::every_five_seconds(12);

    /// Waiting for a matrix scenario's queue to empty: 40 x 5s
    pub const QUEUE_DRAIN: Self = Self::every_five_seconds(40);

    /// Policy with an explicit attempt count and interval
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// `max_attempts` checks, 5 seconds apart
    pub const fn every_five_seconds(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::from_secs(5))
    }

    /// Longest time `poll` sleeps before giving up
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }

    /// Run `check` until it yields a value or attempts run out
    ///
    /// `check` receives the 1-based attempt number. Errors abort polling
    /// immediately. There is no sleep after the final attempt.
    pub async fn poll<T, F, Fut>(&self, what: &str, mut check: F) -> Result<Option<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            debug!(what, attempt, attempts, "polling");
            if let Some(value) = check(attempt).await? {
                debug!(what, attempt, "condition met");
                return Ok(Some(value));
            }
            if attempt < attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        warn!(what, attempts, budget = ?self.budget(), "condition not met, giving up");
        Ok(None)
    }
}
