//! Retry backoff schedule.
//!
//! After the N-th failed attempt of a task its next attempt is due
//! `steps[N]` later. Index 0 is never used for failures because the first
//! failure already yields a retry count of 1. A retry count past the end of
//! the table has no defined delay and means "no further retry".

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default delays in seconds, indexed by the retry count after a failure.
pub const DEFAULT_BACKOFF_SECS: [u64; 8] = [0, 10, 60, 120, 3600, 7200, 21600, 54000];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn new(steps: Vec<Duration>) -> Self {
        Self { steps }
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Delay applied after a failure that brought the task to `retry_count`.
    pub fn delay_for(&self, retry_count: u32) -> Option<Duration> {
        self.steps.get(retry_count as usize).copied()
    }

    /// When a task that just failed into `retry_count` becomes due again.
    pub fn next_retry_time(
        &self,
        retry_count: u32,
        attempt_time: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let delay = self.delay_for(retry_count)?;
        let delay = chrono::Duration::from_std(delay).ok()?;
        attempt_time.checked_add_signed(delay)
    }

    /// Highest retry count that still has a defined delay.
    pub fn max_retries(&self) -> u32 {
        self.steps.len().saturating_sub(1) as u32
    }

    /// Retry ceiling actually enforced: `configured`, but never beyond the table.
    pub fn effective_ceiling(&self, configured: u32) -> u32 {
        configured.min(self.max_retries())
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_secs(&DEFAULT_BACKOFF_SECS)
    }
}
