use std::time::Duration;

use crate::job::Job;

/// Cap on the backoff exponent so that long-lived jobs with a huge retry
/// budget don't overflow or sleep for years.
pub const MAX_BACKOFF_EXPONENT: u32 = 20;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Backoff in seconds for the given post-increment retry count:
/// `retry_delay * 2^min(retry_count - 1, 20)`.
pub fn backoff_secs(retry_count: u32, retry_delay: u64) -> u64 {
    let exponent = retry_count.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    retry_delay.saturating_mul(1u64 << exponent)
}

/// What to do with a job that just failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `backoff`, then hand the job back to the queue
    Retry { backoff: Duration },
    /// Retry budget exhausted; the job stays failed
    Abandon,
}

/// Retry policy with the worker-side fallbacks for jobs that were submitted
/// without their own `max_retries` / `retry_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub default_max_retries: u32,
    pub default_retry_delay: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            default_retry_delay: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl RetryPolicy {
    pub fn new(default_max_retries: u32, default_retry_delay: u64) -> Self {
        Self {
            default_max_retries,
            default_retry_delay,
        }
    }

    /// Retry budget for `job`; an explicit zero means no retries.
    pub fn max_retries(&self, job: &Job) -> u32 {
        job.max_retries.unwrap_or(self.default_max_retries)
    }

    /// Base backoff for `job` in seconds. Zero counts as unset.
    pub fn retry_delay(&self, job: &Job) -> u64 {
        job.retry_delay
            .filter(|&delay| delay > 0)
            .unwrap_or(self.default_retry_delay)
    }

    /// Decide the fate of a job whose `retry_count` has already been bumped
    /// for the failure being handled.
    pub fn decide(&self, job: &Job) -> RetryDecision {
        if job.retry_count > self.max_retries(job) {
            return RetryDecision::Abandon;
        }
        RetryDecision::Retry {
            backoff: Duration::from_secs(backoff_secs(job.retry_count, self.retry_delay(job))),
        }
    }
}
