//! Hook points for observing the worker pool.
//!
//! Workers report to an injected [`Observer`] instead of touching global
//! metric state. Every method is synchronous and infallible: reporting must
//! not be able to stall or break job processing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::job::{JobId, JobStatus};
use crate::storage::QueueError;

/// How an attempt ended from the pool's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    /// Failed and handed back to the queue after `backoff`
    Retried { backoff: Duration },
    /// Failed with the retry budget spent
    Abandoned,
    /// Failed, but the requeue could not be completed before shutdown
    Dropped,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Succeeded => "succeeded",
            AttemptOutcome::Retried { .. } => "retried",
            AttemptOutcome::Abandoned => "abandoned",
            AttemptOutcome::Dropped => "dropped",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, AttemptOutcome::Succeeded)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record emitted once per processed job attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub worker_id: usize,
    pub job_id: JobId,
    /// Result of the attempt itself (`success` or `failed`), even if the job
    /// has since gone back to the queue as `pending`
    pub status: JobStatus,
    pub retry_count: u32,
    pub outcome: AttemptOutcome,
    /// Whole iteration, including any backoff sleep and requeue
    pub duration: Duration,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Queue operation that hit a transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOp {
    Enqueue,
    Dequeue,
    Length,
}

impl QueueOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueOp::Enqueue => "enqueue",
            QueueOp::Dequeue => "dequeue",
            QueueOp::Length => "length",
        }
    }
}

pub trait Observer: Send + Sync {
    /// A worker took a job off the queue and is about to run it.
    fn attempt_started(&self, _worker_id: usize, _job_id: &JobId) {}

    fn record_attempt(&self, record: &AttemptRecord);

    /// Fresh sample of the transport's length.
    fn set_queue_depth(&self, _depth: u64) {}

    fn transport_error(&self, _op: QueueOp, _error: &QueueError) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record_attempt(&self, _record: &AttemptRecord) {}
}

/// Emits each attempt as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record_attempt(&self, record: &AttemptRecord) {
        let duration_ms = record.duration.as_millis() as u64;
        if record.outcome.is_failure() {
            warn!(
                worker = record.worker_id,
                job_id = %record.job_id,
                status = %record.status,
                outcome = %record.outcome,
                retry_count = record.retry_count,
                duration_ms,
                updated_at = %record.updated_at.to_rfc3339(),
                error = record.error.as_deref().unwrap_or_default(),
                "Job attempt finished"
            );
        } else {
            info!(
                worker = record.worker_id,
                job_id = %record.job_id,
                status = %record.status,
                outcome = %record.outcome,
                retry_count = record.retry_count,
                duration_ms,
                updated_at = %record.updated_at.to_rfc3339(),
                "Job attempt finished"
            );
        }
    }
}

/// Fans every call out to a list of observers.
#[derive(Default, Clone)]
pub struct Observers {
    inner: Vec<Arc<dyn Observer>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn Observer>) -> Self {
        self.inner.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Observer for Observers {
    fn attempt_started(&self, worker_id: usize, job_id: &JobId) {
        for observer in &self.inner {
            observer.attempt_started(worker_id, job_id);
        }
    }

    fn record_attempt(&self, record: &AttemptRecord) {
        for observer in &self.inner {
            observer.record_attempt(record);
        }
    }

    fn set_queue_depth(&self, depth: u64) {
        for observer in &self.inner {
            observer.set_queue_depth(depth);
        }
    }

    fn transport_error(&self, op: QueueOp, error: &QueueError) {
        for observer in &self.inner {
            observer.transport_error(op, error);
        }
    }
}
