use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::job::{Job, JobStatus};
use crate::observer::{AttemptOutcome, AttemptRecord, Observer, QueueOp};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::sink::ExecutionSink;
use crate::storage::Queue;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One consumer loop: dequeue, execute, then finalize or retry.
///
/// Workers keep no state between iterations beyond the job in hand.
pub struct Worker {
    id: usize,
    queue: Arc<dyn Queue>,
    sink: Arc<dyn ExecutionSink>,
    observer: Arc<dyn Observer>,
    policy: RetryPolicy,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<dyn Queue>,
        sink: Arc<dyn ExecutionSink>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            id,
            queue,
            sink,
            observer,
            policy: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the retry fallbacks for jobs submitted without their own budget or delay
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the poll interval used when the queue is empty or unreachable
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Cancellation is checked before every dequeue. A job that is executing
    /// or sleeping off its backoff is always carried through to the end of
    /// its iteration; only the idle poll wait is cut short.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(worker = self.id, "Worker started");

        while !shutdown.is_cancelled() {
            if !self.poll_and_process(&shutdown).await {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!(worker = self.id, "Worker shutting down");
    }

    /// One iteration. Returns `false` when there was nothing to do, so the
    /// caller should wait a poll interval.
    pub async fn poll_and_process(&self, shutdown: &CancellationToken) -> bool {
        match self.queue.dequeue().await {
            Ok(Some(job)) => {
                let span = info_span!("process_job", worker = self.id, job_id = %job.id);
                self.process(job, shutdown).instrument(span).await;
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!(worker = self.id, error = %e, "Failed to dequeue job");
                self.observer.transport_error(QueueOp::Dequeue, &e);
                false
            }
        }
    }

    async fn process(&self, mut job: Job, shutdown: &CancellationToken) {
        let start = Instant::now();
        job.mark_running();
        self.observer.attempt_started(self.id, &job.id);
        debug!(retry_count = job.retry_count, "Processing job");

        let outcome = match self.sink.execute(&job).await {
            Ok(()) => {
                job.mark_succeeded();
                debug!("Job succeeded");
                AttemptOutcome::Succeeded
            }
            Err(e) => {
                job.mark_failed(e.to_string());
                self.handle_failure(&mut job, shutdown).await
            }
        };

        let record = AttemptRecord {
            worker_id: self.id,
            job_id: job.id.clone(),
            status: if outcome.is_failure() {
                JobStatus::Failed
            } else {
                JobStatus::Success
            },
            retry_count: job.retry_count,
            outcome,
            duration: start.elapsed(),
            updated_at: job.updated_at,
            error: job.last_error.clone(),
        };
        self.observer.record_attempt(&record);
    }

    /// Apply the retry policy to a job that has just been marked failed.
    async fn handle_failure(&self, job: &mut Job, shutdown: &CancellationToken) -> AttemptOutcome {
        let backoff = match self.policy.decide(job) {
            RetryDecision::Retry { backoff } => backoff,
            RetryDecision::Abandon => {
                warn!(
                    retry_count = job.retry_count,
                    max_retries = self.policy.max_retries(job),
                    error = job.last_error.as_deref().unwrap_or_default(),
                    "Job failed permanently"
                );
                return AttemptOutcome::Abandoned;
            }
        };

        info!(
            retry_count = job.retry_count,
            max_retries = self.policy.max_retries(job),
            backoff_secs = backoff.as_secs(),
            "Scheduling job for retry"
        );

        // The job is held here for the whole backoff; other workers carry on.
        tokio::time::sleep(backoff).await;

        let mut pending = job.clone();
        pending.mark_requeued();
        if self.requeue(&pending, shutdown).await {
            *job = pending;
            AttemptOutcome::Retried { backoff }
        } else {
            AttemptOutcome::Dropped
        }
    }

    /// Keep trying to hand the job back until it sticks or shutdown is
    /// requested. Returns `false` if the job had to be dropped.
    async fn requeue(&self, job: &Job, shutdown: &CancellationToken) -> bool {
        loop {
            match self.queue.enqueue(job).await {
                Ok(()) => return true,
                Err(e) => {
                    self.observer.transport_error(QueueOp::Enqueue, &e);
                    if shutdown.is_cancelled() {
                        error!(error = %e, "Dropping job: requeue failed during shutdown");
                        return false;
                    }
                    warn!(error = %e, "Failed to requeue job, will try again");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
