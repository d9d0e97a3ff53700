#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use workhorse::observer::QueueOp;
use workhorse::sink::ExecutionResult;
use workhorse::storage::Result as QueueResult;
use workhorse::{
    AttemptRecord, ExecutionError, ExecutionSink, Job, JobId, MemoryQueue, Observer, Queue,
    QueueError,
};

/// Sink that fails the first `fail_attempts` executions of every job, then
/// succeeds. Optionally sleeps on each call.
#[derive(Default)]
pub struct ScriptedSink {
    fail_attempts: u32,
    work: Duration,
    calls: Mutex<Vec<(JobId, u32)>>,
    attempts: Mutex<HashMap<JobId, u32>>,
}

impl ScriptedSink {
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(fail_attempts: u32) -> Self {
        Self {
            fail_attempts,
            ..Default::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    /// `(job id, retry_count seen by the sink)` for every call, in order
    pub fn calls(&self) -> Vec<(JobId, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutionSink for ScriptedSink {
    async fn execute(&self, job: &Job) -> ExecutionResult {
        self.calls
            .lock()
            .unwrap()
            .push((job.id.clone(), job.retry_count));

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(job.id.clone()).or_insert(0);
            *n += 1;
            *n
        };

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        if attempt <= self.fail_attempts {
            Err(ExecutionError::Failed(format!("attempt {attempt} failed")))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub records: Mutex<Vec<AttemptRecord>>,
    pub started: AtomicUsize,
    pub transport_errors: Mutex<Vec<QueueOp>>,
    pub depths: Mutex<Vec<u64>>,
}

impl RecordingObserver {
    pub fn records(&self) -> Vec<AttemptRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn transport_errors(&self) -> Vec<QueueOp> {
        self.transport_errors.lock().unwrap().clone()
    }
}

impl Observer for RecordingObserver {
    fn attempt_started(&self, _worker_id: usize, _job_id: &JobId) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn record_attempt(&self, record: &AttemptRecord) {
        self.records.lock().unwrap().push(record.clone());
    }

    fn set_queue_depth(&self, depth: u64) {
        self.depths.lock().unwrap().push(depth);
    }

    fn transport_error(&self, op: QueueOp, _error: &QueueError) {
        self.transport_errors.lock().unwrap().push(op);
    }
}

fn broken_pipe() -> QueueError {
    QueueError::Serialization(serde_json::from_str::<u8>("unreachable").unwrap_err())
}

/// Wraps a [`MemoryQueue`], counting calls and injecting failures.
#[derive(Default)]
pub struct FlakyQueue {
    inner: MemoryQueue,
    pub dequeue_calls: AtomicUsize,
    pub enqueue_calls: AtomicUsize,
    failing_dequeues: AtomicUsize,
    fail_enqueue: AtomicBool,
}

impl FlakyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` dequeues fail with a transport error
    pub fn fail_next_dequeues(&self, n: usize) {
        self.failing_dequeues.store(n, Ordering::SeqCst);
    }

    pub fn fail_enqueues(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    pub fn dequeues(&self) -> usize {
        self.dequeue_calls.load(Ordering::SeqCst)
    }

    /// Seed a job without going through the failure switch
    pub async fn seed(&self, job: &Job) {
        self.inner.enqueue(job).await.unwrap();
    }
}

#[async_trait]
impl Queue for FlakyQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<()> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(broken_pipe());
        }
        self.inner.enqueue(job).await
    }

    async fn dequeue(&self) -> QueueResult<Option<Job>> {
        self.dequeue_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_dequeues
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(broken_pipe());
        }
        self.inner.dequeue().await
    }

    async fn len(&self) -> QueueResult<u64> {
        self.inner.len().await
    }
}
