use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::depth::{DepthSampler, DEFAULT_SAMPLE_INTERVAL};
use crate::observer::{NoopObserver, Observer};
use crate::retry::RetryPolicy;
use crate::sink::ExecutionSink;
use crate::storage::Queue;
use crate::worker::{Worker, DEFAULT_POLL_INTERVAL};

pub const DEFAULT_POOL_SIZE: usize = 5;

/// Tunables for a [`WorkerPool`]
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub size: usize,
    pub poll_interval: Duration,
    pub policy: RetryPolicy,
    /// `None` disables queue-depth sampling
    pub depth_sample_interval: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            policy: RetryPolicy::default(),
            depth_sample_interval: Some(DEFAULT_SAMPLE_INTERVAL),
        }
    }
}

impl PoolOptions {
    /// Pool size from a raw configuration value; anything below one falls
    /// back to the default.
    pub fn with_size(mut self, size: i64) -> Self {
        self.size = resolve_pool_size(size);
        self
    }

    /// Set how long an idle worker waits before polling again
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the retry fallbacks handed to every worker
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the queue-depth sampling interval; `None` turns sampling off
    pub fn with_depth_sampling(mut self, interval: Option<Duration>) -> Self {
        self.depth_sample_interval = interval;
        self
    }
}

pub fn resolve_pool_size(size: i64) -> usize {
    if size <= 0 {
        DEFAULT_POOL_SIZE
    } else {
        usize::try_from(size).unwrap_or(DEFAULT_POOL_SIZE)
    }
}

/// Runs a fixed set of workers against one queue and owns their shutdown.
pub struct WorkerPool {
    queue: Arc<dyn Queue>,
    sink: Arc<dyn ExecutionSink>,
    observer: Arc<dyn Observer>,
    options: PoolOptions,
    shutdown: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
    sampler_handle: Option<JoinHandle<()>>,
}

impl WorkerPool {
    /// Workers are not started until [`WorkerPool::start`] is called.
    pub fn new(queue: Arc<dyn Queue>, sink: Arc<dyn ExecutionSink>, options: PoolOptions) -> Self {
        Self {
            queue,
            sink,
            observer: Arc::new(NoopObserver),
            options,
            shutdown: CancellationToken::new(),
            worker_handles: Vec::new(),
            sampler_handle: None,
        }
    }

    /// Attach the observer every worker reports to
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Tie the pool to an externally owned token, e.g. one driven by signals.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Token that stops the pool when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of workers the pool runs
    pub fn size(&self) -> usize {
        self.options.size
    }

    /// Whether [`WorkerPool::start`] has spawned the workers
    pub fn is_running(&self) -> bool {
        !self.worker_handles.is_empty()
    }

    /// Spawn the workers (and the depth sampler, if enabled). Calling this on
    /// a running pool does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        for id in 0..self.options.size {
            self.spawn_worker(id);
        }
        self.start_sampler();

        info!(workers = self.options.size, "Worker pool started");
    }

    fn spawn_worker(&mut self, id: usize) {
        let worker = Worker::new(
            id,
            Arc::clone(&self.queue),
            Arc::clone(&self.sink),
            Arc::clone(&self.observer),
        )
        .with_policy(self.options.policy)
        .with_poll_interval(self.options.poll_interval);

        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            worker.run(shutdown).await;
        });

        self.worker_handles.push(handle);
    }

    fn start_sampler(&mut self) {
        let Some(interval) = self.options.depth_sample_interval else {
            return;
        };

        let sampler = DepthSampler::new(Arc::clone(&self.queue), Arc::clone(&self.observer))
            .with_interval(interval);
        let shutdown = self.shutdown.clone();

        self.sampler_handle = Some(tokio::spawn(async move {
            sampler.run(shutdown).await;
        }));
    }

    /// Signal every worker to stop and wait for all of them to exit.
    pub async fn shutdown(self) {
        info!("Shutting down worker pool...");
        self.shutdown.cancel();
        self.join().await;
    }

    /// Wait for the workers to exit without signalling them; returns once
    /// the shutdown token has been cancelled elsewhere and every worker has
    /// finished its current iteration.
    pub async fn join(mut self) {
        for handle in self.worker_handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        if let Some(handle) = self.sampler_handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Depth sampler task ended abnormally");
            }
        }

        info!("Worker pool stopped");
    }
}
