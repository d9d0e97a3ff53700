use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::observer::{Observer, QueueOp};
use crate::storage::Queue;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Periodically reads the true queue length from the transport and reports
/// it as the queue-depth gauge. Sampling instead of counting dequeues keeps
/// the gauge right across crashes and other producers.
pub struct DepthSampler {
    queue: Arc<dyn Queue>,
    observer: Arc<dyn Observer>,
    interval: Duration,
}

impl DepthSampler {
    /// Create a sampler for `queue` with the default interval
    pub fn new(queue: Arc<dyn Queue>, observer: Arc<dyn Observer>) -> Self {
        Self {
            queue,
            observer,
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    /// Set the time between samples
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sample immediately, then once per interval until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Queue depth sampler started");

        loop {
            self.tick().await;
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Queue depth sampler shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Take a single sample
    pub async fn tick(&self) {
        match self.queue.len().await {
            Ok(depth) => {
                debug!(depth, "Sampled queue depth");
                self.observer.set_queue_depth(depth);
            }
            Err(e) => {
                error!(error = %e, "Failed to sample queue depth");
                self.observer.transport_error(QueueOp::Length, &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::observer::AttemptRecord;
    use crate::storage::MemoryQueue;
    use std::sync::Mutex;

    #[derive(Default)]
    struct DepthLog(Mutex<Vec<u64>>);

    impl Observer for DepthLog {
        fn record_attempt(&self, _record: &AttemptRecord) {}

        fn set_queue_depth(&self, depth: u64) {
            self.0.lock().unwrap().push(depth);
        }
    }

    #[tokio::test]
    async fn tick_reports_current_length() {
        let queue = Arc::new(MemoryQueue::new());
        let log = Arc::new(DepthLog::default());
        let sampler = DepthSampler::new(queue.clone(), log.clone());

        sampler.tick().await;
        queue.enqueue(&Job::new("a")).await.unwrap();
        queue.enqueue(&Job::new("b")).await.unwrap();
        sampler.tick().await;
        queue.dequeue().await.unwrap();
        sampler.tick().await;

        assert_eq!(*log.0.lock().unwrap(), vec![0, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_samples_until_cancelled() {
        let queue = Arc::new(MemoryQueue::new());
        let log = Arc::new(DepthLog::default());
        let sampler = DepthSampler::new(queue, log.clone()).with_interval(Duration::from_secs(1));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { sampler.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(log.0.lock().unwrap().len(), 4);
    }
}
