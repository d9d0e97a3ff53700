use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::task::JoinError;
use tracing::debug;

use crate::job::Job;

/// Error type for job execution. Every variant counts as a retryable failure.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Execution error: {0}")]
    Failed(String),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job handler panicked")]
    Panicked,

    #[error("Job handler cancelled")]
    Cancelled,
}

pub type ExecutionResult = Result<(), ExecutionError>;

/// Performs the actual work behind a job.
///
/// Delivery is at-least-once, so implementations must cope with seeing the
/// same job id more than once.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn execute(&self, job: &Job) -> ExecutionResult;
}

type BoxedHandler =
    Arc<dyn Fn(Vec<u8>) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send>> + Send + Sync>;

/// Sink backed by an async closure over the raw payload.
///
/// The closure runs on its own task so a panic is reported as
/// [`ExecutionError::Panicked`] instead of taking the worker down.
pub struct HandlerSink {
    handler: BoxedHandler,
    timeout: Option<Duration>,
}

impl HandlerSink {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Arc::new(move |payload: Vec<u8>| {
            let handler = Arc::clone(&handler);
            Box::pin(async move { handler(payload).await.map_err(ExecutionError::Failed) })
        });

        Self {
            handler: boxed,
            timeout: None,
        }
    }

    /// Build a sink whose payload is JSON for `T`.
    pub fn json<T, F, Fut>(handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Arc::new(move |payload: Vec<u8>| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let args: T = serde_json::from_slice(&payload)?;
                handler(args).await.map_err(ExecutionError::Failed)
            })
        });

        Self {
            handler: boxed,
            timeout: None,
        }
    }

    /// Fail attempts that run longer than `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl ExecutionSink for HandlerSink {
    async fn execute(&self, job: &Job) -> ExecutionResult {
        let future = (self.handler)(job.payload.clone());
        let mut handle = tokio::spawn(future);

        let join_to_error = |e: JoinError| {
            if e.is_panic() {
                ExecutionError::Panicked
            } else {
                ExecutionError::Cancelled
            }
        };

        match self.timeout {
            Some(duration) => {
                tokio::select! {
                    res = &mut handle => res.map_err(join_to_error)?,
                    _ = tokio::time::sleep(duration) => {
                        handle.abort();
                        Err(ExecutionError::Timeout(duration))
                    }
                }
            }
            None => handle.await.map_err(join_to_error)?,
        }
    }
}

/// Stand-in workload for running the worker without real job code: sleeps
/// for `work` and fails while the job has fewer than `fail_attempts` failures
/// behind it.
#[derive(Debug, Clone)]
pub struct SimulatedSink {
    work: Duration,
    fail_attempts: u32,
}

impl SimulatedSink {
    pub fn new(work: Duration, fail_attempts: u32) -> Self {
        Self {
            work,
            fail_attempts,
        }
    }
}

#[async_trait]
impl ExecutionSink for SimulatedSink {
    async fn execute(&self, job: &Job) -> ExecutionResult {
        if job.retry_count < self.fail_attempts {
            return Err(ExecutionError::Failed(format!(
                "simulated error on job {}",
                job.id
            )));
        }
        tokio::time::sleep(self.work).await;
        debug!(job_id = %job.id, bytes = job.payload.len(), "Simulated job finished");
        Ok(())
    }
}
