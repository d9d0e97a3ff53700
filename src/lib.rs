pub mod config;
pub mod depth;
pub mod job;
pub mod metrics;
pub mod observer;
pub mod pool;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use job::{Job, JobId, JobStatus};
pub use observer::{AttemptOutcome, AttemptRecord, NoopObserver, Observer, Observers, TracingObserver};
pub use pool::{PoolOptions, WorkerPool};
pub use retry::{backoff_secs, RetryDecision, RetryPolicy};
pub use sink::{ExecutionError, ExecutionSink, HandlerSink, SimulatedSink};
pub use storage::{MemoryQueue, Queue, QueueError, RedisQueue, SqliteQueue};
pub use worker::Worker;
