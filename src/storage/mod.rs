pub mod memory;
pub mod redis;
pub mod sqlite;

use async_trait::async_trait;

use crate::job::Job;

pub use self::redis::RedisQueue;
pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

/// Failure talking to the queue transport. Workers treat it like an empty
/// queue: wait a poll interval and try again.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// FIFO-ish job transport with at-least-once delivery.
///
/// Implementations must be safe to share between workers and must never hand
/// the same popped job to two callers; that atomicity is the backing store's
/// responsibility, the worker pool adds no locking of its own.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Serialize and append a job.
    async fn enqueue(&self, job: &Job) -> Result<()>;

    /// Atomically pop one job. `Ok(None)` means the queue is empty.
    async fn dequeue(&self) -> Result<Option<Job>>;

    /// Number of jobs waiting. Only used for observability.
    async fn len(&self) -> Result<u64>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Wire encoding shared by every transport.
pub(crate) fn encode(job: &Job) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(job)?)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Job> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::retry::RetryPolicy;

    #[test]
    fn codec_preserves_every_field() {
        let mut job = Job::new(vec![0u8, 159, 146, 150, 255])
            .with_max_retries(7)
            .with_retry_delay(2);
        job.mark_running();
        job.mark_failed("disk full");
        job.mark_requeued();

        let decoded = decode(&encode(&job).unwrap()).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, QueueError::Serialization(_)));
    }

    #[test]
    fn decode_accepts_minimal_producer_payload() {
        let raw = br#"{
            "id": "0b6f2a4e-9c1d-4f7e-8a53-2d61c0e4b9a7",
            "payload": "eyJmb28iOiJiYXIifQ==",
            "status": "pending",
            "retry_count": 0,
            "created_at": "2024-05-01T12:00:00.123456789+02:00",
            "updated_at": "2024-05-01T12:00:00.123456789+02:00",
            "retry_delay": 5,
            "max_retries": 3
        }"#;
        let job = decode(raw).unwrap();
        assert_eq!(job.id.as_ref(), "0b6f2a4e-9c1d-4f7e-8a53-2d61c0e4b9a7");
        assert_eq!(job.payload, br#"{"foo":"bar"}"#.to_vec());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.max_retries, Some(3));
        assert_eq!(job.retry_delay, Some(5));
        assert!(job.executed_at.is_none());
        assert!(job.last_error.is_none());
    }

    #[test]
    fn decode_producer_record_with_zero_retry_settings() {
        let raw = br#"{
            "id": "job-2",
            "payload": null,
            "status": "pending",
            "retry_count": 0,
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": "2024-05-01T12:00:00Z",
            "retry_delay": 0,
            "max_retries": 0
        }"#;
        let job = decode(raw).unwrap();
        assert!(job.payload.is_empty());

        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(&job), 0);
        assert_eq!(policy.retry_delay(&job), 5);
    }
}
