use std::collections::HashSet;
use std::sync::Arc;

use workhorse::{Job, JobStatus, Queue, SqliteQueue};

async fn queue() -> SqliteQueue {
    SqliteQueue::in_memory("jobs").await.unwrap()
}

#[tokio::test]
async fn test_round_trip_keeps_every_field() {
    let queue = queue().await;

    let mut job = Job::new(vec![0u8, 159, 146, 150])
        .with_max_retries(7)
        .with_retry_delay(2);
    job.mark_running();
    job.mark_failed("connection reset");
    job.mark_requeued();

    queue.enqueue(&job).await.unwrap();
    let popped = queue.dequeue().await.unwrap().unwrap();

    assert_eq!(popped, job);
    assert_eq!(popped.status, JobStatus::Pending);
    assert_eq!(popped.retry_count, 1);
    assert_eq!(popped.last_error.as_deref(), Some("connection reset"));
}

#[tokio::test]
async fn test_empty_queue_dequeues_none() {
    let queue = queue().await;
    assert!(queue.dequeue().await.unwrap().is_none());
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_dequeue_is_fifo() {
    let queue = queue().await;
    let jobs: Vec<Job> = (0..5).map(|i| Job::new(format!("job-{i}"))).collect();
    for job in &jobs {
        queue.enqueue(job).await.unwrap();
    }
    assert_eq!(queue.len().await.unwrap(), 5);

    for job in &jobs {
        let popped = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(popped.id, job.id);
    }
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_queue_keys_are_isolated() {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let emails = SqliteQueue::from_pool(pool.clone(), "emails").await.unwrap();
    let reports = SqliteQueue::from_pool(pool, "reports").await.unwrap();

    emails.enqueue(&Job::new("welcome")).await.unwrap();

    assert_eq!(emails.len().await.unwrap(), 1);
    assert_eq!(reports.len().await.unwrap(), 0);
    assert!(reports.dequeue().await.unwrap().is_none());
    assert_eq!(emails.key(), "emails");
}

#[tokio::test]
async fn test_undecodable_row_is_a_serialization_error() {
    let queue = queue().await;
    sqlx::query(
        "INSERT INTO queued_jobs (queue, job_id, body, enqueued_at) VALUES (?, ?, ?, ?)",
    )
    .bind("jobs")
    .bind("broken")
    .bind(b"not json".to_vec())
    .bind("2024-01-01T00:00:00Z")
    .execute(&queue.pool)
    .await
    .unwrap();

    let err = queue.dequeue().await.unwrap_err();
    assert!(matches!(err, workhorse::QueueError::Serialization(_)));
    // The row is consumed either way
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dequeue_never_duplicates() {
    let path = std::env::temp_dir().join(format!("workhorse-{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());
    let queue = Arc::new(SqliteQueue::new(&url, "jobs").await.unwrap());

    for i in 0..100 {
        queue.enqueue(&Job::new(format!("job-{i}"))).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            while let Some(job) = queue.dequeue().await.unwrap() {
                ids.push(job.id);
            }
            ids
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let unique: HashSet<_> = all.iter().cloned().collect();
    assert_eq!(all.len(), 100);
    assert_eq!(unique.len(), 100);

    queue.pool.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}
