use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Current state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work travelling through the queue.
///
/// `max_retries` and `retry_delay` are optional: a job submitted without them
/// picks up the consuming worker's fallback values. An explicit zero
/// `max_retries` means no retries; a zero `retry_delay` is treated as unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Standard base64 on the wire
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
    pub status: JobStatus,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Base backoff in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job with a fresh id
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            payload: payload.into(),
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: None,
            retry_delay: None,
            last_error: None,
            executed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the base backoff in seconds
    pub fn with_retry_delay(mut self, seconds: u64) -> Self {
        self.retry_delay = Some(seconds);
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Success | JobStatus::Failed)
    }

    /// `pending -> running`, on dequeue.
    pub fn mark_running(&mut self) {
        let now = Utc::now();
        self.status = JobStatus::Running;
        self.executed_at = Some(now);
        self.updated_at = now;
    }

    /// `running -> success`. Clears the last error; the retry count is left alone.
    pub fn mark_succeeded(&mut self) {
        self.status = JobStatus::Success;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// `running -> failed`. Returns the post-increment retry count.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> u32 {
        self.status = JobStatus::Failed;
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
        self.retry_count
    }

    /// `failed -> pending`, right before the job is handed back to the queue.
    pub fn mark_requeued(&mut self) {
        self.status = JobStatus::Pending;
        self.updated_at = Utc::now();
    }
}

mod base64_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    // Producers encode an empty payload as `null`
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD.decode(encoded).map_err(de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
