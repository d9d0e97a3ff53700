use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::job::Job;

use super::{decode, encode, Queue, Result};

/// Redis list transport: `LPUSH` on enqueue, `RPOP` on dequeue. The pop is a
/// single server-side command, so two workers can never receive the same job.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    key: String,
}

impl RedisQueue {
    /// Connect using a `redis://` URL.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        let key = key.into();
        debug!(key = %key, "Connected to Redis queue");
        Ok(Self { conn, key })
    }

    pub fn from_connection(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Build a `redis://` URL from the `host:port` / password / db triple used by
/// deployments. Values that already are URLs are passed through untouched.
pub fn redis_url(addr: &str, password: Option<&str>, db: i64) -> String {
    if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        return addr.to_string();
    }
    match password.filter(|p| !p.is_empty()) {
        Some(password) => format!("redis://:{password}@{addr}/{db}"),
        None => format!("redis://{addr}/{db}"),
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn enqueue(&self, job: &Job) -> Result<()> {
        let bytes = encode(job)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(&self.key, bytes).await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.rpop(&self.key, None).await?;

        match raw {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(&self.key).await?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_from_plain_address() {
        assert_eq!(redis_url("localhost:6379", None, 0), "redis://localhost:6379/0");
    }

    #[test]
    fn url_with_password_and_db() {
        assert_eq!(
            redis_url("cache:6380", Some("s3cret"), 2),
            "redis://:s3cret@cache:6380/2"
        );
    }

    #[test]
    fn empty_password_is_ignored() {
        assert_eq!(redis_url("cache:6380", Some(""), 1), "redis://cache:6380/1");
    }

    #[test]
    fn urls_pass_through() {
        assert_eq!(
            redis_url("redis://user:pw@host:1/3", Some("ignored"), 0),
            "redis://user:pw@host:1/3"
        );
    }
}
