use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::job::Job;

use super::{decode, encode, Queue, Result};

/// Process-local queue. Jobs are stored serialized so that it behaves like
/// the networked transports (every pop yields a fresh copy).
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<Vec<u8>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, job: &Job) -> Result<()> {
        let bytes = encode(job)?;
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.push_back(bytes);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>> {
        let popped = {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            items.pop_front()
        };

        match popped {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<u64> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        Ok(items.len() as u64)
    }
}
