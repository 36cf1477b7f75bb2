use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

use super::JobQueue;
use crate::error::QueueError;

/// In-process FIFO queue.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<Vec<u8>>>,
    available: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an arbitrary payload, including ones that are not valid UTF-8.
    pub fn push_raw(&self, job: Vec<u8>) {
        self.lock().push_back(job);
        self.available.notify_one();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Vec<u8>>> {
        // The queue holds plain bytes; a panic elsewhere cannot leave it half-updated.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn fetch(&self, timeout: Duration) -> Result<Option<Vec<u8>>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.available.notified();
            let next = self.lock().pop_front();
            if let Some(job) = next {
                return Ok(Some(job));
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn add(&self, job: &str) -> Result<(), QueueError> {
        self.push_raw(job.as_bytes().to_vec());
        Ok(())
    }

    async fn size(&self) -> Result<usize, QueueError> {
        Ok(self.lock().len())
    }
}
