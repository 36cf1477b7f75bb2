/// Job queue transports
///
/// Any transport that can pop one job with a bounded wait, push a job and
/// report its depth can feed the worker. Work distribution across several
/// worker processes relies on the transport's own atomic pop.
pub mod memory;
pub mod redis;

pub use memory::MemoryQueue;
pub use redis::RedisQueue;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::settings::Settings;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Pop the next job, waiting up to `timeout`; `None` when nothing arrived.
    ///
    /// Payloads are raw bytes, decoding them is the factory's concern.
    async fn fetch(&self, timeout: Duration) -> Result<Option<Vec<u8>>, QueueError>;

    async fn add(&self, job: &str) -> Result<(), QueueError>;

    /// Number of jobs waiting.
    async fn size(&self) -> Result<usize, QueueError>;
}

/// Build the transport selected by `queue_type`.
pub fn connect(settings: &Settings) -> Result<Arc<dyn JobQueue>, QueueError> {
    match settings.queue_type.as_str() {
        "redis" => Ok(Arc::new(RedisQueue::new(
            &settings.queue_address,
            &settings.queue_name,
            settings.poll_interval(),
        )?)),
        "memory" => Ok(Arc::new(MemoryQueue::new())),
        other => Err(QueueError::UnsupportedType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_selects_transport() {
        let settings = Settings { queue_type: "memory".into(), ..Settings::default() };
        assert!(connect(&settings).is_ok());

        let settings = Settings { queue_type: "beanstalk".into(), ..Settings::default() };
        assert!(matches!(connect(&settings), Err(QueueError::UnsupportedType(t)) if t == "beanstalk"));
    }
}
