use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::JobQueue;
use crate::error::QueueError;

/// Slack on top of the BRPOP block time before the client gives up on a reply.
const RESPONSE_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// List-backed queue: `LPUSH` to add, `BRPOP` to fetch.
pub struct RedisQueue {
    client: redis::Client,
    key: String,
    config: redis::AsyncConnectionConfig,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisQueue {
    pub fn new(address: &str, key: &str, poll_interval: Duration) -> Result<Self, QueueError> {
        let client = redis::Client::open(address)?;
        let config = redis::AsyncConnectionConfig::new()
            .set_response_timeout(Some(poll_interval + RESPONSE_TIMEOUT_GRACE));
        Ok(Self { client, key: key.to_string(), config, connection: Mutex::new(None) })
    }

    /// Reuse the cached connection, establishing it on first use.
    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        debug!(key = %self.key, "Connecting to redis queue");
        let conn = self.client.get_multiplexed_async_connection_with_config(&self.config).await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Forget a connection that produced an I/O error so the next call reconnects.
    async fn reset_on_error<T>(&self, result: redis::RedisResult<T>) -> Result<T, QueueError> {
        let broken = match &result {
            Err(e) if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() => {
                warn!(error = %e, "Dropping redis queue connection");
                true
            }
            _ => false,
        };
        if broken {
            self.connection.lock().await.take();
        }
        Ok(result?)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn fetch(&self, timeout: Duration) -> Result<Option<Vec<u8>>, QueueError> {
        let mut conn = self.connection().await?;
        let result = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(timeout.as_secs().max(1))
            .query_async::<Option<(String, Vec<u8>)>>(&mut conn)
            .await;
        let popped = self.reset_on_error(result).await?;
        Ok(popped.map(|(_key, job)| job))
    }

    async fn add(&self, job: &str) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let result = redis::cmd("LPUSH").arg(&self.key).arg(job).query_async::<i64>(&mut conn).await;
        self.reset_on_error(result).await?;
        Ok(())
    }

    async fn size(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;
        let result = redis::cmd("LLEN").arg(&self.key).query_async::<usize>(&mut conn).await;
        self.reset_on_error(result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_address() {
        assert!(matches!(
            RedisQueue::new("definitely not redis", "jobs", Duration::from_secs(1)),
            Err(QueueError::Redis(_))
        ));
    }
}
