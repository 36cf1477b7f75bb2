//! Alert state and history kept in Redis.
//!
//! Keys written:
//! - `warden:alert:<id>`    latest raise/clear record for the test
//! - `warden:history`       most recent raise/clear records across all tests
//! - `warden:duration:<id>` most recent retry-sequence durations in ms

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use super::{AlertContext, AlertEvent, AlertRecord, Alerter};
use crate::error::AlertError;

const KEY_PREFIX: &str = "warden";
const HISTORY_LIMIT: isize = 1000;
const DURATION_LIMIT: isize = 100;

pub struct RedisAlerter {
    context: AlertContext,
    client: redis::Client,
}

impl RedisAlerter {
    pub fn new(context: AlertContext) -> Result<Self, AlertError> {
        let client = redis::Client::open(context.target.as_str())?;
        Ok(Self { context, client })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, AlertError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn state_key(&self) -> String {
        format!("{KEY_PREFIX}:alert:{}", self.context.test.id)
    }

    fn duration_key(&self) -> String {
        format!("{KEY_PREFIX}:duration:{}", self.context.test.id)
    }

    async fn record_state(&self, event: AlertEvent) -> Result<(), AlertError> {
        let record = serde_json::to_string(&AlertRecord::new(&self.context.test, event))?;
        let history = format!("{KEY_PREFIX}:history");
        let mut conn = self.connection().await?;

        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.state_key())
            .arg(&record)
            .ignore()
            .cmd("LPUSH")
            .arg(&history)
            .arg(&record)
            .ignore()
            .cmd("LTRIM")
            .arg(&history)
            .arg(0)
            .arg(HISTORY_LIMIT - 1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Alerter for RedisAlerter {
    fn name(&self) -> &str {
        "redis"
    }

    async fn raise(&self) -> Result<(), AlertError> {
        self.record_state(AlertEvent::Raise).await
    }

    async fn clear(&self) -> Result<(), AlertError> {
        self.record_state(AlertEvent::Clear).await
    }

    fn supports_duration(&self) -> bool {
        true
    }

    async fn duration(&self, ms: u64) -> Result<(), AlertError> {
        let key = self.duration_key();
        let mut conn = self.connection().await?;

        redis::pipe()
            .cmd("LPUSH")
            .arg(&key)
            .arg(ms)
            .ignore()
            .cmd("LTRIM")
            .arg(&key)
            .arg(0)
            .arg(DURATION_LIMIT - 1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{TestSummary, alert_id};
    use crate::settings::Settings;
    use std::sync::Arc;

    fn context(target: &str) -> AlertContext {
        let line = "cache must run redis otherwise 'cache down'";
        AlertContext {
            test: TestSummary {
                id: alert_id(line),
                line: line.into(),
                test_type: "redis".into(),
                target: "cache".into(),
                port: 6379,
                inverted: false,
                error: None,
                message: None,
            },
            target: target.into(),
            settings: Arc::new(Settings::default()),
        }
    }

    #[test]
    fn test_keys_use_alert_id() {
        let alerter = RedisAlerter::new(context("redis://127.0.0.1:6379")).unwrap();
        let id = alert_id("cache must run redis otherwise 'cache down'");
        assert_eq!(alerter.state_key(), format!("warden:alert:{id}"));
        assert_eq!(alerter.duration_key(), format!("warden:duration:{id}"));
    }

    #[test]
    fn test_invalid_target() {
        assert!(matches!(RedisAlerter::new(context("not-a-redis-url")), Err(AlertError::Redis(_))));
    }
}
