/// Alerters - notification sinks for test outcomes
///
/// This module is responsible for:
/// - The `Alerter` contract (raise / clear / optional duration)
/// - The name -> constructor `AlertFactory`
/// - The file, log, webhook and redis notifiers
pub mod file;
pub mod log;
pub mod redis;
pub mod registry;
pub mod webhook;

pub use registry::{AlertConstructor, AlertFactory};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AlertError;
use crate::protocols::ProtocolTest;
use crate::settings::Settings;

/// Detail used when an inverted test fails because the probe succeeded.
pub const INVERTED_SUCCESS: &str = "test succeeded, but this service must not be running";

/// What the dispatcher asks an alerter to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEvent {
    Raise,
    Clear,
    /// Wall-clock milliseconds spent on the whole retry sequence.
    Duration(u64),
}

impl AlertEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AlertEvent::Raise => "raise",
            AlertEvent::Clear => "clear",
            AlertEvent::Duration(_) => "duration",
        }
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owned snapshot of a test, handed to every alerter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    /// Stable identity: hex SHA-256 of the line.
    pub id: String,
    pub line: String,
    pub test_type: String,
    pub target: String,
    pub port: u16,
    pub inverted: bool,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl TestSummary {
    pub fn from_test(test: &dyn ProtocolTest) -> Self {
        let line = test.to_string();
        Self {
            id: alert_id(&line),
            test_type: test.test_type().to_string(),
            target: test.target().to_string(),
            port: test.port(),
            inverted: test.inverted(),
            error: test.error().map(str::to_string),
            message: test.line().message().map(str::to_string),
            line,
        }
    }
}

pub fn alert_id(line: &str) -> String {
    hex::encode(Sha256::digest(line.as_bytes()))
}

/// Everything a freshly built alerter needs.
#[derive(Debug, Clone)]
pub struct AlertContext {
    pub test: TestSummary,
    /// Destination resolved from settings for this alerter name.
    pub target: String,
    pub settings: Arc<Settings>,
}

/// Serialized form of one event, as written by the file, webhook and redis alerters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub event: String,
    #[serde(flatten)]
    pub test: TestSummary,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_ms: Option<u64>,
    pub timestamp: String,
}

impl AlertRecord {
    pub fn new(test: &TestSummary, event: AlertEvent) -> Self {
        let duration_ms = match event {
            AlertEvent::Duration(ms) => Some(ms),
            _ => None,
        };
        Self {
            event: event.name().to_string(),
            test: test.clone(),
            duration_ms,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// A notification sink.
///
/// A new instance is built for every event, so implementations keep no state
/// between calls.
#[async_trait]
pub trait Alerter: Send + Sync {
    fn name(&self) -> &str;

    async fn raise(&self) -> Result<(), AlertError>;

    async fn clear(&self) -> Result<(), AlertError>;

    /// Whether `duration` does anything; alerters without it are skipped.
    fn supports_duration(&self) -> bool {
        false
    }

    async fn duration(&self, _ms: u64) -> Result<(), AlertError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> TestSummary {
        TestSummary {
            id: alert_id("a must run ssh otherwise 'x'"),
            line: "a must run ssh otherwise 'x'".into(),
            test_type: "ssh".into(),
            target: "a".into(),
            port: 22,
            inverted: false,
            error: Some("connection refused".into()),
            message: Some("x".into()),
        }
    }

    #[test]
    fn test_alert_id_is_stable() {
        assert_eq!(alert_id("x"), alert_id("x"));
        assert_ne!(alert_id("x"), alert_id("y"));
        assert_eq!(alert_id("x").len(), 64);
    }

    #[test]
    fn test_record_serialization() {
        let record = AlertRecord::new(&summary(), AlertEvent::Duration(1500));
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "duration");
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["port"], 22);

        let record = AlertRecord::new(&summary(), AlertEvent::Raise);
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert!(json.get("duration_ms").is_none());
        assert_eq!(json["error"], "connection refused");
    }
}
