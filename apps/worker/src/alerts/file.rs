use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::{AlertContext, AlertEvent, AlertRecord, Alerter};
use crate::error::AlertError;

/// Appends one JSON object per event to a local file.
pub struct FileAlerter {
    context: AlertContext,
    path: PathBuf,
}

impl FileAlerter {
    pub fn new(context: AlertContext) -> Self {
        let path = PathBuf::from(&context.target);
        Self { context, path }
    }

    async fn append(&self, event: AlertEvent) -> Result<(), AlertError> {
        let record = AlertRecord::new(&self.context.test, event);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Alerter for FileAlerter {
    fn name(&self) -> &str {
        "file"
    }

    async fn raise(&self) -> Result<(), AlertError> {
        self.append(AlertEvent::Raise).await
    }

    async fn clear(&self) -> Result<(), AlertError> {
        self.append(AlertEvent::Clear).await
    }

    fn supports_duration(&self) -> bool {
        true
    }

    async fn duration(&self, ms: u64) -> Result<(), AlertError> {
        self.append(AlertEvent::Duration(ms)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{TestSummary, alert_id};
    use crate::settings::Settings;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_appends_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/alerts.log");
        let line = "db.example.com must run postgresql otherwise 'db down'";
        let context = AlertContext {
            test: TestSummary {
                id: alert_id(line),
                line: line.into(),
                test_type: "postgresql".into(),
                target: "db.example.com".into(),
                port: 5432,
                inverted: false,
                error: Some("connection refused".into()),
                message: Some("db down".into()),
            },
            target: path.to_string_lossy().into_owned(),
            settings: Arc::new(Settings::default()),
        };

        FileAlerter::new(context.clone()).raise().await.unwrap();
        FileAlerter::new(context.clone()).duration(42).await.unwrap();
        FileAlerter::new(context).clear().await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let records: Vec<AlertRecord> =
            written.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        let events: Vec<&str> = records.iter().map(|r| r.event.as_str()).collect();
        assert_eq!(events, vec!["raise", "duration", "clear"]);
        assert_eq!(records[0].test.error.as_deref(), Some("connection refused"));
        assert_eq!(records[1].duration_ms, Some(42));
    }
}
