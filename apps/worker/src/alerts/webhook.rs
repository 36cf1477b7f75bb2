use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};

use super::{AlertContext, AlertEvent, AlertRecord, Alerter};
use crate::error::AlertError;

/// POSTs each event as JSON to an HTTP endpoint.
pub struct WebhookAlerter {
    context: AlertContext,
    client: Client,
}

impl WebhookAlerter {
    pub fn new(context: AlertContext) -> Result<Self, AlertError> {
        if url::Url::parse(&context.target).is_err() {
            return Err(AlertError::Transport(format!(
                "webhook target '{}' is not a URL",
                context.target
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(context.settings.timeout))
            .build()?;
        Ok(Self { context, client })
    }

    async fn post(&self, event: AlertEvent) -> Result<(), AlertError> {
        let record = AlertRecord::new(&self.context.test, event);
        let response = self
            .client
            .post(&self.context.target)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&record)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(AlertError::Transport(format!(
                "Webhook returned non-success status: {status}. Body: {body}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn raise(&self) -> Result<(), AlertError> {
        self.post(AlertEvent::Raise).await
    }

    async fn clear(&self) -> Result<(), AlertError> {
        self.post(AlertEvent::Clear).await
    }

    fn supports_duration(&self) -> bool {
        true
    }

    async fn duration(&self, ms: u64) -> Result<(), AlertError> {
        self.post(AlertEvent::Duration(ms)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{TestSummary, alert_id};
    use crate::settings::Settings;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn context(target: String) -> AlertContext {
        let line = "www must run http otherwise 'site down'";
        AlertContext {
            test: TestSummary {
                id: alert_id(line),
                line: line.into(),
                test_type: "http".into(),
                target: "www".into(),
                port: 80,
                inverted: false,
                error: None,
                message: Some("site down".into()),
            },
            target,
            settings: Arc::new(Settings { timeout: 5, ..Settings::default() }),
        }
    }

    #[test]
    fn test_rejects_non_url_target() {
        assert!(matches!(
            WebhookAlerter::new(context("not a url".into())),
            Err(AlertError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\noops")
                .await;
        });

        let alerter = WebhookAlerter::new(context(format!("http://127.0.0.1:{port}/hook"))).unwrap();
        let error = alerter.raise().await.unwrap_err();
        assert!(error.to_string().contains("500"), "{error}");
    }
}
