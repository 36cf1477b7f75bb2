use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use super::{ProtocolTest, TestBase, TestLine, TestRegistry, TestResult};
use crate::error::JobError;
use crate::settings::Settings;

pub fn register(registry: &mut TestRegistry) {
    registry.register(&["http", "https"], |line, settings| {
        let test: Box<dyn ProtocolTest> = Box::new(HttpTest::new(line, settings)?);
        Ok(test)
    });
}

/// HTTP/HTTPS GET probe.
///
/// Passes when the response status equals `with status N` (200 by default) and,
/// when `with content '...'` is given, the body contains that text. Redirects
/// are reported as-is rather than followed.
pub struct HttpTest {
    base: TestBase,
    url: Url,
    expected_status: u16,
    content: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTest {
    pub fn new(line: &TestLine, settings: &Settings) -> Result<Self, JobError> {
        let mut url = Url::parse(line.target()).map_err(|e| {
            JobError::invalid_configuration(format!("{} is not a valid URL: {e}", line.target()))
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(JobError::invalid_configuration(format!(
                    "unsupported scheme '{other}' for {} test",
                    line.keyword()
                )));
            }
        }

        if url.host_str().is_none() {
            return Err(JobError::invalid_configuration(format!("URL has no host: {url}")));
        }

        if let Some(port) = line.port() {
            if url.port().is_none() {
                url.set_port(Some(port)).map_err(|_| {
                    JobError::invalid_configuration(format!("cannot set port on {url}"))
                })?;
            }
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| JobError::invalid_configuration(format!("URL has no port: {url}")))?;

        let expected_status = match line.option("status") {
            Some(status) => status.parse::<u16>().map_err(|_| {
                JobError::invalid_configuration(format!("invalid expected status '{status}'"))
            })?,
            None => 200,
        };

        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .redirect(Policy::none())
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JobError::invalid_configuration(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            base: TestBase::new(line, line.target(), port),
            url,
            expected_status,
            content: line.option("content").map(str::to_string),
            client,
            timeout: settings.timeout(),
        })
    }
}

#[async_trait]
impl ProtocolTest for HttpTest {
    fn base(&self) -> &TestBase {
        &self.base
    }

    async fn run_test(&mut self) -> TestResult {
        self.base.reset_error();
        debug!(url = %self.url, "Running HTTP probe");

        let response = match self.client.get(self.url.clone()).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return self.base.fail(format!(
                    "request to {} timed out after {}s",
                    self.url,
                    self.timeout.as_secs()
                ));
            }
            Err(e) => return self.base.fail(format!("request to {} failed: {e}", self.url)),
        };

        let status = response.status().as_u16();
        if status != self.expected_status {
            return self.base.fail(format!(
                "status code was {status}, expected {} for {}",
                self.expected_status, self.url
            ));
        }

        let Some(content) = self.content.clone() else {
            return self.base.pass();
        };

        match response.text().await {
            Ok(body) if body.contains(&content) => self.base.pass(),
            Ok(_) => self.base.fail(format!("body of {} does not contain '{content}'", self.url)),
            Err(e) => self.base.fail(format!("failed to read body of {}: {e}", self.url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response.
    async fn http_server(status_line: &'static str, body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        port
    }

    fn http_test(line: &str) -> HttpTest {
        let line = TestLine::parse(line).unwrap();
        HttpTest::new(&line, &Settings { timeout: 5, ..Settings::default() }).unwrap()
    }

    #[test]
    fn test_ports_from_url() {
        assert_eq!(http_test("http://example.com/ must run http otherwise 'x'").port(), 80);
        assert_eq!(http_test("https://example.com/ must run https otherwise 'x'").port(), 443);
        assert_eq!(http_test("http://example.com:8080/ must run http otherwise 'x'").port(), 8080);
        assert_eq!(http_test("http://example.com/ must run http on 81 otherwise 'x'").port(), 81);
    }

    #[test]
    fn test_rejects_bare_host() {
        let line = TestLine::parse("example.com must run http otherwise 'x'").unwrap();
        assert!(matches!(
            HttpTest::new(&line, &Settings::default()),
            Err(JobError::InvalidConfiguration(_))
        ));

        let line = TestLine::parse("ftp://example.com must run http otherwise 'x'").unwrap();
        assert!(matches!(
            HttpTest::new(&line, &Settings::default()),
            Err(JobError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_status_and_content() {
        let port = http_server("200 OK", "all systems nominal").await;
        let mut test = http_test(&format!(
            "http://127.0.0.1:{port}/ must run http with content 'nominal' otherwise 'x'"
        ));
        assert_eq!(test.run_test().await, TestResult::Passed);
        assert_eq!(test.error(), None);
    }

    #[tokio::test]
    async fn test_unexpected_status() {
        let port = http_server("503 Service Unavailable", "").await;
        let mut test = http_test(&format!("http://127.0.0.1:{port}/ must run http otherwise 'x'"));
        assert_eq!(test.run_test().await, TestResult::Failed);
        assert!(test.error().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_redirect_not_followed() {
        let port = http_server("301 Moved Permanently", "").await;
        let mut test = http_test(&format!(
            "http://127.0.0.1:{port}/ must run http with status 301 otherwise 'x'"
        ));
        assert_eq!(test.run_test().await, TestResult::Passed);
    }
}
