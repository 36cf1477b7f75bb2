//! Generic TCP banner probe and its per-protocol specialisations.
//!
//! Most service checks are the same exchange with different defaults: connect,
//! optionally write a harmless line, read the first response and compare it
//! against the banner the service is expected to announce.

use std::time::Duration;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{ProtocolTest, TestBase, TestLine, TestRegistry, TestResult};
use crate::error::JobError;
use crate::settings::Settings;

/// Upper bound on how much of the banner is read.
const MAX_BANNER_BYTES: usize = 255;

/// Defaults for one family of TCP services.
#[derive(Debug)]
pub struct TcpProfile {
    pub keys: &'static [&'static str],
    pub port: Option<u16>,
    /// Line written before reading the banner.
    pub greeting: Option<&'static str>,
    pub banner: Option<&'static str>,
}

// Services that speak first (ssh, imap, rsync) are read without a greeting;
// only those that wait for the client are sent one.
pub const PROFILES: &[TcpProfile] = &[
    TcpProfile { keys: &["ftp"], port: Some(21), greeting: Some("QUIT"), banner: Some("^220") },
    TcpProfile { keys: &["ssh"], port: Some(22), greeting: None, banner: Some("^SSH-") },
    TcpProfile { keys: &["telnet"], port: Some(23), greeting: None, banner: None },
    TcpProfile { keys: &["smtp"], port: Some(25), greeting: Some("QUIT"), banner: Some("^220") },
    TcpProfile { keys: &["finger"], port: Some(79), greeting: None, banner: None },
    TcpProfile {
        keys: &["pop3", "pop"],
        port: Some(110),
        greeting: Some("QUIT"),
        banner: Some(r"^\+OK"),
    },
    TcpProfile { keys: &["imap"], port: Some(143), greeting: None, banner: Some(r"^\* OK") },
    TcpProfile { keys: &["ldap"], port: Some(389), greeting: None, banner: None },
    TcpProfile { keys: &["rsync"], port: Some(873), greeting: None, banner: Some("^@RSYNCD") },
    TcpProfile { keys: &["mysql"], port: Some(3306), greeting: None, banner: None },
    TcpProfile { keys: &["rdp"], port: Some(3389), greeting: None, banner: None },
    TcpProfile { keys: &["postgresql"], port: Some(5432), greeting: None, banner: None },
    TcpProfile { keys: &["jabber"], port: Some(5222), greeting: None, banner: None },
    TcpProfile { keys: &["redis"], port: Some(6379), greeting: Some("PING"), banner: Some(r"^\+PONG") },
    TcpProfile { keys: &["tcp"], port: None, greeting: None, banner: None },
];

pub fn register(registry: &mut TestRegistry) {
    for profile in PROFILES {
        registry.register(profile.keys, move |line, settings| {
            let test: Box<dyn ProtocolTest> = Box::new(TcpTest::new(line, profile, settings)?);
            Ok(test)
        });
    }
}

/// Expected banner, matched case-insensitively.
#[derive(Debug, Clone)]
pub enum Banner {
    Pattern(Regex),
    /// Fallback for text that is not a valid regex; holds the lowercased needle.
    Literal(String),
}

impl Banner {
    pub fn parse(text: &str) -> Self {
        match RegexBuilder::new(text).case_insensitive(true).build() {
            Ok(pattern) => Banner::Pattern(pattern),
            Err(_) => Banner::Literal(text.to_lowercase()),
        }
    }

    pub fn matches(&self, response: &str) -> bool {
        match self {
            Banner::Pattern(pattern) => pattern.is_match(response),
            Banner::Literal(needle) => response.to_lowercase().contains(needle.as_str()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Banner::Pattern(pattern) => pattern.as_str(),
            Banner::Literal(needle) => needle,
        }
    }
}

pub struct TcpTest {
    base: TestBase,
    host: String,
    greeting: Option<&'static str>,
    banner: Option<Banner>,
    timeout: Duration,
}

impl TcpTest {
    pub fn new(line: &TestLine, profile: &TcpProfile, settings: &Settings) -> Result<Self, JobError> {
        let host = host_of(line.target());
        if host.is_empty() {
            return Err(JobError::invalid_configuration(format!(
                "{} test has no host: {line}",
                line.keyword()
            )));
        }

        let port = line.port().or(profile.port).ok_or_else(|| {
            JobError::invalid_configuration(format!("{} test requires a port: {line}", line.keyword()))
        })?;

        let banner = line.option("banner").or(profile.banner).map(Banner::parse);

        Ok(Self {
            base: TestBase::new(line, line.target(), port),
            host,
            greeting: profile.greeting,
            banner,
            timeout: settings.timeout(),
        })
    }

    fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.base.port)
        } else {
            format!("{}:{}", self.host, self.base.port)
        }
    }

    async fn exchange(&self, address: &str) -> std::io::Result<Option<String>> {
        let mut stream = TcpStream::connect(address).await?;
        if self.banner.is_none() {
            return Ok(None);
        }
        let response = read_banner(&mut stream, self.greeting).await?;
        Ok(Some(response))
    }

    fn check_banner(&mut self, address: &str, response: &str) -> TestResult {
        let Some(banner) = &self.banner else {
            return self.base.pass();
        };

        if banner.matches(response) {
            self.base.pass()
        } else {
            let reason = format!(
                "{} banner mismatch on {address}: expected '{}', got '{response}'",
                self.base.line().keyword(),
                banner.as_str(),
            );
            self.base.fail(reason)
        }
    }
}

#[async_trait]
impl ProtocolTest for TcpTest {
    fn base(&self) -> &TestBase {
        &self.base
    }

    async fn run_test(&mut self) -> TestResult {
        self.base.reset_error();
        let address = self.address();
        debug!(address = %address, "Running TCP probe");

        match timeout(self.timeout, self.exchange(&address)).await {
            Ok(Ok(None)) => self.base.pass(),
            Ok(Ok(Some(response))) => self.check_banner(&address, &response),
            Ok(Err(e)) => self.base.fail(format!("connection to {address} failed: {e}")),
            Err(_) => self
                .base
                .fail(format!("timed out after {}s talking to {address}", self.timeout.as_secs())),
        }
    }
}

/// Write the optional greeting, then read the first response with line breaks removed.
pub async fn read_banner<S>(stream: &mut S, greeting: Option<&str>) -> std::io::Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(greeting) = greeting {
        stream.write_all(format!("{greeting}\r\n").as_bytes()).await?;
        stream.flush().await?;
    }

    let mut buf = [0u8; MAX_BANNER_BYTES];
    let read = stream.read(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf[..read]);
    Ok(response.replace(['\r', '\n'], ""))
}

/// Strip an optional scheme, path and port from a target.
fn host_of(target: &str) -> String {
    if let Ok(url) = url::Url::parse(target) {
        if let Some(host) = url.host_str() {
            return host.trim_start_matches('[').trim_end_matches(']').to_string();
        }
    }
    target.to_string()
}
