/// Protocol tests - the probes a job line resolves to
///
/// This module is responsible for:
/// - The `ProtocolTest` contract every probe satisfies
/// - Parsing a resolved job line into a `TestLine`
/// - The keyword -> constructor `TestRegistry`
/// - The concrete TCP banner, HTTP, DNS and ICMP probes
pub mod dns;
pub mod http;
pub mod line;
pub mod ping;
pub mod registry;
pub mod tcp;

pub use line::TestLine;
pub use registry::{TestConstructor, TestRegistry};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of one probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Passed,
    Failed,
}

impl TestResult {
    /// Swap the outcome, used for `must not run` lines.
    pub fn invert(self) -> Self {
        match self {
            TestResult::Passed => TestResult::Failed,
            TestResult::Failed => TestResult::Passed,
        }
    }

    pub fn is_passed(self) -> bool {
        self == TestResult::Passed
    }
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestResult::Passed => write!(f, "passed"),
            TestResult::Failed => write!(f, "failed"),
        }
    }
}

/// State shared by every probe: the resolved line, target, port and last error.
#[derive(Debug, Clone)]
pub struct TestBase {
    line: TestLine,
    target: String,
    port: u16,
    error: Option<String>,
}

impl TestBase {
    pub fn new(line: &TestLine, target: impl Into<String>, port: u16) -> Self {
        Self { line: line.clone(), target: target.into(), port, error: None }
    }

    pub fn line(&self) -> &TestLine {
        &self.line
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Called at the top of every `run_test`.
    pub fn reset_error(&mut self) {
        self.error = None;
    }

    pub fn pass(&mut self) -> TestResult {
        self.error = None;
        TestResult::Passed
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> TestResult {
        self.error = Some(reason.into());
        TestResult::Failed
    }
}

/// Contract every probe implements.
///
/// A probe is built from one resolved line and must reject missing mandatory
/// fields at construction time. `run_test` makes exactly one attempt; network
/// trouble of any kind is reported as [`TestResult::Failed`] with `error()` set,
/// never as a panic or an `Err`. Retrying is the dispatcher's job.
#[async_trait]
pub trait ProtocolTest: Send + Sync {
    fn base(&self) -> &TestBase;

    /// Perform a single probe attempt.
    async fn run_test(&mut self) -> TestResult;

    /// Reason for the most recent failure, `None` after a pass.
    fn error(&self) -> Option<&str> {
        self.base().error()
    }

    fn target(&self) -> &str {
        &self.base().target
    }

    fn port(&self) -> u16 {
        self.base().port
    }

    fn inverted(&self) -> bool {
        self.base().line.inverted()
    }

    /// Registry keyword this test was created under.
    fn test_type(&self) -> &str {
        self.base().line.keyword()
    }

    fn line(&self) -> &TestLine {
        self.base().line()
    }
}

/// Renders the original line, usable for re-creating the test.
impl fmt::Display for dyn ProtocolTest + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.line(), f)
    }
}
