//! Turns a raw queue payload into a constructed protocol test.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::JobError;
use crate::protocols::{ProtocolTest, TestLine, TestRegistry};
use crate::settings::Settings;

/// JSON job shape: `{"line": "<test line>"}`; other fields are ignored.
#[derive(Debug, Deserialize)]
struct JsonJob {
    line: String,
}

/// Decodes jobs and resolves their test type through a [`TestRegistry`].
#[derive(Debug, Clone)]
pub struct TestFactory {
    registry: Arc<TestRegistry>,
    settings: Arc<Settings>,
}

impl TestFactory {
    pub fn new(registry: Arc<TestRegistry>, settings: Arc<Settings>) -> Self {
        Self { registry, settings }
    }

    /// Build the test a job describes.
    ///
    /// `None` stands for a job the transport could not hand over as text.
    pub fn create(&self, job: Option<&str>) -> Result<Box<dyn ProtocolTest>, JobError> {
        let job = job.ok_or_else(|| JobError::invalid_job("job payload is missing"))?;
        let line = decode_job(job)?;
        let line = TestLine::parse(&line)?;
        self.registry.create(&line, &self.settings)
    }

    /// Keywords this factory can build, for diagnostics.
    pub fn known_tests(&self) -> Vec<&str> {
        self.registry.known_tests()
    }
}

/// Extract the test line from a plain or JSON-wrapped job.
pub fn decode_job(job: &str) -> Result<String, JobError> {
    let trimmed = job.trim();
    if trimmed.is_empty() {
        return Err(JobError::invalid_job("job is empty"));
    }

    if trimmed.starts_with('{') {
        let json: JsonJob = serde_json::from_str(trimmed)
            .map_err(|e| JobError::invalid_job(format!("malformed JSON job: {e}")))?;
        return Ok(json.line);
    }

    Ok(trimmed.to_string())
}
