use std::io::Error as IoError;

use thiserror::Error;

/// Reasons a queued job never reaches the retry loop.
///
/// All of these are logged and the job is dropped; none of them stops the worker.
#[derive(Debug, Error)]
pub enum JobError {
    /// Missing, empty, non-UTF-8 or wrongly shaped payload.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Unknown test type: {0}")]
    UnknownTestType(String),

    /// The line resolved to a known test type but lacks a field that type needs.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl JobError {
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

/// Failures raised while building or invoking a notifier.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Unknown alerter: {0}")]
    UnknownAlerter(String),

    #[error("Alert transport failed: {0}")]
    Transport(String),

    #[error("{0:#}")]
    Io(#[from] IoError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Unsupported queue type: {0}")]
    UnsupportedType(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    ReadFailed(#[source] IoError),

    #[error("Failed to write settings file: {0}")]
    WriteFailed(#[source] IoError),

    #[error("Failed to parse settings: {0}")]
    ParseFailed(String),

    #[error("No configuration directory available ($XDG_CONFIG_HOME and $HOME are unset)")]
    ConfigPathUnavailable,

    #[error("Invalid setting: {0}")]
    Invalid(String),
}
