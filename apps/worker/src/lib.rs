//! Queue-driven monitoring worker.
//!
//! Jobs are one-line service checks such as
//! `mail.example.com must run smtp otherwise 'mail is down'`. The worker
//! pops them from a queue, resolves the line to a protocol probe, retries it
//! and reports the outcome to every configured alerter.

pub mod alerts;
pub mod error;
pub mod factory;
pub mod protocols;
pub mod queue;
pub mod settings;
pub mod worker;

pub use alerts::{AlertFactory, Alerter};
pub use error::{AlertError, JobError, QueueError, SettingsError};
pub use factory::TestFactory;
pub use protocols::{ProtocolTest, TestRegistry, TestResult};
pub use queue::JobQueue;
pub use settings::Settings;
pub use worker::{JobOutcome, Worker};
