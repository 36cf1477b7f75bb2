/// Worker - pulls jobs off the queue and drives each probe through its retry sequence
///
/// This module is responsible for:
/// - Fetching and decoding one job at a time
/// - Retrying a probe until it passes or the attempt budget runs out
/// - Fanning raise / clear / duration out to every configured alerter
/// - Keeping one bad job or misbehaving probe from stopping the loop
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::alerts::{AlertContext, AlertEvent, AlertFactory, INVERTED_SUCCESS, TestSummary};
use crate::error::JobError;
use crate::factory::TestFactory;
use crate::protocols::{ProtocolTest, TestResult};
use crate::queue::JobQueue;
use crate::settings::Settings;

/// How the processing of one queue fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Nothing arrived within the poll interval.
    Idle,
    /// The queue transport returned an error.
    QueueUnavailable,
    /// The job could not be decoded or built into a test.
    Dropped,
    Passed,
    Failed,
    /// The probe or an alerter panicked.
    Aborted,
}

impl JobOutcome {
    pub fn is_success(self) -> bool {
        self == JobOutcome::Passed
    }
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    factory: TestFactory,
    alerters: Arc<AlertFactory>,
    settings: Arc<Settings>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        factory: TestFactory,
        alerters: Arc<AlertFactory>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { queue, factory, alerters, settings }
    }

    /// Process jobs until the future is dropped.
    pub async fn run(&self) {
        info!(
            retries = self.settings.retries,
            alerter = %self.settings.alerter,
            "Worker started"
        );
        loop {
            if self.process_single_job().await == JobOutcome::QueueUnavailable {
                sleep(self.settings.poll_interval()).await;
            }
        }
    }

    /// Process jobs until one does not pass; returns how many passed.
    pub async fn process_until_fail(&self) -> usize {
        let mut passed = 0;
        loop {
            let outcome = self.process_single_job().await;
            if !outcome.is_success() {
                info!(passed, ?outcome, "Stopping after first unsuccessful job");
                return passed;
            }
            passed += 1;
        }
    }

    /// Fetch one job and run it to completion.
    pub async fn process_single_job(&self) -> JobOutcome {
        let payload = match self.queue.fetch(self.settings.poll_interval()).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("No job within poll interval");
                return JobOutcome::Idle;
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch job");
                return JobOutcome::QueueUnavailable;
            }
        };

        let job = std::str::from_utf8(&payload).ok();
        if job.is_none() {
            let e = JobError::invalid_job("job payload is not valid UTF-8");
            warn!(error = %e, bytes = payload.len(), "Dropping job");
            return JobOutcome::Dropped;
        }

        let mut test = match self.factory.create(job) {
            Ok(test) => test,
            Err(e) => {
                warn!(error = %e, job = job.unwrap_or_default(), "Dropping job");
                return JobOutcome::Dropped;
            }
        };

        let span = info_span!(
            "test",
            id = %Uuid::new_v4(),
            test_type = test.test_type(),
            address = test.target()
        );
        let processing = AssertUnwindSafe(self.run_with_retries(test.as_mut())).catch_unwind();
        match processing.instrument(span).await {
            Ok(result) if result.is_passed() => JobOutcome::Passed,
            Ok(_) => JobOutcome::Failed,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(line = %test.line(), %reason, "Test processing panicked");
                JobOutcome::Aborted
            }
        }
    }

    async fn run_with_retries(&self, test: &mut dyn ProtocolTest) -> TestResult {
        let retries = self.settings.retries;
        let retry_delay = self.settings.retry_delay();
        let start = Instant::now();
        let mut result = TestResult::Failed;

        for count in 1..=retries {
            result = test.run_test().await;
            if test.inverted() {
                result = result.invert();
            }

            if result.is_passed() {
                debug!(attempt = count, "Test passed");
                self.notify(test, AlertEvent::Clear).await;
                break;
            }

            debug!(attempt = count, retries, error = test.error(), "Test failed");
            if !retry_delay.is_zero() && count < retries {
                sleep(retry_delay).await;
            }
        }

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.notify(test, AlertEvent::Duration(duration_ms)).await;

        if result.is_passed() {
            info!(duration_ms, "Test passed");
        } else {
            warn!(duration_ms, error = test.error(), "Test failed, raising alert");
            self.notify(test, AlertEvent::Raise).await;
        }
        result
    }

    /// Deliver `event` to a fresh instance of every configured alerter, in order.
    async fn notify(&self, test: &dyn ProtocolTest, event: AlertEvent) {
        let mut summary = TestSummary::from_test(test);
        if event == AlertEvent::Raise && summary.inverted && summary.error.is_none() {
            summary.error = Some(INVERTED_SUCCESS.to_string());
        }

        for name in self.settings.alerters() {
            let context = AlertContext {
                test: summary.clone(),
                target: self.settings.alerter_target(name),
                settings: Arc::clone(&self.settings),
            };
            let alerter = match self.alerters.create(name, context) {
                Ok(alerter) => alerter,
                Err(e) => {
                    error!(alerter = name, %event, error = %e, "Failed to build alerter");
                    continue;
                }
            };

            let delivered = match event {
                AlertEvent::Raise => alerter.raise().await,
                AlertEvent::Clear => alerter.clear().await,
                AlertEvent::Duration(ms) if alerter.supports_duration() => alerter.duration(ms).await,
                AlertEvent::Duration(_) => continue,
            };
            if let Err(e) = delivered {
                error!(alerter = name, %event, error = %e, "Alerter failed");
            }
        }
    }
}
