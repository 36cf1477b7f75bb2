use async_trait::async_trait;
use tracing::{info, warn};

use super::{AlertContext, Alerter};
use crate::error::AlertError;

/// Reports raise/clear through the worker's own log output.
pub struct LogAlerter {
    context: AlertContext,
}

impl LogAlerter {
    pub fn new(context: AlertContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Alerter for LogAlerter {
    fn name(&self) -> &str {
        "log"
    }

    async fn raise(&self) -> Result<(), AlertError> {
        let test = &self.context.test;
        warn!(
            alert_id = %test.id,
            test = %test.line,
            error = test.error.as_deref().unwrap_or("unknown"),
            "ALERT RAISED: {}",
            test.message.as_deref().unwrap_or(&test.line)
        );
        Ok(())
    }

    async fn clear(&self) -> Result<(), AlertError> {
        let test = &self.context.test;
        info!(alert_id = %test.id, test = %test.line, "Alert cleared");
        Ok(())
    }
}
