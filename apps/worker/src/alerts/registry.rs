use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{AlertContext, Alerter, file, log, redis, webhook};
use crate::error::AlertError;

/// Builds an alerter for one event.
pub type AlertConstructor =
    Arc<dyn Fn(AlertContext) -> Result<Box<dyn Alerter>, AlertError> + Send + Sync>;

/// Maps alerter names to constructors.
#[derive(Clone, Default)]
pub struct AlertFactory {
    constructors: BTreeMap<String, AlertConstructor>,
}

impl AlertFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory holding every alerter shipped with the worker.
    pub fn with_builtin_alerters() -> Self {
        let mut factory = Self::new();
        factory.register("file", |ctx| Ok(Box::new(file::FileAlerter::new(ctx)) as Box<dyn Alerter>));
        factory.register("log", |ctx| Ok(Box::new(log::LogAlerter::new(ctx)) as Box<dyn Alerter>));
        factory.register("webhook", |ctx| {
            Ok(Box::new(webhook::WebhookAlerter::new(ctx)?) as Box<dyn Alerter>)
        });
        factory.register("redis", |ctx| {
            Ok(Box::new(redis::RedisAlerter::new(ctx)?) as Box<dyn Alerter>)
        });
        factory
    }

    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(AlertContext) -> Result<Box<dyn Alerter>, AlertError> + Send + Sync + 'static,
    {
        debug!(alerter = name, "Registered alerter");
        self.constructors.insert(name.to_string(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Build a fresh alerter named `name` for `context`.
    pub fn create(&self, name: &str, context: AlertContext) -> Result<Box<dyn Alerter>, AlertError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| AlertError::UnknownAlerter(name.to_string()))?;
        constructor(context)
    }

    pub fn known_alerters(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for AlertFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertFactory").field("alerters", &self.known_alerters()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{TestSummary, alert_id};
    use crate::settings::Settings;

    fn context() -> AlertContext {
        AlertContext {
            test: TestSummary {
                id: alert_id("a must run ssh otherwise 'x'"),
                line: "a must run ssh otherwise 'x'".into(),
                test_type: "ssh".into(),
                target: "a".into(),
                port: 22,
                inverted: false,
                error: None,
                message: None,
            },
            target: String::new(),
            settings: Arc::new(Settings::default()),
        }
    }

    #[test]
    fn test_builtin_alerters() {
        let factory = AlertFactory::with_builtin_alerters();
        assert_eq!(factory.known_alerters(), vec!["file", "log", "redis", "webhook"]);
        let alerter = factory.create("log", context()).unwrap();
        assert_eq!(alerter.name(), "log");
        assert!(!alerter.supports_duration());
    }

    #[test]
    fn test_unknown_alerter() {
        let factory = AlertFactory::with_builtin_alerters();
        assert!(factory.contains("webhook"));
        assert!(!factory.contains("mauve"));
        assert!(matches!(
            factory.create("mauve", context()),
            Err(AlertError::UnknownAlerter(name)) if name == "mauve"
        ));
    }
}
