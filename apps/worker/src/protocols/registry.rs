use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{ProtocolTest, TestLine, dns, http, ping, tcp};
use crate::error::JobError;
use crate::settings::Settings;

/// Builds a probe from a resolved line.
pub type TestConstructor =
    Arc<dyn Fn(&TestLine, &Settings) -> Result<Box<dyn ProtocolTest>, JobError> + Send + Sync>;

/// Maps test-type keywords to probe constructors.
///
/// Built once at startup and handed to the factory by reference; nothing is
/// registered behind the caller's back.
#[derive(Clone, Default)]
pub struct TestRegistry {
    constructors: BTreeMap<String, TestConstructor>,
}

impl TestRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every probe shipped with the worker.
    pub fn with_builtin_tests() -> Self {
        let mut registry = Self::new();
        tcp::register(&mut registry);
        http::register(&mut registry);
        dns::register(&mut registry);
        ping::register(&mut registry);
        registry
    }

    /// Register `constructor` under each of `keys`, replacing earlier entries.
    pub fn register<F>(&mut self, keys: &[&str], constructor: F)
    where
        F: Fn(&TestLine, &Settings) -> Result<Box<dyn ProtocolTest>, JobError>
            + Send
            + Sync
            + 'static,
    {
        let constructor: TestConstructor = Arc::new(constructor);
        for key in keys {
            debug!(test_type = key, "Registered protocol test");
            self.constructors.insert((*key).to_string(), Arc::clone(&constructor));
        }
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.constructors.contains_key(keyword)
    }

    /// Construct the probe for `line`, keyed on its test-type keyword.
    pub fn create(
        &self,
        line: &TestLine,
        settings: &Settings,
    ) -> Result<Box<dyn ProtocolTest>, JobError> {
        let constructor = self
            .constructors
            .get(line.keyword())
            .ok_or_else(|| JobError::UnknownTestType(line.keyword().to_string()))?;
        constructor(line, settings)
    }

    /// Registered keywords, sorted.
    pub fn known_tests(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRegistry").field("tests", &self.known_tests()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_keywords() {
        let registry = TestRegistry::with_builtin_tests();
        for keyword in [
            "ftp", "ssh", "telnet", "smtp", "pop", "pop3", "imap", "rsync", "redis", "rdp", "tcp",
            "http", "https", "dns", "ping",
        ] {
            assert!(registry.contains(keyword), "missing {keyword}");
        }
        assert!(!registry.contains("HTTP"));
    }

    #[test]
    fn test_unknown_keyword() {
        let registry = TestRegistry::with_builtin_tests();
        let line = TestLine::parse("host must run carrierpigeon otherwise 'x'").unwrap();
        let result = registry.create(&line, &Settings::default());
        assert!(matches!(result, Err(JobError::UnknownTestType(kw)) if kw == "carrierpigeon"));
    }

    #[test]
    fn test_empty_registry_knows_nothing() {
        let registry = TestRegistry::new();
        assert!(registry.known_tests().is_empty());
    }
}
