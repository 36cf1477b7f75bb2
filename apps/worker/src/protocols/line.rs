//! Parsing of a single resolved job line.
//!
//! ```text
//! <target> must [not] run <type> [on [port] <n>] [with <name> <value> ...] otherwise '<message>'
//! ```
//!
//! Macros have already been expanded by the time a line gets here, so a line
//! always names exactly one target.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::JobError;

static MUST_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+must\s+(not\s+)?run\s+([A-Za-z0-9_-]+)").expect("valid regex")
});
static OTHERWISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+otherwise\s+'(.*)'\s*$").expect("valid regex"));
static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'[^']*'").expect("valid regex"));
static PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\son\s+(?:port\s+)?(\d+)\b").expect("valid regex"));
static OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:with|and)\s+([a-z_]+)\s+(?:'([^']*)'|([^\s']+))").expect("valid regex")
});

/// A job line broken into the fields every probe understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestLine {
    raw: String,
    target: String,
    keyword: String,
    inverted: bool,
    port: Option<u16>,
    message: Option<String>,
    options: BTreeMap<String, String>,
}

impl TestLine {
    pub fn parse(line: &str) -> Result<Self, JobError> {
        let raw = line.trim();
        if raw.is_empty() {
            return Err(JobError::invalid_job("empty test line"));
        }

        let captures = MUST_RUN
            .captures(raw)
            .ok_or_else(|| JobError::invalid_job(format!("no 'must run <type>' clause in: {raw}")))?;

        let target = captures[1].to_string();
        let inverted = captures.get(2).is_some();
        let keyword = captures[3].to_string();

        // Everything before `otherwise` carries the options; the message is free text.
        let (head, message) = match OTHERWISE.captures(raw) {
            Some(otherwise) => {
                let start = otherwise.get(0).map_or(raw.len(), |m| m.start());
                (&raw[..start], Some(otherwise[1].to_string()))
            }
            None => (raw, None),
        };

        let unquoted = QUOTED.replace_all(head, "''");
        let port = match PORT.captures(&unquoted) {
            Some(port) => Some(
                port[1]
                    .parse::<u16>()
                    .ok()
                    .filter(|n| *n != 0)
                    .ok_or_else(|| {
                        JobError::invalid_configuration(format!("port out of range: {}", &port[1]))
                    })?,
            ),
            None => None,
        };

        let options = OPTION
            .captures_iter(head)
            .filter_map(|option| {
                let value = option.get(2).or_else(|| option.get(3))?;
                Some((option[1].to_string(), value.as_str().to_string()))
            })
            .collect();

        Ok(Self { raw: raw.to_string(), target, keyword, inverted, port, message, options })
    }

    /// The host, address or URL under test, exactly as written.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    /// Port given with `on <n>`, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Text of the `otherwise '...'` clause.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for TestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_line() {
        let line = TestLine::parse("mail.example.com must run smtp otherwise 'mail down'").unwrap();
        assert_eq!(line.target(), "mail.example.com");
        assert_eq!(line.keyword(), "smtp");
        assert!(!line.inverted());
        assert_eq!(line.port(), None);
        assert_eq!(line.message(), Some("mail down"));
    }

    #[test]
    fn test_parse_inverted_with_port() {
        let line =
            TestLine::parse("relay.example.com must not run smtp on port 2525 otherwise 'open relay'")
                .unwrap();
        assert!(line.inverted());
        assert_eq!(line.port(), Some(2525));

        let line = TestLine::parse("db must run tcp on 5432 otherwise 'x'").unwrap();
        assert_eq!(line.port(), Some(5432));
    }

    #[test]
    fn test_parse_options() {
        let line = TestLine::parse(
            "http://example.com/ must run http with status 301 with content 'moved on 80' \
             otherwise 'no redirect on 8080'",
        )
        .unwrap();
        assert_eq!(line.option("status"), Some("301"));
        assert_eq!(line.option("content"), Some("moved on 80"));
        // Text inside quotes never counts as a port.
        assert_eq!(line.port(), None);
        assert_eq!(line.message(), Some("no redirect on 8080"));
    }

    #[test]
    fn test_parse_rejects_missing_clause() {
        assert!(matches!(TestLine::parse(""), Err(JobError::InvalidJob(_))));
        assert!(matches!(TestLine::parse("   "), Err(JobError::InvalidJob(_))));
        assert!(matches!(TestLine::parse("example.com is up"), Err(JobError::InvalidJob(_))));
    }

    #[test]
    fn test_parse_rejects_oversized_port() {
        let result = TestLine::parse("host must run tcp on 70000 otherwise 'x'");
        assert!(matches!(result, Err(JobError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_parse_rejects_port_zero() {
        let result = TestLine::parse("host must run tcp on port 0 otherwise 'x'");
        assert!(matches!(result, Err(JobError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_message_keeps_apostrophes() {
        let line = TestLine::parse("h must run ssh otherwise 'can't connect'").unwrap();
        assert_eq!(line.message(), Some("can't connect"));

        let line = TestLine::parse("h must run ssh otherwise 'db's replica isn't up'  ").unwrap();
        assert_eq!(line.message(), Some("db's replica isn't up"));
    }

    #[test]
    fn test_display_round_trips() {
        let text = "  host must run ssh otherwise 'x'  ";
        let line = TestLine::parse(text).unwrap();
        assert_eq!(line.to_string(), text.trim());
        assert_eq!(TestLine::parse(&line.to_string()).unwrap(), line);
    }
}
