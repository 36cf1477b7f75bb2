//! Job decoding through the public factory with the built-in probes.

use std::sync::Arc;

use warden::protocols::tcp::PROFILES;
use warden::{JobError, ProtocolTest, Settings, TestFactory, TestRegistry};

fn factory() -> TestFactory {
    TestFactory::new(Arc::new(TestRegistry::with_builtin_tests()), Arc::new(Settings::default()))
}

fn create(line: &str) -> Box<dyn ProtocolTest> {
    factory().create(Some(line)).unwrap_or_else(|e| panic!("{line}: {e}"))
}

#[test]
fn test_type_matches_keyword_for_every_builtin() {
    let lines = [
        ("ping", "gateway.example.com must run ping otherwise 'gateway unreachable'"),
        ("http", "http://www.example.com/ must run http otherwise 'site down'"),
        ("https", "https://www.example.com/ must run https otherwise 'site down'"),
        (
            "dns",
            "ns1.example.com must run dns for 'www.example.com' resolving A as '192.0.2.1' otherwise 'dns'",
        ),
        ("tcp", "db.example.com must run tcp on port 1521 otherwise 'oracle down'"),
    ];
    for (keyword, line) in lines {
        assert_eq!(create(line).test_type(), keyword, "{line}");
    }

    for profile in PROFILES.iter().filter(|p| p.port.is_some()) {
        for keyword in profile.keys {
            let line = format!("host.example.com must run {keyword} otherwise 'down'");
            let test = create(&line);
            assert_eq!(test.test_type(), *keyword);
            assert_eq!(test.target(), "host.example.com");
            assert_eq!(Some(test.port()), profile.port, "{line}");
        }
    }
}

#[test]
fn test_explicit_port_overrides_default() {
    let test = create("mail.example.com must run smtp on port 2525 otherwise 'relay down'");
    assert_eq!(test.port(), 2525);

    let test = create("mail.example.com must run smtp on 587 otherwise 'submission down'");
    assert_eq!(test.port(), 587);
}

#[test]
fn test_inverted_flag_follows_must_not() {
    assert!(!create("host.example.com must run ssh otherwise 'ssh down'").inverted());
    assert!(create("host.example.com must not run telnet otherwise 'telnet exposed'").inverted());
    assert!(create("http://host.example.com/ must not run http otherwise 'still serving'").inverted());
}

#[test]
fn test_rendering_is_idempotent() {
    let line = "backup.example.com  must run rsync otherwise 'backups unreachable'";
    let first = create(line).to_string();
    let second = create(line).to_string();
    assert_eq!(first, second);
    assert_eq!(create(&first).to_string(), first);
}

#[test]
fn test_malformed_jobs_are_invalid() {
    let factory = factory();
    assert!(matches!(factory.create(Some("")), Err(JobError::InvalidJob(_))));
    assert!(matches!(factory.create(None), Err(JobError::InvalidJob(_))));
    assert!(matches!(factory.create(Some("   \n")), Err(JobError::InvalidJob(_))));
    assert!(matches!(factory.create(Some(r#"{"line": null}"#)), Err(JobError::InvalidJob(_))));
}

#[test]
fn test_unknown_type_is_reported() {
    let result = factory().create(Some("host must run carrierpigeon otherwise 'x'"));
    assert!(matches!(result, Err(JobError::UnknownTestType(t)) if t == "carrierpigeon"));
}

#[test]
fn test_missing_mandatory_fields_are_configuration_errors() {
    for line in [
        "db.example.com must run tcp otherwise 'no port given'",
        "www.example.com must run http otherwise 'not a url'",
        "ns1.example.com must run dns otherwise 'no lookup'",
    ] {
        assert!(
            matches!(factory().create(Some(line)), Err(JobError::InvalidConfiguration(_))),
            "accepted {line}"
        );
    }
}
