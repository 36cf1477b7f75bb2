//! DNS resolution probe.
//!
//! ```text
//! ns1.example.com must run dns for 'www.example.com' resolving A as '192.0.2.1,192.0.2.2' otherwise '...'
//! ```
//!
//! The target is the nameserver to ask. One recursive query is sent over UDP
//! and the probe passes when the returned address set equals the expected one.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;
use tracing::debug;

use super::{ProtocolTest, TestBase, TestLine, TestRegistry, TestResult};
use crate::error::JobError;
use crate::settings::Settings;

const DNS_PORT: u16 = 53;
const MAX_PACKET: usize = 4096;

static LOOKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfor\s+'([^']+)'\s+resolving\s+(AAAA|A)\s+as\s+'([^']*)'")
        .expect("valid regex")
});

pub fn register(registry: &mut TestRegistry) {
    registry.register(&["dns"], |line, settings| {
        let test: Box<dyn ProtocolTest> = Box::new(DnsTest::new(line, settings)?);
        Ok(test)
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Aaaa => 28,
        }
    }
}

pub struct DnsTest {
    base: TestBase,
    nameserver: String,
    name: String,
    record: RecordType,
    expected: BTreeSet<IpAddr>,
    timeout: Duration,
}

impl DnsTest {
    pub fn new(line: &TestLine, settings: &Settings) -> Result<Self, JobError> {
        let lookup = LOOKUP.captures(line.as_str()).ok_or_else(|| {
            JobError::invalid_configuration(format!(
                "dns test needs \"for '<name>' resolving A|AAAA as '<addresses>'\": {line}"
            ))
        })?;

        let name = lookup[1].trim_end_matches('.').to_string();
        let record = if lookup[2].eq_ignore_ascii_case("aaaa") { RecordType::Aaaa } else { RecordType::A };

        let expected = lookup[3]
            .split([',', ' '])
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(|addr| {
                let ip = addr.parse::<IpAddr>().map_err(|_| {
                    JobError::invalid_configuration(format!("'{addr}' is not an IP address"))
                })?;
                match (record, ip) {
                    (RecordType::A, IpAddr::V4(_)) | (RecordType::Aaaa, IpAddr::V6(_)) => Ok(ip),
                    _ => Err(JobError::invalid_configuration(format!(
                        "'{addr}' does not fit a {:?} record",
                        record
                    ))),
                }
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        if expected.is_empty() {
            return Err(JobError::invalid_configuration(format!("dns test expects no addresses: {line}")));
        }

        Ok(Self {
            base: TestBase::new(line, line.target(), line.port().unwrap_or(DNS_PORT)),
            nameserver: line.target().to_string(),
            name,
            record,
            expected,
            timeout: settings.timeout(),
        })
    }

    async fn resolve(&self) -> Result<BTreeSet<IpAddr>, String> {
        let server = lookup_host((self.nameserver.as_str(), self.base.port))
            .await
            .map_err(|e| format!("cannot resolve nameserver {}: {e}", self.nameserver))?
            .next()
            .ok_or_else(|| format!("nameserver {} has no address", self.nameserver))?;

        let bind: SocketAddr = match server {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind).await.map_err(|e| e.to_string())?;
        socket.connect(server).await.map_err(|e| e.to_string())?;

        let id = rand::random::<u16>();
        let query = encode_query(id, &self.name, self.record)?;
        socket.send(&query).await.map_err(|e| format!("send to {server} failed: {e}"))?;

        let mut buf = vec![0u8; MAX_PACKET];
        let read = socket.recv(&mut buf).await.map_err(|e| format!("no answer from {server}: {e}"))?;
        decode_addresses(&buf[..read], id, self.record)
    }
}

#[async_trait]
impl ProtocolTest for DnsTest {
    fn base(&self) -> &TestBase {
        &self.base
    }

    async fn run_test(&mut self) -> TestResult {
        self.base.reset_error();
        debug!(name = %self.name, nameserver = %self.nameserver, "Running DNS probe");

        let answer = match timeout(self.timeout, self.resolve()).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(reason)) => return self.base.fail(reason),
            Err(_) => {
                return self.base.fail(format!(
                    "timed out after {}s asking {} about {}",
                    self.timeout.as_secs(),
                    self.nameserver,
                    self.name
                ));
            }
        };

        if answer == self.expected {
            self.base.pass()
        } else {
            let reason = format!(
                "{} resolved to [{}], expected [{}]",
                self.name,
                join(&answer),
                join(&self.expected)
            );
            self.base.fail(reason)
        }
    }
}

fn join(addresses: &BTreeSet<IpAddr>) -> String {
    addresses.iter().map(IpAddr::to_string).collect::<Vec<_>>().join(", ")
}

/// Build a recursive single-question query.
pub fn encode_query(id: u16, name: &str, record: RecordType) -> Result<Vec<u8>, String> {
    let mut packet = Vec::with_capacity(32 + name.len());
    packet.extend_from_slice(&id.to_be_bytes());
    // RD set, one question.
    packet.extend_from_slice(&[0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

    for label in name.split('.').filter(|label| !label.is_empty()) {
        if label.len() > 63 {
            return Err(format!("label '{label}' is longer than 63 bytes"));
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);
    packet.extend_from_slice(&record.code().to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());
    Ok(packet)
}

/// Extract the addresses of `record` type from a response to query `id`.
pub fn decode_addresses(packet: &[u8], id: u16, record: RecordType) -> Result<BTreeSet<IpAddr>, String> {
    let header = packet.get(..12).ok_or("truncated DNS header")?;
    if u16::from_be_bytes([header[0], header[1]]) != id {
        return Err("DNS answer id does not match query".into());
    }
    let rcode = header[3] & 0x0f;
    if rcode != 0 {
        return Err(format!("nameserver returned rcode {rcode}"));
    }
    let questions = u16::from_be_bytes([header[4], header[5]]);
    let answers = u16::from_be_bytes([header[6], header[7]]);

    let mut offset = 12;
    for _ in 0..questions {
        offset = skip_name(packet, offset)? + 4;
    }

    let mut found = BTreeSet::new();
    for _ in 0..answers {
        offset = skip_name(packet, offset)?;
        let fixed = packet.get(offset..offset + 10).ok_or("truncated resource record")?;
        let kind = u16::from_be_bytes([fixed[0], fixed[1]]);
        let length = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
        offset += 10;
        let data = packet.get(offset..offset + length).ok_or("truncated record data")?;
        offset += length;

        if kind != record.code() {
            continue;
        }
        match (record, data.len()) {
            (RecordType::A, 4) => {
                found.insert(IpAddr::from([data[0], data[1], data[2], data[3]]));
            }
            (RecordType::Aaaa, 16) => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(data);
                found.insert(IpAddr::from(octets));
            }
            _ => return Err(format!("malformed {record:?} record")),
        }
    }
    Ok(found)
}

/// Offset just past the (possibly compressed) name starting at `offset`.
fn skip_name(packet: &[u8], mut offset: usize) -> Result<usize, String> {
    loop {
        let length = *packet.get(offset).ok_or("truncated name")?;
        match length {
            0 => return Ok(offset + 1),
            len if len & 0xc0 == 0xc0 => return Ok(offset + 2),
            len => offset += 1 + len as usize,
        }
    }
}
