use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use rand::random;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::net::lookup_host;
use tracing::debug;

use super::{ProtocolTest, TestBase, TestLine, TestRegistry, TestResult};
use crate::error::JobError;
use crate::settings::Settings;

pub fn register(registry: &mut TestRegistry) {
    registry.register(&["ping"], |line, settings| {
        let test: Box<dyn ProtocolTest> = Box::new(PingTest::new(line, settings)?);
        Ok(test)
    });
}

/// Single ICMP echo request.
///
/// Raw ICMP sockets need privileges (or `net.ipv4.ping_group_range`); without
/// them every attempt fails with the socket error as detail.
pub struct PingTest {
    base: TestBase,
    timeout: Duration,
}

impl PingTest {
    pub fn new(line: &TestLine, settings: &Settings) -> Result<Self, JobError> {
        if line.target().contains('/') {
            return Err(JobError::invalid_configuration(format!(
                "ping target must be a host or address, not '{}'",
                line.target()
            )));
        }
        Ok(Self { base: TestBase::new(line, line.target(), 0), timeout: settings.timeout() })
    }

    async fn resolve(&self) -> Result<IpAddr, String> {
        if let Ok(ip) = self.base.target.parse::<IpAddr>() {
            return Ok(ip);
        }
        lookup_host((self.base.target.as_str(), 0))
            .await
            .map_err(|e| format!("cannot resolve {}: {e}", self.base.target))?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| format!("{} has no address", self.base.target))
    }

    async fn echo(&self, addr: IpAddr) -> Result<Duration, String> {
        let config = match addr {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = Client::new(&config).map_err(|e| format!("cannot open ICMP socket: {e}"))?;
        let mut pinger = client.pinger(addr, PingIdentifier(random())).await;
        pinger.timeout(self.timeout);

        pinger
            .ping(PingSequence(0), &[0; 8])
            .await
            .map(|(_reply, rtt)| rtt)
            .map_err(|e| format!("no echo reply from {addr}: {e}"))
    }
}

#[async_trait]
impl ProtocolTest for PingTest {
    fn base(&self) -> &TestBase {
        &self.base
    }

    async fn run_test(&mut self) -> TestResult {
        self.base.reset_error();

        let addr = match self.resolve().await {
            Ok(addr) => addr,
            Err(reason) => return self.base.fail(reason),
        };

        match self.echo(addr).await {
            Ok(rtt) => {
                debug!(address = %addr, rtt_ms = rtt.as_millis() as u64, "Echo reply");
                self.base.pass()
            }
            Err(reason) => self.base.fail(reason),
        }
    }
}
