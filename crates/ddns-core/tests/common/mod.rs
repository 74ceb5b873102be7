//! Test doubles and common utilities for updater contract tests
//!
//! Address sources here count their calls so tests can observe how often the
//! updater resolves, and how many lookups are still running.

#![allow(dead_code)]

use async_trait::async_trait;
use ddns_core::error::{Error, Result};
use ddns_core::net::build_push_client;
use ddns_core::traits::{AddressSource, IpVersion};
use ddns_core::{CompiledProvider, UpdaterParts};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Provider definition pushing both families to `{uri}`
pub const DUAL_STACK_PROVIDER: &str = r#"
[meta]
host_url = "{uri}"
response = "good|nochg"

[ipv4]
path = "/nic/update?hostname={{.host}}&myip={{.ipv4}}"

[ipv6]
path = "/v6/update?hostname={{.host}}&myip={{.ipv6}}"

[args]
host = "home.example.com"
"#;

/// Provider definition pushing only IPv4 to `{uri}`
pub const IPV4_ONLY_PROVIDER: &str = r#"
[meta]
host_url = "{uri}"
response = "good"

[ipv4]
path = "/nic/update?hostname={{.host}}&myip={{.ipv4}}"

[args]
host = "home.example.com"
"#;

/// Compile `template` with its host pointed at `uri`
pub fn provider(name: &str, template: &str, uri: &str) -> CompiledProvider {
    CompiledProvider::load(name, &template.replace("{uri}", uri)).unwrap()
}

/// Updater parts with a 60s period and no proxy
pub fn parts(
    ipv4: Option<Arc<dyn AddressSource>>,
    ipv6: Option<Arc<dyn AddressSource>>,
    providers: Vec<CompiledProvider>,
) -> UpdaterParts {
    UpdaterParts {
        period: Duration::from_secs(60),
        ipv4,
        ipv6,
        providers,
        push_client: build_push_client(None, Duration::from_secs(5)).unwrap(),
    }
}

/// An address source that always answers with the same address
pub struct StaticSource {
    version: IpVersion,
    ip: String,
    calls: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(version: IpVersion, ip: &str) -> Self {
        Self {
            version,
            ip: ip.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared handle on the call counter
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl AddressSource for StaticSource {
    async fn current(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ip.clone())
    }

    fn version(&self) -> IpVersion {
        self.version
    }
}

/// An address source whose lookups always fail
pub struct FailingSource {
    version: IpVersion,
}

impl FailingSource {
    pub fn new(version: IpVersion) -> Self {
        Self { version }
    }
}

#[async_trait]
impl AddressSource for FailingSource {
    async fn current(&self) -> Result<String> {
        Err(Error::lookup(self.version, "lookup service unreachable"))
    }

    fn version(&self) -> IpVersion {
        self.version
    }
}

/// An address source whose lookups take `delay`
///
/// `in_flight` counts lookups that have started and not yet finished or been
/// dropped.
pub struct SlowSource {
    version: IpVersion,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
}

impl SlowSource {
    pub fn new(version: IpVersion, delay: Duration) -> Self {
        Self {
            version,
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn in_flight(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.in_flight)
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AddressSource for SlowSource {
    async fn current(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));

        tokio::time::sleep(self.delay).await;
        Ok(match self.version {
            IpVersion::V4 => "192.0.2.50".to_string(),
            IpVersion::V6 => "2001:db8::50".to_string(),
        })
    }

    fn version(&self) -> IpVersion {
        self.version
    }
}

/// Poll `condition` every 5ms until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
