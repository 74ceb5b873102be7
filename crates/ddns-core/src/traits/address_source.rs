// # Address Source Trait
//
// Defines the interface for discovering the caller's current public address
// for one family.
//
// ## Implementations
//
// - HTTP lookup services: `crate::net::HttpAddressSource`
// - Test doubles in `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::traits::AddressSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* AddressSource implementation */;
//     let ip = source.current().await?;
//     println!("{} is {}", source.version(), ip);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

/// IP version (v4 or v6)
///
/// Families are independent at every stage of a pass: resolution, request
/// building and pushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Both families, in resolution order
    pub const ALL: [IpVersion; 2] = [IpVersion::V4, IpVersion::V6];

    /// Reserved template argument carrying the current address
    pub fn template_key(self) -> &'static str {
        match self {
            IpVersion::V4 => "ipv4",
            IpVersion::V6 => "ipv6",
        }
    }

    /// Whether `ip` belongs to this family
    pub fn matches(self, ip: &IpAddr) -> bool {
        match self {
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => f.write_str("IPv4"),
            IpVersion::V6 => f.write_str("IPv6"),
        }
    }
}

/// Trait for public address sources
///
/// One source serves exactly one family. Sources are long-lived and reused
/// across passes, so implementations must be usable from concurrent tasks.
///
/// Cancellation is owned by the caller: the updater drops the `current()`
/// future when `stop` is requested, so implementations must not spawn work
/// that outlives the returned future.
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// Resolve the current public address
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: textual address injected into provider templates
    /// - `Err(Error)`: lookup failed; the family is skipped for this pass
    async fn current(&self) -> Result<String, crate::Error>;

    /// The family this source resolves
    fn version(&self) -> IpVersion;
}
