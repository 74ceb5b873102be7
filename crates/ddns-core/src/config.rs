//! Configuration types for the DDNS updater
//!
//! The configuration is a TOML document. Unknown keys are rejected so typos
//! surface at startup instead of silently disabling a feature.

use crate::error::{Error, Result};
use crate::net::AddressClientConfig;
use crate::traits::IpVersion;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scheduling period used when none is configured
pub const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_secs(60);

/// Request timeout used when none is configured
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(15);

/// Main DDNS configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DdnsConfig {
    /// Interval between scheduled passes (zero means default)
    #[serde(default, deserialize_with = "duration_text")]
    pub period: Duration,

    /// Timeout applied to every lookup and push request (zero means default)
    #[serde(default, deserialize_with = "duration_text")]
    pub timeout: Duration,

    /// Optional log file, appended to alongside stdout
    #[serde(default)]
    pub log_file: String,

    /// Public IPv4 lookup
    #[serde(default)]
    pub public_ipv4: PublicAddressConfig,

    /// Public IPv6 lookup
    #[serde(default)]
    pub public_ipv6: PublicAddressConfig,

    /// Provider definitions
    #[serde(default)]
    pub provider: ProviderSetConfig,
}

/// Public address lookup configuration for one family
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublicAddressConfig {
    /// Whether this family is resolved and pushed at all
    #[serde(default)]
    pub enable: bool,

    /// Lookup service URL, answering with the address as plain text
    #[serde(default)]
    pub url: String,

    /// Optional local source address
    #[serde(default)]
    pub laddr: String,

    /// Optional proxy URL
    #[serde(default)]
    pub proxy: String,
}

/// Which provider definitions to load, and how to reach them
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSetConfig {
    /// Directory holding provider definition files
    #[serde(default)]
    pub dir: String,

    /// Definition file names, pushed in this order
    #[serde(default)]
    pub item: Vec<String>,

    /// Optional proxy URL for push requests
    #[serde(default)]
    pub proxy: String,
}

impl DdnsConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.public_ipv4.enable && !self.public_ipv6.enable {
            return Err(Error::config("IPv4/IPv6 are all disabled"));
        }

        for version in IpVersion::ALL {
            let family = self.public(version);
            if family.enable && family.url.is_empty() {
                return Err(Error::config(format!(
                    "public {} lookup is enabled but has no url",
                    version
                )));
            }
        }

        if self.provider.item.iter().any(|item| item.is_empty()) {
            return Err(Error::config("provider item names cannot be empty"));
        }

        Ok(())
    }

    /// Effective scheduling period
    pub fn period(&self) -> Duration {
        if self.period.is_zero() {
            DEFAULT_UPDATE_PERIOD
        } else {
            self.period
        }
    }

    /// Effective request timeout
    pub fn request_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_UPDATE_TIMEOUT
        } else {
            self.timeout
        }
    }

    /// Log file path, if configured
    pub fn log_file(&self) -> Option<&str> {
        non_empty(&self.log_file)
    }

    /// Lookup section for `version`
    pub fn public(&self, version: IpVersion) -> &PublicAddressConfig {
        match version {
            IpVersion::V4 => &self.public_ipv4,
            IpVersion::V6 => &self.public_ipv6,
        }
    }

    /// Client settings for `version`, or `None` if that family is disabled
    pub fn address_client(&self, version: IpVersion) -> Option<AddressClientConfig> {
        let family = self.public(version);
        family.enable.then(|| AddressClientConfig {
            url: family.url.clone(),
            proxy: non_empty(&family.proxy).map(str::to_string),
            local_addr: non_empty(&family.laddr).map(str::to_string),
            timeout: self.request_timeout(),
        })
    }

    /// Provider definition paths, in configured order
    pub fn provider_paths(&self) -> Vec<PathBuf> {
        let dir = Path::new(&self.provider.dir);
        self.provider.item.iter().map(|item| dir.join(item)).collect()
    }

    /// Proxy for push requests, if configured
    pub fn push_proxy(&self) -> Option<&str> {
        non_empty(&self.provider.proxy)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

/// Parse a duration such as `"1m30s"`, `"250ms"`, `"1.5h"` or `"90"` (seconds)
pub fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration {:?}", text));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration {:?}", text))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("missing unit in duration {:?}", text)),
            unit => return Err(format!("unknown unit {:?} in duration {:?}", unit, text)),
        };
        rest = &rest[unit_len..];
        total += value * scale;
    }

    if !total.is_finite() {
        return Err(format!("duration {:?} out of range", text));
    }
    Duration::try_from_secs_f64(total)
        .map_err(|e| format!("duration {:?} out of range: {}", text, e))
}

fn duration_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
